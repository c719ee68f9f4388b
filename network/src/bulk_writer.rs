// Bulk non-blocking writer
// Finishes many single-payload sends over one poller, closing each fd once

use crate::error::NetError;
use crate::service::Service;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const WAKER: Token = Token(0);
const POLL_TICK: Duration = Duration::from_millis(200);
/// How long the writer keeps finishing in-flight jobs after a stop signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Per-job send budget: `ms_base + size_mb * ms_per_mb` milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct BulkWriterConfig {
    pub ms_base: u64,
    pub ms_per_mb: u64,
}

impl Default for BulkWriterConfig {
    fn default() -> Self {
        BulkWriterConfig {
            ms_base: 5_000,
            ms_per_mb: 100,
        }
    }
}

impl BulkWriterConfig {
    pub fn job_timeout(&self, payload_len: usize) -> Duration {
        let size_mb = payload_len as f64 / (1024.0 * 1024.0);
        Duration::from_millis(self.ms_base + (size_mb * self.ms_per_mb as f64) as u64)
    }
}

/// Invoked once for a job that errored or timed out; its fd is closed right
/// after the callback returns.
pub type WriteErrorCallback = Box<dyn Fn(&NetError) + Send + Sync>;

struct NewJob {
    stream: TcpStream,
    buffer: Vec<u8>,
}

struct Shared {
    incoming: Mutex<Vec<NewJob>>,
    waker: Waker,
    closed: AtomicBool,
    pending: AtomicUsize,
}

/// Cloneable handle for submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct BulkWriterHandle {
    shared: Arc<Shared>,
}

impl BulkWriterHandle {
    /// Queue one `(connection, payload)` job. The writer owns the stream
    /// from here on and closes it exactly once, on completion, error or
    /// expiry.
    pub fn add(&self, stream: TcpStream, buffer: Vec<u8>) -> Result<(), NetError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(NetError::WriterClosed);
        }
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.incoming.lock().push(NewJob { stream, buffer });
        self.shared.waker.wake()?;
        Ok(())
    }

    /// Jobs submitted but not yet completed, failed or expired.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }
}

struct Job {
    stream: TcpStream,
    buffer: Vec<u8>,
    offset: usize,
    expire: Instant,
}

enum WriteOutcome {
    Complete,
    Pending,
    Failed(io::Error),
}

/// Owns the writer thread. Each job is one fixed payload on one fd; on
/// POLLOUT readiness the writer sends as much as the kernel takes, keeps
/// partially sent jobs, and closes the fd when the payload is out. Jobs
/// that error or outlive their byte-rate budget hit the error callback and
/// are closed. With no jobs the loop just parks on its poller tick.
pub struct BulkWriter {
    handle: BulkWriterHandle,
    service: Service,
}

impl BulkWriter {
    pub fn spawn(
        config: BulkWriterConfig,
        error_callback: Option<WriteErrorCallback>,
    ) -> Result<BulkWriter, NetError> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let shared = Arc::new(Shared {
            incoming: Mutex::new(Vec::new()),
            waker,
            closed: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        });

        let handle = BulkWriterHandle {
            shared: Arc::clone(&shared),
        };
        let worker_shared = Arc::clone(&shared);
        let service = Service::spawn("bulk-writer", move |stop| {
            run_writer(poll, worker_shared, config, error_callback, stop);
        })?;

        Ok(BulkWriter { handle, service })
    }

    pub fn handle(&self) -> BulkWriterHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs and let the thread finish in-flight sends, up to
    /// each job's expiry or the shutdown grace period.
    pub fn shutdown(mut self) {
        self.handle.shared.closed.store(true, Ordering::SeqCst);
        let _ = self.handle.shared.waker.wake();
        self.service.stop();
    }
}

fn run_writer(
    mut poll: Poll,
    shared: Arc<Shared>,
    config: BulkWriterConfig,
    error_callback: Option<WriteErrorCallback>,
    stop: crate::service::StopFlag,
) {
    let mut events = Events::with_capacity(256);
    let mut jobs: HashMap<Token, Job> = HashMap::new();
    let mut next_token = 1usize;
    let mut hard_deadline: Option<Instant> = None;

    loop {
        if stop.is_set() {
            let deadline = *hard_deadline.get_or_insert_with(|| Instant::now() + SHUTDOWN_GRACE);
            if jobs.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(abandoned = jobs.len(), "bulk writer shutdown deadline hit");
                for (_, mut job) in jobs.drain() {
                    let _ = poll.registry().deregister(&mut job.stream);
                    report(&error_callback, &NetError::Timeout);
                    shared.pending.fetch_sub(1, Ordering::SeqCst);
                }
                break;
            }
        }

        // Intake new jobs submitted through the handle.
        {
            let mut incoming = shared.incoming.lock();
            for new_job in incoming.drain(..) {
                let token = Token(next_token);
                next_token += 1;
                let mut stream = new_job.stream;
                if let Err(err) = poll
                    .registry()
                    .register(&mut stream, token, Interest::WRITABLE)
                {
                    report(&error_callback, &NetError::Io(err));
                    shared.pending.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
                let expire = Instant::now() + config.job_timeout(new_job.buffer.len());
                jobs.insert(
                    token,
                    Job {
                        stream,
                        buffer: new_job.buffer,
                        offset: 0,
                        expire,
                    },
                );
            }
        }

        let timeout = poll_timeout(&jobs);
        if let Err(err) = poll.poll(&mut events, Some(timeout)) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!(%err, "bulk writer poll failed");
            break;
        }

        for event in events.iter() {
            let token = event.token();
            if token == WAKER {
                continue;
            }
            let outcome = match jobs.get_mut(&token) {
                Some(job) => write_some(job),
                None => continue,
            };
            match outcome {
                WriteOutcome::Pending => {}
                WriteOutcome::Complete => {
                    if let Some(mut job) = jobs.remove(&token) {
                        let _ = poll.registry().deregister(&mut job.stream);
                        debug!(bytes = job.buffer.len(), "write job complete");
                        shared.pending.fetch_sub(1, Ordering::SeqCst);
                        // Dropping the stream closes the fd.
                    }
                }
                WriteOutcome::Failed(err) => {
                    if let Some(mut job) = jobs.remove(&token) {
                        let _ = poll.registry().deregister(&mut job.stream);
                        report(&error_callback, &NetError::Io(err));
                        shared.pending.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }
        }

        // Expiry sweep, also reached on poll timeouts with no events.
        let now = Instant::now();
        let expired: Vec<Token> = jobs
            .iter()
            .filter(|(_, job)| now >= job.expire)
            .map(|(t, _)| *t)
            .collect();
        for token in expired {
            if let Some(mut job) = jobs.remove(&token) {
                let _ = poll.registry().deregister(&mut job.stream);
                warn!(
                    sent = job.offset,
                    total = job.buffer.len(),
                    "write job expired"
                );
                report(&error_callback, &NetError::Timeout);
                shared.pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

fn poll_timeout(jobs: &HashMap<Token, Job>) -> Duration {
    let Some(nearest) = jobs.values().map(|job| job.expire).min() else {
        return POLL_TICK;
    };
    nearest
        .saturating_duration_since(Instant::now())
        .min(POLL_TICK)
}

fn write_some(job: &mut Job) -> WriteOutcome {
    loop {
        match job.stream.write(&job.buffer[job.offset..]) {
            Ok(0) => {
                return WriteOutcome::Failed(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting bytes",
                ))
            }
            Ok(n) => {
                job.offset += n;
                if job.offset >= job.buffer.len() {
                    return WriteOutcome::Complete;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return WriteOutcome::Pending,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return WriteOutcome::Failed(err),
        }
    }
}

fn report(callback: &Option<WriteErrorCallback>, err: &NetError) {
    if let Some(callback) = callback {
        callback(err);
    }
}
