use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Shared cancellation flag. Loops owned by a [`Service`] must check it at
/// least once a second so shutdown is never blocked on I/O.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        StopFlag::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A component running in its own named thread. Stopping sets the flag and
/// joins; dropping a running service stops it.
pub struct Service {
    name: String,
    stop: StopFlag,
    handle: Option<JoinHandle<()>>,
}

impl Service {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> io::Result<Service>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let name = name.into();
        let stop = StopFlag::new();
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(flag))?;
        Ok(Service {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the thread and wait for it to drain and exit.
    pub fn stop(&mut self) {
        self.stop.set();
        if let Some(handle) = self.handle.take() {
            debug!(service = %self.name, "stopping service");
            let _ = handle.join();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn service_runs_until_stopped() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut service = Service::spawn("ticker", move |stop| {
            while !stop.is_set() {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(service.is_running());
        service.stop();
        assert!(!service.is_running());
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn drop_stops_the_thread() {
        let stopped = Arc::new(AtomicBool::new(false));
        let observer = Arc::clone(&stopped);
        let service = Service::spawn("dropper", move |stop| {
            while !stop.is_set() {
                thread::sleep(Duration::from_millis(5));
            }
            observer.store(true, Ordering::SeqCst);
        })
        .unwrap();

        drop(service);
        assert!(stopped.load(Ordering::SeqCst));
    }
}
