// Non-blocking TCP acceptor
// Drains whole request payloads over a readiness poller and enqueues them

use crate::error::NetError;
use crate::queue::RequestQueue;
use crate::service::{Service, StopFlag};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const LISTENER: Token = Token(0);
const POLL_TICK: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 4096;

/// Default budget for draining one request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
}

impl ListenerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ListenerConfig {
            host: host.into(),
            port,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// A fully drained request payload plus the connection that delivered it.
/// Whoever holds the stream owns the fd; dropping it closes the connection.
pub struct RawRequest {
    pub payload: Vec<u8>,
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: Vec<u8>,
    deadline: Instant,
}

enum ReadProgress {
    Complete,
    Pending,
    Failed(io::Error),
}

/// One bound listening socket with its own poller. `spawn` moves it onto
/// the acceptor thread, which accepts, drains each peer until half-close,
/// and pushes `(payload, connection)` pairs onto the queue.
pub struct RequestListener {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    read_timeout: Duration,
}

impl RequestListener {
    pub fn bind(config: &ListenerConfig) -> Result<Self, NetError> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetError::Resolve(format!("{}:{}", config.host, config.port)))?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        info!(%local_addr, "listener bound");
        Ok(RequestListener {
            poll,
            listener,
            local_addr,
            read_timeout: config.read_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn spawn(self, queue: Arc<RequestQueue<RawRequest>>) -> io::Result<Service> {
        Service::spawn("listener", move |stop| self.run(stop, queue))
    }

    fn run(mut self, stop: StopFlag, queue: Arc<RequestQueue<RawRequest>>) {
        let mut events = Events::with_capacity(256);
        let mut connections: HashMap<Token, Connection> = HashMap::new();
        let mut next_token = 1usize;

        while !stop.is_set() {
            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TICK)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(%err, "listener poll failed");
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => {
                        self.accept_pending(&mut connections, &mut next_token);
                    }
                    token => {
                        let Some(mut connection) = connections.remove(&token) else {
                            continue;
                        };
                        match drain(&mut connection) {
                            ReadProgress::Pending => {
                                connections.insert(token, connection);
                            }
                            ReadProgress::Complete => {
                                let _ = self.poll.registry().deregister(&mut connection.stream);
                                debug!(
                                    peer = %connection.peer,
                                    bytes = connection.buffer.len(),
                                    "request drained"
                                );
                                queue.push(RawRequest {
                                    payload: connection.buffer,
                                    stream: connection.stream,
                                    peer: connection.peer,
                                });
                            }
                            ReadProgress::Failed(err) => {
                                let _ = self.poll.registry().deregister(&mut connection.stream);
                                warn!(peer = %connection.peer, %err, "dropping connection");
                            }
                        }
                    }
                }
            }

            self.expire_slow_readers(&mut connections);
        }
        // Remaining connections close on drop.
    }

    fn accept_pending(
        &mut self,
        connections: &mut HashMap<Token, Connection>,
        next_token: &mut usize,
    ) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(*next_token);
                    *next_token += 1;
                    if let Err(err) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(%peer, %err, "failed to register connection");
                        continue;
                    }
                    debug!(%peer, "accepted connection");
                    connections.insert(
                        token,
                        Connection {
                            stream,
                            peer,
                            buffer: Vec::new(),
                            deadline: Instant::now() + self.read_timeout,
                        },
                    );
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "accept failed");
                    break;
                }
            }
        }
    }

    fn expire_slow_readers(&mut self, connections: &mut HashMap<Token, Connection>) {
        let now = Instant::now();
        let expired: Vec<Token> = connections
            .iter()
            .filter(|(_, c)| now >= c.deadline)
            .map(|(t, _)| *t)
            .collect();
        for token in expired {
            if let Some(mut connection) = connections.remove(&token) {
                let _ = self.poll.registry().deregister(&mut connection.stream);
                warn!(peer = %connection.peer, "read timed out, dropping connection");
            }
        }
    }
}

/// Read until the peer half-closes (`Ok(0)`) or the socket would block.
fn drain(connection: &mut Connection) -> ReadProgress {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match connection.stream.read(&mut chunk) {
            Ok(0) => return ReadProgress::Complete,
            Ok(n) => connection.buffer.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return ReadProgress::Pending,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return ReadProgress::Failed(err),
        }
    }
}
