// Blocking one-shot fetch client
// connect → send → half-close → read response → close

use crate::error::NetError;
use crate::wire::{Request, Response, WIRE_VERSION};
use plid_core::{decode_from_slice, encode_to_vec};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Client side of the framed protocol. Every call is one short-lived
/// connection: write the whole request, shut down the write side, then
/// read the response to end-of-stream.
#[derive(Clone, Debug)]
pub struct FetchClient {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl Default for FetchClient {
    fn default() -> Self {
        FetchClient {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl FetchClient {
    pub fn new() -> Self {
        FetchClient::default()
    }

    pub fn with_timeouts(connect_timeout: Duration, io_timeout: Duration) -> Self {
        FetchClient {
            connect_timeout,
            io_timeout,
        }
    }

    /// Send one request and return the raw response envelope.
    pub fn fetch(&self, host: &str, port: u16, request: &Request) -> Result<Response, NetError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetError::Resolve(format!("{host}:{port}")))?;

        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.set_nodelay(true)?;

        let bytes = encode_to_vec(request)?;
        stream.write_all(&bytes).map_err(map_timeout)?;
        stream.shutdown(Shutdown::Write)?;
        debug!(%addr, req_type = request.req_type, bytes = bytes.len(), "request sent");

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).map_err(map_timeout)?;

        let response: Response = decode_from_slice(&buffer)?;
        if response.version != WIRE_VERSION {
            return Err(NetError::VersionMismatch {
                expected: WIRE_VERSION,
                found: response.version,
            });
        }
        Ok(response)
    }

    /// Send one request and return the success payload; error responses
    /// come back as `NetError::Server` with the server's message.
    pub fn request(
        &self,
        host: &str,
        port: u16,
        req_type: u16,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, NetError> {
        let response = self.fetch(host, port, &Request::new(req_type, payload))?;
        if !response.is_ok() {
            return Err(NetError::Server {
                code: response.error_code,
                message: response.error_message().unwrap_or_default(),
            });
        }
        Ok(response.payload)
    }
}

fn map_timeout(err: std::io::Error) -> NetError {
    match err.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => NetError::Timeout,
        _ => NetError::Io(err),
    }
}
