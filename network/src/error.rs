use plid_core::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("envelope version {found} (expected {expected})")]
    VersionMismatch { expected: u16, found: u16 },
    #[error("server returned error {code}: {message}")]
    Server { code: u16, message: String },
    #[error("operation timed out")]
    Timeout,
    #[error("bulk writer is shut down")]
    WriterClosed,
    #[error("could not resolve {0}")]
    Resolve(String),
}
