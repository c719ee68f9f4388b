use plid_core::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("file {path} is larger than its capacity {capacity}")]
    OverCapacity { path: String, capacity: u64 },
    #[error("record of {size} bytes does not fit (current size {current}, capacity {capacity})")]
    RecordTooLarge {
        size: u64,
        current: u64,
        capacity: u64,
    },
    #[error("record header at offset {offset} says {header} bytes, index says {expected}")]
    RecordMismatch {
        offset: u64,
        header: u64,
        expected: u64,
    },
    #[error("block {0} already exists")]
    DuplicateBlock(u64),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("block id {got} is not contiguous (expected {expected})")]
    NonContiguousBlock { expected: u64, got: u64 },
    #[error("data file for file id {0} is missing on disk")]
    MissingFile(u32),
    #[error("file {0} already present in target store")]
    FileExists(u32),
    #[error("store has no files")]
    NoFiles,
    #[error("index corrupted: {0}")]
    CorruptIndex(String),
    #[error("block {id} decoded with index {decoded}")]
    BlockIndexMismatch { id: u64, decoded: u64 },
    #[error("store does not manage a chain")]
    NoChain,
    #[error("block index {got} does not match the chain head (expected {expected})")]
    ChainIndexMismatch { expected: u64, got: u64 },
}
