// Segmented append-only block storage
// Fixed-size data files, a single index file, and optional chain management

pub mod block_dir;
pub mod block_file;
pub mod error;

pub use block_dir::*;
pub use block_file::*;
pub use error::*;
