// PLID core types
// Deterministic codec, block and transaction model, in-memory chain

pub mod block;
pub mod chain;
pub mod codec;
pub mod transaction;
pub mod types;

pub use block::*;
pub use chain::*;
pub use codec::*;
pub use transaction::*;
pub use types::*;

/// Block index within the chain (also the storage block id)
pub type BlockId = u64;
/// Slot number of the consensus clock
pub type Slot = u64;
/// Epoch number of the consensus clock
pub type Epoch = u64;
/// Wallet identifier
pub type WalletId = u64;
/// Wallet balance in base units
pub type Balance = i64;
/// Unix timestamp in seconds
pub type Timestamp = i64;
