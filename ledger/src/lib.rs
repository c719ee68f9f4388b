// Ledger engine
// Wallets, the pending-transaction buffer, block commit, and tiered storage

pub mod error;
pub mod ledger;
pub mod wallet;

pub use error::*;
pub use ledger::*;
pub use wallet::*;
