use plid_core::{Balance, CodecError, WalletId};
use plid_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("wallet {0} already exists")]
    WalletExists(WalletId),
    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),
    #[error("insufficient balance in wallet {wallet}: have {balance}, need {amount}")]
    InsufficientBalance {
        wallet: WalletId,
        balance: Balance,
        amount: Balance,
    },
    #[error("amount {0} must be positive")]
    InvalidAmount(Balance),
    #[error("balance arithmetic overflow on wallet {0}")]
    BalanceOverflow(WalletId),
    #[error("transaction signature rejected")]
    BadSignature,
    #[error("no pending transactions to commit")]
    NothingToCommit,
    #[error("block hash mismatch")]
    HashMismatch,
    #[error("block index {got} does not extend the chain (expected {expected})")]
    IndexMismatch { expected: u64, got: u64 },
    #[error("previous-hash link broken at block {0}")]
    LinkMismatch(u64),
    #[error("block slot {got} is behind the chain head slot {head}")]
    SlotRegression { head: u64, got: u64 },
    #[error("block validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
