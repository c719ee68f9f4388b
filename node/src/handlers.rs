// Request handlers
// Role state and the typed handler tables for beacon, miner and relay

use crate::config::NodeConfig;
use parking_lot::Mutex;
use plid_consensus::{ConsensusError, Scheduler, SlotClock, Stakeholder};
use plid_core::{decode_from_slice, encode_to_vec, Block, PermissiveVerifier, SignedTx};
use plid_ledger::{Ledger, LedgerConfig, LedgerError};
use plid_network::{
    request_type, Dispatcher, HandlerError, StakeUpdate, StatusInfo, TxByWalletQuery, WalletInfo,
};
use plid_network::Endpoint;
use plid_store::StoreError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// State shared by the request worker and the role's tick thread.
pub struct RoleCtx {
    pub ledger: Mutex<Ledger>,
    pub scheduler: Scheduler,
    /// Active servers seen by the beacon: address → last-seen timestamp
    pub servers: Mutex<HashMap<String, i64>>,
}

/// Open the ledger under the work dir and wire up the scheduler clock.
pub fn build_ctx(work_dir: &Path, config: &NodeConfig) -> Result<Arc<RoleCtx>, LedgerError> {
    let ledger_config = LedgerConfig::new(work_dir.join("data"), work_dir.join("archive"))
        .with_max_file_size(config.block_file_size)
        .with_max_active_size(config.checkpoint_size);
    let ledger = Ledger::open(ledger_config, Box::new(PermissiveVerifier))?;

    let clock = SlotClock::new(
        config.genesis_time,
        config.slot_duration,
        config.slots_per_epoch,
    )
    .with_time_offset(config.time_offset);

    Ok(Arc::new(RoleCtx {
        ledger: Mutex::new(ledger),
        scheduler: Scheduler::new(clock),
        servers: Mutex::new(HashMap::new()),
    }))
}

fn ledger_error(err: LedgerError) -> HandlerError {
    match err {
        LedgerError::WalletNotFound(_) | LedgerError::Store(StoreError::BlockNotFound(_)) => {
            HandlerError::not_found(err.to_string())
        }
        LedgerError::WalletExists(_)
        | LedgerError::InsufficientBalance { .. }
        | LedgerError::InvalidAmount(_)
        | LedgerError::BalanceOverflow(_)
        | LedgerError::BadSignature
        | LedgerError::NothingToCommit
        | LedgerError::HashMismatch
        | LedgerError::IndexMismatch { .. }
        | LedgerError::LinkMismatch(_)
        | LedgerError::SlotRegression { .. }
        | LedgerError::Validation(_)
        | LedgerError::Codec(_) => HandlerError::bad_request(err.to_string()),
        LedgerError::Store(_) => HandlerError::internal(err.to_string()),
    }
}

fn consensus_error(err: ConsensusError) -> HandlerError {
    HandlerError::internal(err.to_string())
}

// ---- handlers shared by all roles ----

fn handle_status(_payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let ledger = ctx.ledger.lock();
    let status = StatusInfo {
        current_slot: ctx.scheduler.current_slot(),
        current_epoch: ctx.scheduler.current_epoch(),
        next_block_id: ledger.next_block_id(),
        checkpoint_ids: ledger.checkpoint_ids(),
    };
    Ok(encode_to_vec(&status)?)
}

fn handle_block_get(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let block_id: u64 = decode_from_slice(payload)?;
    ctx.ledger
        .lock()
        .block_bytes(block_id)
        .map_err(ledger_error)
}

fn handle_block_add(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let block: Block = decode_from_slice(payload)?;
    let index = block.index;
    let mut ledger = ctx.ledger.lock();
    // Head linkage is only demanded at or above the checkpoint boundary;
    // below it the predecessor may already be archived.
    let strict = block.index >= ledger.checkpoint_id();
    ledger.add_block(block, strict).map_err(ledger_error)?;
    info!(index, "accepted block");
    Ok(Vec::new())
}

fn handle_account_get(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let wallet_id: u64 = decode_from_slice(payload)?;
    let balance = ctx
        .ledger
        .lock()
        .balance(wallet_id)
        .map_err(ledger_error)?;
    Ok(encode_to_vec(&WalletInfo {
        id: wallet_id,
        balance,
    })?)
}

fn handle_tx_add(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let signed: SignedTx = decode_from_slice(payload)?;
    ctx.ledger
        .lock()
        .add_transaction(signed)
        .map_err(ledger_error)?;
    Ok(Vec::new())
}

fn handle_tx_get_by_wallet(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let query: TxByWalletQuery = decode_from_slice(payload)?;
    let txes = ctx
        .ledger
        .lock()
        .transactions_by_wallet(query.wallet_id, query.before_block_id)
        .map_err(ledger_error)?;
    Ok(encode_to_vec(&txes)?)
}

fn handle_consensus_current_slot(_payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    Ok(encode_to_vec(&ctx.scheduler.current_slot())?)
}

fn handle_consensus_current_epoch(
    _payload: &[u8],
    ctx: &RoleCtx,
) -> Result<Vec<u8>, HandlerError> {
    Ok(encode_to_vec(&ctx.scheduler.current_epoch())?)
}

fn handle_consensus_slot_leader(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let slot: u64 = decode_from_slice(payload)?;
    let leader = ctx.scheduler.slot_leader(slot).map_err(consensus_error)?;
    Ok(encode_to_vec(&leader)?)
}

fn handle_stakeholder_list(_payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    Ok(encode_to_vec(&ctx.scheduler.stakeholders())?)
}

// ---- beacon-only handlers ----

fn handle_register(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let endpoint: Endpoint = decode_from_slice(payload)?;
    let address = endpoint.address();
    let now = chrono::Utc::now().timestamp();
    ctx.servers.lock().insert(address.clone(), now);
    info!(%address, "registered server");
    Ok(Vec::new())
}

fn handle_stakeholder_add(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let stakeholder: Stakeholder = decode_from_slice(payload)?;
    ctx.scheduler.add_stakeholder(stakeholder);
    Ok(Vec::new())
}

fn handle_stakeholder_remove(payload: &[u8], ctx: &RoleCtx) -> Result<Vec<u8>, HandlerError> {
    let id: String = decode_from_slice(payload)?;
    if !ctx.scheduler.remove_stakeholder(&id) {
        return Err(HandlerError::not_found(format!(
            "stakeholder {id} is not registered"
        )));
    }
    Ok(Vec::new())
}

fn handle_stakeholder_update_stake(
    payload: &[u8],
    ctx: &RoleCtx,
) -> Result<Vec<u8>, HandlerError> {
    let update: StakeUpdate = decode_from_slice(payload)?;
    ctx.scheduler
        .update_stake(&update.id, update.stake)
        .map_err(|err| HandlerError::not_found(err.to_string()))?;
    Ok(Vec::new())
}

// ---- dispatch tables ----

/// The beacon answers the full request set.
pub fn beacon_dispatcher() -> Dispatcher<RoleCtx> {
    Dispatcher::new()
        .with(request_type::STATUS, handle_status)
        .with(request_type::BLOCK_GET, handle_block_get)
        .with(request_type::BLOCK_ADD, handle_block_add)
        .with(request_type::ACCOUNT_GET, handle_account_get)
        .with(request_type::TX_ADD, handle_tx_add)
        .with(request_type::TX_GET_BY_WALLET, handle_tx_get_by_wallet)
        .with(request_type::REGISTER, handle_register)
        .with(request_type::STAKEHOLDER_LIST, handle_stakeholder_list)
        .with(
            request_type::CONSENSUS_CURRENT_SLOT,
            handle_consensus_current_slot,
        )
        .with(request_type::STAKEHOLDER_ADD, handle_stakeholder_add)
        .with(request_type::STAKEHOLDER_REMOVE, handle_stakeholder_remove)
        .with(
            request_type::STAKEHOLDER_UPDATE_STAKE,
            handle_stakeholder_update_stake,
        )
        .with(
            request_type::CONSENSUS_CURRENT_EPOCH,
            handle_consensus_current_epoch,
        )
        .with(
            request_type::CONSENSUS_SLOT_LEADER,
            handle_consensus_slot_leader,
        )
}

/// Miners accept transactions and blocks and answer consensus queries.
pub fn miner_dispatcher() -> Dispatcher<RoleCtx> {
    Dispatcher::new()
        .with(request_type::STATUS, handle_status)
        .with(request_type::BLOCK_GET, handle_block_get)
        .with(request_type::BLOCK_ADD, handle_block_add)
        .with(request_type::ACCOUNT_GET, handle_account_get)
        .with(request_type::TX_ADD, handle_tx_add)
        .with(request_type::TX_GET_BY_WALLET, handle_tx_get_by_wallet)
        .with(request_type::STAKEHOLDER_LIST, handle_stakeholder_list)
        .with(
            request_type::CONSENSUS_CURRENT_SLOT,
            handle_consensus_current_slot,
        )
        .with(
            request_type::CONSENSUS_CURRENT_EPOCH,
            handle_consensus_current_epoch,
        )
        .with(
            request_type::CONSENSUS_SLOT_LEADER,
            handle_consensus_slot_leader,
        )
}

/// Relays mirror the chain (ingesting pushed blocks) and serve reads;
/// they never produce and never accept transactions.
pub fn relay_dispatcher() -> Dispatcher<RoleCtx> {
    Dispatcher::new()
        .with(request_type::STATUS, handle_status)
        .with(request_type::BLOCK_GET, handle_block_get)
        .with(request_type::BLOCK_ADD, handle_block_add)
        .with(request_type::ACCOUNT_GET, handle_account_get)
        .with(request_type::TX_GET_BY_WALLET, handle_tx_get_by_wallet)
        .with(
            request_type::CONSENSUS_CURRENT_SLOT,
            handle_consensus_current_slot,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use plid_core::Transaction;
    use plid_network::{ErrorCode, Request};
    use tempfile::tempdir;

    fn ctx_in(dir: &Path) -> Arc<RoleCtx> {
        let mut config = NodeConfig::default();
        config.genesis_time = chrono::Utc::now().timestamp();
        build_ctx(dir, &config).unwrap()
    }

    #[test]
    fn status_reports_slot_and_next_block() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let payload = handle_status(&[], &ctx).unwrap();
        let status: StatusInfo = decode_from_slice(&payload).unwrap();
        assert_eq!(status.next_block_id, 0);
        assert_eq!(status.checkpoint_ids, vec![0]);
    }

    #[test]
    fn tx_add_then_account_get() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        {
            let mut ledger = ctx.ledger.lock();
            ledger.create_wallet(1).unwrap();
            ledger.create_wallet(2).unwrap();
            ledger.deposit(1, 100).unwrap();
        }

        let signed = SignedTx::unsigned(Transaction::transfer(1, 2, 30));
        handle_tx_add(&encode_to_vec(&signed).unwrap(), &ctx).unwrap();

        let payload = handle_account_get(&encode_to_vec(&2u64).unwrap(), &ctx).unwrap();
        let info: WalletInfo = decode_from_slice(&payload).unwrap();
        assert_eq!(info.balance, 30);

        let err = handle_account_get(&encode_to_vec(&9u64).unwrap(), &ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn block_get_of_missing_block_is_not_found() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let err = handle_block_get(&encode_to_vec(&0u64).unwrap(), &ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn block_add_then_block_get_round_trip() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let block = Block::new(
            0,
            chrono::Utc::now().timestamp(),
            plid_core::Hash::ZERO,
            b"payload".to_vec(),
            3,
            "m1".to_string(),
            Vec::new(),
        );
        handle_block_add(&encode_to_vec(&block).unwrap(), &ctx).unwrap();

        let bytes = handle_block_get(&encode_to_vec(&0u64).unwrap(), &ctx).unwrap();
        let back: Block = decode_from_slice(&bytes).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn register_tracks_active_servers() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let endpoint = Endpoint {
            host: "10.1.2.3".to_string(),
            port: 8518,
        };
        handle_register(&encode_to_vec(&endpoint).unwrap(), &ctx).unwrap();
        assert!(ctx.servers.lock().contains_key("10.1.2.3:8518"));
    }

    #[test]
    fn stakeholder_lifecycle_over_the_wire_payloads() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let stakeholder = Stakeholder {
            id: "m1".to_string(),
            host: "localhost".to_string(),
            port: 8518,
            stake: 500,
        };
        handle_stakeholder_add(&encode_to_vec(&stakeholder).unwrap(), &ctx).unwrap();

        let listed = handle_stakeholder_list(&[], &ctx).unwrap();
        let stakeholders: Vec<Stakeholder> = decode_from_slice(&listed).unwrap();
        assert_eq!(stakeholders.len(), 1);
        assert_eq!(stakeholders[0].stake, 500);

        let update = StakeUpdate {
            id: "m1".to_string(),
            stake: 900,
        };
        handle_stakeholder_update_stake(&encode_to_vec(&update).unwrap(), &ctx).unwrap();
        assert_eq!(ctx.scheduler.total_stake(), 900);

        handle_stakeholder_remove(&encode_to_vec(&"m1".to_string()).unwrap(), &ctx).unwrap();
        let err = handle_stakeholder_remove(&encode_to_vec(&"m1".to_string()).unwrap(), &ctx)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn relay_table_rejects_transactions() {
        let dispatcher = relay_dispatcher();
        assert!(!dispatcher.handles(request_type::TX_ADD));
        assert!(!dispatcher.handles(request_type::STAKEHOLDER_ADD));
        assert!(dispatcher.handles(request_type::BLOCK_GET));
        assert!(dispatcher.handles(request_type::BLOCK_ADD));

        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let response = dispatcher.dispatch(&Request::empty(request_type::TX_ADD), &ctx);
        assert_eq!(response.error_code, ErrorCode::BadRequest as u16);
    }

    #[test]
    fn beacon_table_covers_the_full_request_set() {
        let dispatcher = beacon_dispatcher();
        for req_type in 1..=14u16 {
            assert!(dispatcher.handles(req_type), "type {req_type} missing");
        }
    }
}
