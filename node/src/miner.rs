// Miner role
// Refreshes stakeholders, produces at slot boundaries, broadcasts blocks

use crate::config::{NodeConfig, Role};
use crate::handlers::{build_ctx, miner_dispatcher, RoleCtx};
use crate::server::{wait_for_shutdown, RoleServer};
use crate::sync::sync_from_beacons;
use plid_consensus::Stakeholder;
use plid_core::{decode_from_slice, encode_to_vec, Slot};
use plid_ledger::LedgerError;
use plid_network::{request_type, Endpoint, FetchClient, ListenerConfig, Service};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TICK: Duration = Duration::from_millis(100);
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const SYNC_INTERVAL: Duration = Duration::from_secs(10);

pub fn run(work_dir: &Path, config: NodeConfig) -> anyhow::Result<()> {
    let ctx = build_ctx(work_dir, &config)?;
    let beacons = config.beacon_endpoints()?;
    let client = FetchClient::new();
    let port = config.effective_port(Role::Miner);

    announce(&client, &beacons, &config, port)?;
    sync_from_beacons(&ctx, &client, &beacons);
    refresh_stakeholders(&ctx, &client, &beacons);

    let server = RoleServer::start(
        ListenerConfig::new(config.host.clone(), port),
        miner_dispatcher(),
        Arc::clone(&ctx),
    )?;
    info!(host = %config.host, port, miner_id = %config.miner_id, stake = config.stake,
          "miner serving");

    let tick_ctx = Arc::clone(&ctx);
    let tick_client = client.clone();
    let tick_beacons = beacons.clone();
    let miner_id = config.miner_id.clone();
    let mut tick = Service::spawn("miner-tick", move |stop| {
        let mut last_refresh = Instant::now();
        let mut last_sync = Instant::now();
        let mut last_produced_slot: Option<Slot> = None;

        while !stop.is_set() {
            thread::sleep(TICK);
            if last_refresh.elapsed() >= REFRESH_INTERVAL {
                last_refresh = Instant::now();
                refresh_stakeholders(&tick_ctx, &tick_client, &tick_beacons);
            }
            if last_sync.elapsed() >= SYNC_INTERVAL {
                last_sync = Instant::now();
                sync_from_beacons(&tick_ctx, &tick_client, &tick_beacons);
            }
            produce_if_leader(
                &tick_ctx,
                &tick_client,
                &tick_beacons,
                &miner_id,
                &mut last_produced_slot,
            );
        }
    })?;

    wait_for_shutdown()?;
    info!("miner shutting down");
    tick.stop();
    server.stop();
    Ok(())
}

/// Register with every beacon and publish our stake.
fn announce(
    client: &FetchClient,
    beacons: &[(String, u16)],
    config: &NodeConfig,
    port: u16,
) -> anyhow::Result<()> {
    let endpoint = Endpoint {
        host: config.host.clone(),
        port,
    };
    let own_stake = Stakeholder {
        id: config.miner_id.clone(),
        host: config.host.clone(),
        port,
        stake: config.stake,
    };

    for (host, beacon_port) in beacons {
        let beacon = format!("{host}:{beacon_port}");
        if let Err(err) = client.request(
            host,
            *beacon_port,
            request_type::REGISTER,
            encode_to_vec(&endpoint)?,
        ) {
            warn!(%beacon, %err, "register failed");
        }
        if let Err(err) = client.request(
            host,
            *beacon_port,
            request_type::STAKEHOLDER_ADD,
            encode_to_vec(&own_stake)?,
        ) {
            warn!(%beacon, %err, "stakeholder registration failed");
        }
    }
    Ok(())
}

/// Pull the stakeholder set from the first beacon that answers.
fn refresh_stakeholders(ctx: &RoleCtx, client: &FetchClient, beacons: &[(String, u16)]) {
    for (host, port) in beacons {
        match client.request(host, *port, request_type::STAKEHOLDER_LIST, Vec::new()) {
            Ok(payload) => match decode_from_slice::<Vec<Stakeholder>>(&payload) {
                Ok(stakeholders) => {
                    debug!(count = stakeholders.len(), "refreshed stakeholders");
                    ctx.scheduler.replace_stakeholders(stakeholders);
                    return;
                }
                Err(err) => warn!(%err, "bad stakeholder list payload"),
            },
            Err(err) => {
                warn!(beacon = %format!("{host}:{port}"), %err, "stakeholder refresh failed");
            }
        }
    }
}

/// Produce at most one block per slot, and only while inside the slot's
/// production window with transactions waiting.
fn produce_if_leader(
    ctx: &RoleCtx,
    client: &FetchClient,
    beacons: &[(String, u16)],
    miner_id: &str,
    last_produced_slot: &mut Option<Slot>,
) {
    let slot = ctx.scheduler.current_slot();
    if *last_produced_slot == Some(slot) {
        return;
    }
    if !ctx.scheduler.should_produce(slot, miner_id) {
        return;
    }

    let mut ledger = ctx.ledger.lock();
    if ledger.pending_count() == 0 {
        return;
    }

    let scheduler = &ctx.scheduler;
    let result = ledger.commit(slot, miner_id, |block, _chain| {
        let leader = scheduler
            .slot_leader(block.slot)
            .map_err(|err| err.to_string())?;
        if leader != block.slot_leader {
            return Err(format!(
                "slot {} belongs to {leader}, not {}",
                block.slot, block.slot_leader
            ));
        }
        Ok(())
    });

    match result {
        Ok(index) => {
            *last_produced_slot = Some(slot);
            info!(index, slot, "produced block");
            let bytes = ledger.block_bytes(index);
            drop(ledger);
            match bytes {
                Ok(bytes) => broadcast_block(client, beacons, bytes),
                Err(err) => warn!(%err, "could not re-read produced block for broadcast"),
            }
        }
        Err(LedgerError::NothingToCommit) => {}
        Err(err) => warn!(slot, %err, "block production failed"),
    }
}

fn broadcast_block(client: &FetchClient, beacons: &[(String, u16)], bytes: Vec<u8>) {
    for (host, port) in beacons {
        if let Err(err) = client.request(host, *port, request_type::BLOCK_ADD, bytes.clone()) {
            warn!(beacon = %format!("{host}:{port}"), %err, "block broadcast failed");
        }
    }
}
