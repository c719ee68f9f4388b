// Beacon role
// Authoritative chain, stakeholder registry, active-server table

use crate::config::{NodeConfig, Role};
use crate::handlers::{beacon_dispatcher, build_ctx, RoleCtx};
use crate::server::{wait_for_shutdown, RoleServer};
use plid_network::{ListenerConfig, Service};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK: Duration = Duration::from_millis(250);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);
/// A registered server is dropped after this long without a new register.
const SERVER_EXPIRY_SECS: i64 = 300;

pub fn run(work_dir: &Path, config: NodeConfig) -> anyhow::Result<()> {
    let ctx = build_ctx(work_dir, &config)?;
    let port = config.effective_port(Role::Beacon);

    let server = RoleServer::start(
        ListenerConfig::new(config.host.clone(), port),
        beacon_dispatcher(),
        Arc::clone(&ctx),
    )?;
    info!(host = %config.host, port, next_block_id = ctx.ledger.lock().next_block_id(),
          "beacon serving");

    let tick_ctx = Arc::clone(&ctx);
    let checkpoint_age = Duration::from_secs(config.checkpoint_age);
    let mut tick = Service::spawn("beacon-tick", move |stop| {
        let mut last_maintenance = Instant::now();
        while !stop.is_set() {
            thread::sleep(TICK);
            if last_maintenance.elapsed() < MAINTENANCE_INTERVAL {
                continue;
            }
            last_maintenance = Instant::now();
            expire_servers(&tick_ctx);
            if let Err(err) = tick_ctx.ledger.lock().tier_aged(checkpoint_age) {
                warn!(%err, "aged tiering failed");
            }
        }
    })?;

    wait_for_shutdown()?;
    info!("beacon shutting down");
    tick.stop();
    server.stop();
    Ok(())
}

fn expire_servers(ctx: &RoleCtx) {
    let cutoff = chrono::Utc::now().timestamp() - SERVER_EXPIRY_SECS;
    let mut servers = ctx.servers.lock();
    let before = servers.len();
    servers.retain(|_, last_seen| *last_seen >= cutoff);
    let expired = before - servers.len();
    if expired > 0 {
        info!(expired, remaining = servers.len(), "expired inactive servers");
    }
}
