// Relay role
// Mirrors the beacon's chain and serves read requests

use crate::config::{NodeConfig, Role};
use crate::handlers::{build_ctx, relay_dispatcher};
use crate::server::{wait_for_shutdown, RoleServer};
use crate::sync::sync_from_beacons;
use plid_core::encode_to_vec;
use plid_network::{request_type, Endpoint, FetchClient, ListenerConfig, Service};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK: Duration = Duration::from_millis(250);
const SYNC_INTERVAL: Duration = Duration::from_secs(2);

pub fn run(work_dir: &Path, config: NodeConfig) -> anyhow::Result<()> {
    let ctx = build_ctx(work_dir, &config)?;
    let beacons = config.beacon_endpoints()?;
    let client = FetchClient::new();
    let port = config.effective_port(Role::Relay);

    // Announce ourselves, then catch up before serving.
    let endpoint = Endpoint {
        host: config.host.clone(),
        port,
    };
    for (host, beacon_port) in &beacons {
        if let Err(err) = client.request(
            host,
            *beacon_port,
            request_type::REGISTER,
            encode_to_vec(&endpoint)?,
        ) {
            warn!(beacon = %format!("{host}:{beacon_port}"), %err, "register failed");
        }
    }
    let caught_up = sync_from_beacons(&ctx, &client, &beacons);
    info!(blocks = caught_up, "initial sync complete");

    let server = RoleServer::start(
        ListenerConfig::new(config.host.clone(), port),
        relay_dispatcher(),
        Arc::clone(&ctx),
    )?;
    info!(host = %config.host, port, "relay serving");

    let tick_ctx = Arc::clone(&ctx);
    let tick_client = client.clone();
    let tick_beacons = beacons.clone();
    let mut tick = Service::spawn("relay-tick", move |stop| {
        let mut last_sync = Instant::now();
        while !stop.is_set() {
            thread::sleep(TICK);
            if last_sync.elapsed() < SYNC_INTERVAL {
                continue;
            }
            last_sync = Instant::now();
            sync_from_beacons(&tick_ctx, &tick_client, &tick_beacons);
        }
    })?;

    wait_for_shutdown()?;
    info!("relay shutting down");
    tick.stop();
    server.stop();
    Ok(())
}
