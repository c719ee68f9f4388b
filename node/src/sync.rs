// Chain catch-up
// Pull missing blocks from a beacon, one at a time, in id order

use crate::handlers::RoleCtx;
use plid_core::{decode_from_slice, encode_to_vec, Block};
use plid_network::{request_type, FetchClient, StatusInfo};
use tracing::{debug, warn};

/// Hard cap on blocks pulled in one pass so a tick never runs unbounded.
const MAX_BLOCKS_PER_SYNC: u64 = 10_000;

/// Catch the local chain up to the first reachable beacon. Returns the
/// number of blocks applied.
pub fn sync_from_beacons(
    ctx: &RoleCtx,
    client: &FetchClient,
    beacons: &[(String, u16)],
) -> usize {
    for (host, port) in beacons {
        match sync_from(ctx, client, host, *port) {
            Ok(added) => return added,
            Err(err) => {
                warn!(beacon = %format!("{host}:{port}"), %err, "beacon sync failed");
            }
        }
    }
    0
}

fn sync_from(
    ctx: &RoleCtx,
    client: &FetchClient,
    host: &str,
    port: u16,
) -> anyhow::Result<usize> {
    let payload = client.request(host, port, request_type::STATUS, Vec::new())?;
    let status: StatusInfo = decode_from_slice(&payload)?;

    let mut added = 0usize;
    loop {
        let next = ctx.ledger.lock().next_block_id();
        if next >= status.next_block_id || added as u64 >= MAX_BLOCKS_PER_SYNC {
            break;
        }

        let payload = client.request(host, port, request_type::BLOCK_GET, encode_to_vec(&next)?)?;
        let block: Block = decode_from_slice(&payload)?;
        let mut ledger = ctx.ledger.lock();
        let strict = block.index >= ledger.checkpoint_id();
        ledger.add_block(block, strict)?;
        drop(ledger);
        added += 1;
    }

    if added > 0 {
        debug!(added, from = %format!("{host}:{port}"), "synced blocks from beacon");
    }
    Ok(added)
}
