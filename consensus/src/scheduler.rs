use parking_lot::RwLock;
use plid_core::{ChainReader, CodecError, Decode, Encode, Epoch, Reader, Slot, Writer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;
use tracing::debug;

/// Minimum fraction of slots in a candidate chain's span that must carry a
/// block for the chain to be adopted.
pub const DENSITY_THRESHOLD: f64 = 0.5;

/// Default width of the block-production window at the end of a slot.
pub const DEFAULT_PRODUCTION_WINDOW_SECS: u64 = 1;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("no stakeholders registered")]
    NoStakeholders,
    #[error("stakeholder {0} is not registered")]
    UnknownStakeholder(String),
    #[error("total stake is zero")]
    ZeroStake,
}

/// One stake-weighted participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stakeholder {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub stake: u64,
}

impl Encode for Stakeholder {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_string(&self.id)?;
        w.write_string(&self.host)?;
        w.write_u16(self.port)?;
        w.write_u64(self.stake)
    }
}

impl Decode for Stakeholder {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Stakeholder {
            id: r.read_string()?,
            host: r.read_string()?,
            port: r.read_u16()?,
            stake: r.read_u64()?,
        })
    }
}

/// Slot/epoch arithmetic. `current_slot` is
/// `(now + time_offset - genesis_time) / slot_duration`.
#[derive(Clone, Copy, Debug)]
pub struct SlotClock {
    pub genesis_time: i64,
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
    pub time_offset: i64,
}

impl SlotClock {
    pub fn new(genesis_time: i64, slot_duration: u64, slots_per_epoch: u64) -> Self {
        SlotClock {
            genesis_time,
            slot_duration: slot_duration.max(1),
            slots_per_epoch: slots_per_epoch.max(1),
            time_offset: 0,
        }
    }

    pub fn with_time_offset(mut self, time_offset: i64) -> Self {
        self.time_offset = time_offset;
        self
    }

    pub fn slot_at(&self, now: i64) -> Slot {
        let elapsed = now + self.time_offset - self.genesis_time;
        if elapsed <= 0 {
            return 0;
        }
        elapsed as u64 / self.slot_duration
    }

    pub fn epoch_at(&self, now: i64) -> Epoch {
        self.slot_at(now) / self.slots_per_epoch
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        slot / self.slots_per_epoch
    }

    pub fn current_slot(&self) -> Slot {
        self.slot_at(chrono::Utc::now().timestamp())
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epoch_at(chrono::Utc::now().timestamp())
    }

    /// Seconds from `now` until the given slot ends.
    pub fn remaining_in_slot(&self, slot: Slot, now: i64) -> i64 {
        let slot_end = self.genesis_time - self.time_offset
            + ((slot + 1) * self.slot_duration) as i64;
        slot_end - now
    }
}

/// Stakeholder registry plus the slot clock: decides who leads each slot.
/// The registry is ordered by id so the cumulative-stake walk is
/// deterministic across processes.
pub struct Scheduler {
    clock: SlotClock,
    stakeholders: RwLock<BTreeMap<String, Stakeholder>>,
    total_stake: RwLock<u64>,
    production_window_secs: u64,
}

impl Scheduler {
    pub fn new(clock: SlotClock) -> Self {
        Scheduler {
            clock,
            stakeholders: RwLock::new(BTreeMap::new()),
            total_stake: RwLock::new(0),
            production_window_secs: DEFAULT_PRODUCTION_WINDOW_SECS,
        }
    }

    pub fn with_production_window(mut self, secs: u64) -> Self {
        self.production_window_secs = secs.max(1);
        self
    }

    pub fn clock(&self) -> &SlotClock {
        &self.clock
    }

    pub fn current_slot(&self) -> Slot {
        self.clock.current_slot()
    }

    pub fn current_epoch(&self) -> Epoch {
        self.clock.current_epoch()
    }

    // ---- stakeholder registry ----

    pub fn add_stakeholder(&self, stakeholder: Stakeholder) {
        let mut members = self.stakeholders.write();
        let mut total = self.total_stake.write();
        if let Some(previous) = members.insert(stakeholder.id.clone(), stakeholder.clone()) {
            *total -= previous.stake;
        }
        *total += stakeholder.stake;
        debug!(id = %stakeholder.id, stake = stakeholder.stake, "registered stakeholder");
    }

    pub fn remove_stakeholder(&self, id: &str) -> bool {
        let mut members = self.stakeholders.write();
        let mut total = self.total_stake.write();
        match members.remove(id) {
            Some(removed) => {
                *total -= removed.stake;
                true
            }
            None => false,
        }
    }

    pub fn update_stake(&self, id: &str, stake: u64) -> Result<(), ConsensusError> {
        let mut members = self.stakeholders.write();
        let mut total = self.total_stake.write();
        let member = members
            .get_mut(id)
            .ok_or_else(|| ConsensusError::UnknownStakeholder(id.to_string()))?;
        *total = *total - member.stake + stake;
        member.stake = stake;
        Ok(())
    }

    /// Snapshot of the registry, ordered by id.
    pub fn stakeholders(&self) -> Vec<Stakeholder> {
        self.stakeholders.read().values().cloned().collect()
    }

    /// Replace the whole registry (miners refresh theirs from the beacon).
    pub fn replace_stakeholders(&self, stakeholders: Vec<Stakeholder>) {
        let mut members = self.stakeholders.write();
        let mut total = self.total_stake.write();
        members.clear();
        *total = 0;
        for stakeholder in stakeholders {
            *total += stakeholder.stake;
            members.insert(stakeholder.id.clone(), stakeholder);
        }
    }

    pub fn total_stake(&self) -> u64 {
        *self.total_stake.read()
    }

    pub fn stakeholder_count(&self) -> usize {
        self.stakeholders.read().len()
    }

    // ---- leader election ----

    /// Deterministic slot leader: seed ChaCha20 with
    /// `SHA-256(epoch_be ‖ slot_be)`, draw `r` in `[0, total_stake)` and pick
    /// the stakeholder whose cumulative stake interval contains `r`.
    pub fn slot_leader(&self, slot: Slot) -> Result<String, ConsensusError> {
        let members = self.stakeholders.read();
        if members.is_empty() {
            return Err(ConsensusError::NoStakeholders);
        }
        let total = *self.total_stake.read();
        if total == 0 {
            return Err(ConsensusError::ZeroStake);
        }

        let epoch = self.clock.epoch_of(slot);
        let mut rng = ChaCha20Rng::from_seed(leader_seed(epoch, slot));
        let draw = rng.gen_range(0..total);

        let mut cumulative = 0u64;
        for stakeholder in members.values() {
            cumulative += stakeholder.stake;
            if draw < cumulative {
                return Ok(stakeholder.id.clone());
            }
        }
        // Unreachable while total_stake equals the sum of member stakes.
        Err(ConsensusError::ZeroStake)
    }

    pub fn is_slot_leader(&self, slot: Slot, id: &str) -> bool {
        self.slot_leader(slot).map(|leader| leader == id).unwrap_or(false)
    }

    /// Leadership plus block-production time: leaders only produce inside
    /// the final window of their slot so the rest of the slot collects
    /// transactions.
    pub fn should_produce(&self, slot: Slot, id: &str) -> bool {
        if !self.is_slot_leader(slot, id) {
            return false;
        }
        let now = chrono::Utc::now().timestamp();
        let remaining = self.clock.remaining_in_slot(slot, now);
        remaining >= 0 && (remaining as u64) <= self.production_window_secs
    }

    // ---- chain selection ----

    /// Longest-chain rule with a density guard: a longer candidate is only
    /// adopted when at least half of the slots in its span carry a block.
    pub fn should_switch_chain(
        &self,
        current: &dyn ChainReader,
        candidate: &dyn ChainReader,
    ) -> bool {
        if candidate.size() <= current.size() {
            return false;
        }
        let Some(latest) = candidate.latest() else {
            return false;
        };
        let first_slot = candidate.get(0).map(|b| b.slot).unwrap_or(0);
        chain_density_ok(candidate.size(), first_slot, latest.slot)
    }
}

/// Density check over the slot span `[first_slot, latest_slot]`.
pub fn chain_density_ok(block_count: u64, first_slot: Slot, latest_slot: Slot) -> bool {
    if latest_slot <= first_slot {
        return true;
    }
    let span = latest_slot - first_slot + 1;
    (block_count as f64) / (span as f64) >= DENSITY_THRESHOLD
}

fn leader_seed(epoch: Epoch, slot: Slot) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(epoch.to_be_bytes());
    hasher.update(slot.to_be_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    seed
}
