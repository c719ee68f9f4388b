// Node configuration
// Work-dir config.json plus role defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_BEACON_PORT: u16 = 8517;
pub const DEFAULT_MINER_PORT: u16 = 8518;
pub const DEFAULT_RELAY_PORT: u16 = 8519;

pub const DEFAULT_SLOT_DURATION: u64 = 5;
pub const DEFAULT_SLOTS_PER_EPOCH: u64 = 432;
/// 1 GiB active-store budget before segments move to the archive.
pub const DEFAULT_CHECKPOINT_SIZE: u64 = 1024 * 1024 * 1024;
/// One year, in seconds: sealed segments older than this are archived.
pub const DEFAULT_CHECKPOINT_AGE: u64 = 365 * 24 * 60 * 60;
pub const DEFAULT_BLOCK_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("i/o error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("configuration field {0} is required")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Beacon,
    Miner,
    Relay,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Beacon => "beacon",
            Role::Miner => "miner",
            Role::Relay => "relay",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Role::Beacon => DEFAULT_BEACON_PORT,
            Role::Miner => DEFAULT_MINER_PORT,
            Role::Relay => DEFAULT_RELAY_PORT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    pub host: String,
    /// 0 means "use the role default"
    pub port: u16,
    /// Beacon endpoints as `host:port`
    pub beacons: Vec<String>,
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
    /// Stamped at `--init`; all roles of one network must share it
    pub genesis_time: i64,
    pub time_offset: i64,
    pub checkpoint_size: u64,
    pub checkpoint_age: u64,
    pub block_file_size: u64,
    pub miner_id: String,
    pub stake: u64,
    /// Path to key material; unused by the permissive verifier
    pub keys: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            beacons: Vec::new(),
            slot_duration: DEFAULT_SLOT_DURATION,
            slots_per_epoch: DEFAULT_SLOTS_PER_EPOCH,
            genesis_time: 0,
            time_offset: 0,
            checkpoint_size: DEFAULT_CHECKPOINT_SIZE,
            checkpoint_age: DEFAULT_CHECKPOINT_AGE,
            block_file_size: DEFAULT_BLOCK_FILE_SIZE,
            miner_id: String::new(),
            stake: 0,
            keys: String::new(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn effective_port(&self, role: Role) -> u16 {
        if self.port == 0 {
            role.default_port()
        } else {
            self.port
        }
    }

    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.slot_duration == 0 {
            return Err(ConfigError::Invalid("slotDuration must be positive".into()));
        }
        if self.slots_per_epoch == 0 {
            return Err(ConfigError::Invalid(
                "slotsPerEpoch must be positive".into(),
            ));
        }
        if self.block_file_size == 0 || self.checkpoint_size == 0 {
            return Err(ConfigError::Invalid(
                "checkpointSize and blockFileSize must be positive".into(),
            ));
        }
        match role {
            Role::Beacon => {}
            Role::Miner => {
                if self.miner_id.is_empty() {
                    return Err(ConfigError::Missing("minerId"));
                }
                if self.stake == 0 {
                    return Err(ConfigError::Missing("stake"));
                }
                if self.beacons.is_empty() {
                    return Err(ConfigError::Missing("beacons"));
                }
            }
            Role::Relay => {
                if self.beacons.is_empty() {
                    return Err(ConfigError::Missing("beacons"));
                }
            }
        }
        self.beacon_endpoints()?;
        Ok(())
    }

    /// Parse the `host:port` beacon list.
    pub fn beacon_endpoints(&self) -> Result<Vec<(String, u16)>, ConfigError> {
        let mut endpoints = Vec::with_capacity(self.beacons.len());
        for entry in &self.beacons {
            let (host, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::Invalid(format!("beacon address {entry}")))?;
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("beacon port in {entry}")))?;
            if host.is_empty() {
                return Err(ConfigError::Invalid(format!("beacon address {entry}")));
            }
            endpoints.push((host.to_string(), port));
        }
        Ok(endpoints)
    }
}
