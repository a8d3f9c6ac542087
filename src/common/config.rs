//! # Configuration Utilities
//!
//! Static cluster configuration: the peer table and the election timings. Loaded once
//! from a TOML file (or taken from the built-in localhost table) and never changed while
//! the process runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use super::error::ConfigError;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ClusterConfig = load_config("config/cluster.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// One entry of the peer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Unique identifier; its lexicographic order is the election rank
    pub id: String,
    /// Base URL other nodes use to reach this peer (e.g. "http://127.0.0.1:6001")
    pub address: String,
    /// Port this peer listens on. Taken from `address` when omitted.
    #[serde(default)]
    pub port: Option<u16>,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port: None,
        }
    }

    /// Port to bind when this entry describes the local node.
    pub fn listen_port(&self) -> Result<u16, ConfigError> {
        if let Some(port) = self.port {
            return Ok(port);
        }

        self.address
            .rsplit(':')
            .next()
            .map(|tail| tail.trim_end_matches('/'))
            .and_then(|tail| tail.parse::<u16>().ok())
            .ok_or_else(|| ConfigError::MissingPort {
                id: self.id.clone(),
                address: self.address.clone(),
            })
    }
}

/// Election timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Pause between two heartbeat pings to the leader (seconds)
    pub heartbeat_interval_secs: u64,
    /// Timeout applied to every outbound request (seconds)
    pub request_timeout_secs: u64,
    /// Pause between bootstrap ping attempts (milliseconds)
    pub bootstrap_retry_millis: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            request_timeout_secs: 5,
            bootstrap_retry_millis: 1000,
        }
    }
}

impl ElectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_millis)
    }
}

/// Complete cluster configuration as found in the TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub peers: Vec<PeerInfo>,
    #[serde(default)]
    pub election: ElectionConfig,
}

impl Default for ClusterConfig {
    /// Four nodes on localhost, ports 6001 to 6004.
    fn default() -> Self {
        let peers = (1..=4)
            .map(|n| PeerInfo {
                id: format!("node-{:02}", n),
                address: format!("http://localhost:{}", 6000 + n),
                port: Some(6000 + n),
            })
            .collect();

        Self {
            peers,
            election: ElectionConfig::default(),
        }
    }
}
