//! Walship Configuration
//!
//! Configuration for the replication shipper: the local cluster name stamped
//! into outgoing mutations, batching limits, and per-peer connection
//! credentials.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Name of this cluster. Stamped into every replicated mutation's
    /// source set, so it must be stable across the cluster's lifetime.
    pub name: String,

    /// Byte budget for one edit batch
    #[serde(default = "default_byte_budget")]
    pub default_byte_budget: u64,

    /// Timeout for the network send step, in seconds
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Per-peer connection settings, keyed by peer name
    #[serde(default)]
    pub peers: BTreeMap<String, PeerConfig>,
}

/// Connection settings for one replication peer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Principal to connect as
    #[serde(default)]
    pub principal: Option<String>,

    /// Password for the principal
    #[serde(default)]
    pub password: Option<String>,

    /// Path to a keytab for the principal
    #[serde(default)]
    pub keytab: Option<PathBuf>,
}

/// Credentials resolved for a peer connection.
///
/// `None` is a valid outcome: the transport then authenticates however its
/// environment provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCredentials {
    Password { principal: String, password: String },
    Keytab { principal: String, keytab: PathBuf },
    None,
}

fn default_byte_budget() -> u64 {
    50 * 1024 * 1024
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl ReplicationConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: ReplicationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::Config("name cannot be empty".into()));
        }
        if self.default_byte_budget == 0 {
            return Err(crate::Error::Config(
                "default_byte_budget must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Resolve credentials for a peer by name.
    ///
    /// A password pairing wins over a keytab when both are configured. An
    /// unknown peer, or a principal with neither secret, resolves to
    /// [`PeerCredentials::None`].
    pub fn peer_credentials(&self, peer_name: &str) -> PeerCredentials {
        let Some(peer) = self.peers.get(peer_name) else {
            return PeerCredentials::None;
        };
        let Some(principal) = peer.principal.clone() else {
            return PeerCredentials::None;
        };
        if let Some(password) = peer.password.clone() {
            return PeerCredentials::Password {
                principal,
                password,
            };
        }
        if let Some(keytab) = peer.keytab.clone() {
            return PeerCredentials::Keytab { principal, keytab };
        }
        PeerCredentials::None
    }

    /// Get the send timeout as a Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
