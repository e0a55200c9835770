//! Relay configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working non-root node. Values are layered: the optional TOML file first,
//! then environment variables such as `COMPAS__PIT__MAX_ENTRIES=128`.

use rust_compas_common::{ndn::Name, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub node: NodeConfig,
    pub pit: PitConfig,
    pub cs: CsConfig,
    pub compas: CompasConfig,
    pub face: FaceConfig,
    pub link: LinkConfig,
}

/// Identity of this node in the DODAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Whether this node is the DODAG root (the sink).
    pub root: bool,

    /// Name prefix of the DODAG.
    pub prefix: String,

    /// Content under these prefixes is classified reliable.
    pub reliable_prefixes: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            root: false,
            prefix: "/compas".to_string(),
            reliable_prefixes: Vec::new(),
        }
    }
}

/// Pending interest table limits and timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    pub retransmit_timeout_ms: u64,
    pub max_retransmit: u32,
    /// Lifetime given to Interests issued by this node.
    pub interest_lifetime_ms: u32,
    pub max_entries: usize,
    pub max_pending_faces: usize,
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout_ms: 1000,
            max_retransmit: 3,
            interest_lifetime_ms: 4000,
            max_entries: 64,
            max_pending_faces: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsConfig {
    pub capacity: usize,
}

impl Default for CsConfig {
    fn default() -> Self {
        Self { capacity: 5 }
    }
}

/// COMPAS routing timers and budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompasConfig {
    pub nam_period_ms: u64,
    /// Advertisement attempts per name before the parent is given up.
    pub nam_retries: u32,
    pub nam_cache_size: usize,
    pub sol_period_ms: u64,
    /// Solicitations up to this count go unicast to the last parent.
    pub sol_unicast_threshold: u32,
    pub trickle_imin_ms: u64,
    pub trickle_doublings: u32,
    pub trickle_redundancy: u32,
    pub parent_timeout_ms: u64,
    /// Upper bound of the random delay before the first PAM.
    pub pam_jitter_ms: u64,
}

impl Default for CompasConfig {
    fn default() -> Self {
        Self {
            nam_period_ms: 1000,
            nam_retries: 3,
            nam_cache_size: 8,
            sol_period_ms: 1000,
            sol_unicast_threshold: 3,
            trickle_imin_ms: 500,
            trickle_doublings: 6,
            trickle_redundancy: 3,
            parent_timeout_ms: 15_000,
            pam_jitter_ms: 200,
        }
    }
}

/// Face table limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub max_faces: usize,
    /// Unreferenced faces quiet for this long are removed.
    pub idle_timeout_ms: u64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            max_faces: 128,
            idle_timeout_ms: 60_000,
        }
    }
}

/// Emulated link settings used by the binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub bind: String,
    /// Peers reached by a broadcast.
    pub neighbours: Vec<String>,
    pub mtu: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", crate::DEFAULT_UDP_PORT),
            neighbours: Vec::new(),
            mtu: 1500,
        }
    }
}

impl RelayConfig {
    /// Load configuration from an optional file, overridden by `COMPAS__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("COMPAS")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("link.neighbours")
                .with_list_parse_key("node.reliable_prefixes")
                .try_parsing(true),
        );

        let config: RelayConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("pit.retransmit_timeout_ms", self.pit.retransmit_timeout_ms),
            ("compas.nam_period_ms", self.compas.nam_period_ms),
            ("compas.sol_period_ms", self.compas.sol_period_ms),
            ("compas.trickle_imin_ms", self.compas.trickle_imin_ms),
            ("compas.parent_timeout_ms", self.compas.parent_timeout_ms),
            ("face.idle_timeout_ms", self.face.idle_timeout_ms),
        ];
        for (key, value) in periods {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", key)));
            }
        }
        if self.face.max_faces == 0 {
            return Err(Error::Config("face.max_faces must be greater than zero".into()));
        }
        if self.pit.interest_lifetime_ms == 0 {
            return Err(Error::Config("pit.interest_lifetime_ms must be greater than zero".into()));
        }

        let prefix: Name = self
            .node
            .prefix
            .parse()
            .map_err(|_| Error::Config(format!("invalid node.prefix {:?}", self.node.prefix)))?;
        if prefix.is_empty() {
            return Err(Error::Config("node.prefix must not be empty".into()));
        }

        Ok(())
    }

    pub fn prefix(&self) -> Name {
        Name::from_string(&self.node.prefix)
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.pit.retransmit_timeout_ms)
    }

    pub fn nam_period(&self) -> Duration {
        Duration::from_millis(self.compas.nam_period_ms)
    }

    pub fn sol_period(&self) -> Duration {
        Duration::from_millis(self.compas.sol_period_ms)
    }

    pub fn parent_timeout(&self) -> Duration {
        Duration::from_millis(self.compas.parent_timeout_ms)
    }

    pub fn face_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.face.idle_timeout_ms)
    }
}
