//! Buffer sizing for the bus and its mailboxes.
//!
//! Values come from defaults, optionally overlaid by environment variables
//! or a TOML file:
//!
//! ```toml
//! [central]
//! capacity = 512
//! growable = true
//!
//! [mailbox]
//! capacity = 64
//! growable = false
//! ```

use crate::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CAPACITY: usize = 200;

/// Shape of one ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub capacity: usize,
    pub growable: bool,
}

impl BufferConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            growable: false,
        }
    }

    pub fn growable(capacity: usize) -> Self {
        Self {
            capacity,
            growable: true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BusError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::growable(DEFAULT_CAPACITY)
    }
}

/// Settings fixed when a bus is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// Queue shared by all publishers.
    #[serde(default)]
    pub central: BufferConfig,
    /// Per-node inbound queue.
    #[serde(default)]
    pub mailbox: BufferConfig,
}

impl BusConfig {
    /// Defaults overlaid with `EVENTRING_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        overlay_env(&mut cfg.central, "EVENTRING_CENTRAL");
        overlay_env(&mut cfg.mailbox, "EVENTRING_MAILBOX");
        cfg
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: BusConfig =
            toml::from_str(s).map_err(|e| BusError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a TOML file. A missing file yields [`BusConfig::from_env`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return Ok(Self::from_env());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.central.validate()?;
        self.mailbox.validate()
    }
}

fn overlay_env(buf: &mut BufferConfig, prefix: &str) {
    let cap_key = format!("{prefix}_CAPACITY");
    if let Ok(v) = std::env::var(&cap_key) {
        match v.parse::<usize>() {
            Ok(n) if n > 0 => buf.capacity = n,
            _ => tracing::warn!(target: "config", key = %cap_key, value = %v, "Ignoring invalid capacity"),
        }
    }
    let grow_key = format!("{prefix}_GROWABLE");
    if let Ok(v) = std::env::var(&grow_key) {
        match v.parse::<bool>() {
            Ok(b) => buf.growable = b,
            Err(_) => tracing::warn!(target: "config", key = %grow_key, value = %v, "Ignoring invalid flag"),
        }
    }
}
