//! Input port configuration
//!
//! Ports are configured from YAML, typically one document per port:
//!
//! ```yaml
//! name: dataShort_in
//! max_queue_depth: 100
//! default_blocking: false
//! ```
//!
//! Missing fields take their defaults, so an empty mapping is a valid
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::StreamError;

/// Default number of packets an input port queues before flushing.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 100;

/// Settings for an [`InPort`](crate::InPort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Port name, used in log output
    pub name: String,
    /// Packets queued across all streams before the queue is flushed
    pub max_queue_depth: usize,
    /// Producers wait for space instead of flushing, even if no stream's SRI
    /// asks for blocking
    pub default_blocking: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "in".to_string(),
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            default_blocking: false,
        }
    }
}

impl PortConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    pub fn with_default_blocking(mut self, blocking: bool) -> Self {
        self.default_blocking = blocking;
        self
    }

    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PortConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StreamError::config(format!("YAML parsing failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml(&yaml)
            .with_context(|| format!("Failed to load port config from {}", path.display()))?;
        debug!(path = %path.display(), name = %config.name, "Loaded port config");
        Ok(config)
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(StreamError::config("port name must not be empty"));
        }
        if self.max_queue_depth == 0 {
            return Err(StreamError::config("max_queue_depth must be at least 1"));
        }
        Ok(())
    }
}
