//! Dispatcher configuration with documented constants
//!
//! Values can be loaded from a TOML file; every field has a default so a
//! partial file only overrides what it names.
//!
//! ```toml
//! unrestricted_archetype = "root"
//! query_limit = 100
//!
//! [jit]
//! threshold = 100
//! capacity = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Top-level configuration for a [`crate::Dispatcher`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Archetype that sees every declared aspect regardless of requirements
    ///
    /// Intended for operators and test harnesses. Any observer presenting
    /// this archetype bypasses required-archetype checks entirely.
    pub unrestricted_archetype: String,

    /// Upper bound on discovery results when the caller passes no limit
    pub query_limit: usize,

    pub jit: JitConfig,
}

/// Tuning for the JIT specializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Disabling the specializer never changes results, only latency
    pub enabled: bool,

    /// Generic hits on one signature before a specialized handler is compiled
    ///
    /// At 100, a path must be clearly hot before the background compile
    /// is worth its cost. Tests lower this to a handful.
    pub threshold: u64,

    /// Maximum number of cache entries before least-recently-hit eviction
    pub capacity: usize,

    /// Seconds an entry may sit without a hit before it is dropped
    pub ttl_secs: u64,

    /// Generic outcomes recorded per signature to check a candidate against
    /// before promotion (idempotent aspects only)
    pub check_samples: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            unrestricted_archetype: "root".to_string(),
            query_limit: 100,
            jit: JitConfig::default(),
        }
    }
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100,
            capacity: 1024,
            ttl_secs: 600,
            check_samples: 4,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = toml::from_str(content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.unrestricted_archetype.trim().is_empty() {
            return Err("unrestricted_archetype must not be empty".into());
        }

        if self.query_limit == 0 {
            return Err("query_limit must be at least 1".into());
        }

        if self.jit.threshold == 0 {
            return Err("jit.threshold must be at least 1".into());
        }

        // A cache that cannot hold one entry would evict every promotion
        if self.jit.enabled && self.jit.capacity == 0 {
            return Err("jit.capacity must be at least 1 when the JIT is enabled".into());
        }

        if self.jit.ttl_secs == 0 {
            return Err("jit.ttl_secs must be positive".into());
        }

        Ok(())
    }
}
