//! Configuration for per-node accounting.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CacheError, Result};

/// Annotation carrying a pod's resource reservation.
pub const DEFAULT_RESERVATION_ANNOTATION: &str = "podfit.io/resource-reservation";

/// Default CPU assumed for scoring when a container requests none, in millicores.
pub const DEFAULT_MILLI_CPU_REQUEST: i64 = 100;

/// Default memory assumed for scoring when a container requests none, in bytes.
pub const DEFAULT_MEMORY_REQUEST: i64 = 200 * 1024 * 1024;

/// Substitute requests used by scoring heuristics for containers that
/// declare no CPU or memory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonZeroDefaults {
    /// CPU in millicores.
    pub milli_cpu: i64,
    /// Memory in bytes.
    pub memory: i64,
}

impl Default for NonZeroDefaults {
    fn default() -> Self {
        Self {
            milli_cpu: DEFAULT_MILLI_CPU_REQUEST,
            memory: DEFAULT_MEMORY_REQUEST,
        }
    }
}

/// Configuration shared by every `NodeInfo` of a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Defaults for the non-zero request totals.
    pub non_zero: NonZeroDefaults,
    /// Pod annotation holding the reservation request.
    pub reservation_annotation: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            non_zero: NonZeroDefaults::default(),
            reservation_annotation: DEFAULT_RESERVATION_ANNOTATION.to_string(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `NONZERO_DEFAULT_MILLI_CPU`: default CPU request for scoring
    /// - `NONZERO_DEFAULT_MEMORY_BYTES`: default memory request for scoring
    /// - `RESERVATION_ANNOTATION`: annotation key for reservation requests
    ///
    /// Unparseable numbers keep the default. The result is not validated;
    /// constructors taking a `CacheConfig` do that.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value. Same variables and fallbacks as [`from_env`](Self::from_env).
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("NONZERO_DEFAULT_MILLI_CPU") {
            match val.trim().parse() {
                Ok(n) => config.non_zero.milli_cpu = n,
                Err(_) => warn!(value = %val, "Ignoring invalid NONZERO_DEFAULT_MILLI_CPU"),
            }
        }
        if let Some(val) = lookup("NONZERO_DEFAULT_MEMORY_BYTES") {
            match val.trim().parse() {
                Ok(n) => config.non_zero.memory = n,
                Err(_) => warn!(value = %val, "Ignoring invalid NONZERO_DEFAULT_MEMORY_BYTES"),
            }
        }
        if let Some(val) = lookup("RESERVATION_ANNOTATION") {
            config.reservation_annotation = val;
        }

        config
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a default is negative or the annotation key is empty.
    pub fn validate(&self) -> Result<()> {
        if self.non_zero.milli_cpu < 0 {
            return Err(CacheError::Config(format!(
                "default CPU request {}m is negative",
                self.non_zero.milli_cpu
            )));
        }
        if self.non_zero.memory < 0 {
            return Err(CacheError::Config(format!(
                "default memory request {} is negative",
                self.non_zero.memory
            )));
        }
        if self.reservation_annotation.is_empty() {
            return Err(CacheError::Config(
                "reservation annotation key is empty".to_string(),
            ));
        }
        Ok(())
    }
}
