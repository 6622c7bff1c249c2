//! Memory configuration
//!
//! Controls how an outer transaction reacts to commit conflicts. The defaults
//! retry up to 10 000 times without sleeping between attempts. A backoff can
//! be configured for heavily contended memories.
//!
//! The configuration can be read from a TOML fragment or file:
//!
//! ```toml
//! max_retries = 100
//! base_delay_ms = 1
//! max_delay_ms = 50
//! ```

use entwined_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of retries after a conflicting commit
pub const DEFAULT_MAX_RETRIES: usize = 10_000;

/// Default cap on the backoff delay, in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 100;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Retry behavior of a `Memory`
///
/// A transaction makes at most `max_retries + 1` commit attempts before its
/// conflict becomes terminal.
///
/// # Example
/// ```ignore
/// let config = MemoryConfig::default()
///     .with_max_retries(5)
///     .with_base_delay_ms(1)
///     .with_max_delay_ms(20);
/// let memory = Memory::with_config(initial, config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of retries after a conflict (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff, 0 = none)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 0,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    ///
    /// The delay doubles per retry, up to `max_delay_ms`
    /// ([`DEFAULT_MAX_DELAY_MS`] unless set).
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (exponential backoff)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        // Cap the shift to prevent overflow
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Parse a configuration from TOML; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// `ContractViolation` if the text is not a valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::contract(format!("Failed to parse memory config: {}", e)))
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// `ContractViolation` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::contract(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this configuration to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::contract(format!("Failed to serialize memory config: {}", e)))
    }
}
