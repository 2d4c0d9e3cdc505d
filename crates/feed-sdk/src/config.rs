use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use feed_ledger::DEFAULT_WRITE_RETRY_LIMIT;
use feed_sync::DEFAULT_POLL_INTERVAL;
use feed_types::{ProgramId, DEFAULT_DISPLAY_NAME, DEFAULT_SOURCE_URL};

use crate::error::{SdkError, SdkResult};

/// Program identity used when none is configured: the local simulation program.
pub const LOCAL_PROGRAM_ID: ProgramId = ProgramId::from_bytes(*b"feed-local-simulation-program-01");

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hex-encoded in TOML.
    pub program_id: ProgramId,
    pub poll_interval_ms: u64,
    /// Re-derivations allowed when another writer takes the counted index.
    pub write_retry_limit: u32,
    /// Resubmit a post automatically after the state record was bootstrapped.
    pub resubmit_after_bootstrap: bool,
    pub display_name: String,
    pub profile_url: String,
    pub transient_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program_id: LOCAL_PROGRAM_ID,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            write_retry_limit: DEFAULT_WRITE_RETRY_LIMIT,
            resubmit_after_bootstrap: true,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            profile_url: DEFAULT_SOURCE_URL.to_string(),
            transient_retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> SdkResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SdkError::Config("poll_interval_ms must be positive".into()));
        }
        if self.write_retry_limit == 0 {
            return Err(SdkError::Config("write_retry_limit must be at least 1".into()));
        }
        if self.transient_retry.max_attempts == 0 {
            return Err(SdkError::Config(
                "transient_retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff for ledger reads that failed transiently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}
