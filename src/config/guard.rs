//! Guard configuration structure.

use serde::{Deserialize, Serialize};

use crate::core::GuardError;

use super::env::{
    clamp_to_u32, clamp_to_u64, parse_mock_sequence, ConfigProvider, DEFAULT_LOADAVG_HARD_LIMIT,
    DEFAULT_LOADAVG_RETRY, DEFAULT_LOADAVG_SLEEP_MAX, DEFAULT_LOADAVG_SLEEP_MIN,
    DEFAULT_LOADAVG_SOFT_LIMIT, ENV_LOADAVG_HARD_LIMIT, ENV_LOADAVG_RETRY,
    ENV_LOADAVG_SLEEP_MAX, ENV_LOADAVG_SLEEP_MIN, ENV_LOADAVG_SOFT_LIMIT, ENV_REFS_TXN_NO_HOOK,
    ENV_TEST_LOADAVG_DRY_RUN, ENV_TEST_LOADAVG_MOCK,
};

/// Thresholds, backoff bounds and test switches shared by every guard.
///
/// Built once (usually with [`GuardConfig::from_env`]) and handed to
/// components by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Load percentage at which admission starts backing off.
    pub soft_limit: u32,
    /// Load percentage at which admission is refused outright.
    pub hard_limit: u32,
    /// Lower bound of the randomized backoff, seconds.
    pub sleep_min_secs: u64,
    /// Upper bound of the randomized backoff, seconds.
    pub sleep_max_secs: u64,
    /// Backoff rounds allowed before giving up.
    pub max_retries: u32,
    /// Report backoff sleeps without performing them.
    pub dry_run: bool,
    /// Preset load percentages replacing the host load source.
    pub mock_loads: Option<Vec<u32>>,
    /// Skip the write-lock check.
    pub lock_check_disabled: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            soft_limit: clamp_to_u32(DEFAULT_LOADAVG_SOFT_LIMIT),
            hard_limit: clamp_to_u32(DEFAULT_LOADAVG_HARD_LIMIT),
            sleep_min_secs: clamp_to_u64(DEFAULT_LOADAVG_SLEEP_MIN),
            sleep_max_secs: clamp_to_u64(DEFAULT_LOADAVG_SLEEP_MAX),
            max_retries: clamp_to_u32(DEFAULT_LOADAVG_RETRY),
            dry_run: false,
            mock_loads: None,
            lock_check_disabled: false,
        }
    }
}

impl GuardConfig {
    /// Create a configuration with built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every value from the process-wide environment provider.
    pub fn from_env() -> Self {
        Self::from_provider(ConfigProvider::process())
    }

    /// Resolve every value from `provider`.
    pub fn from_provider(provider: &ConfigProvider) -> Self {
        Self {
            soft_limit: clamp_to_u32(
                provider.get(ENV_LOADAVG_SOFT_LIMIT, DEFAULT_LOADAVG_SOFT_LIMIT),
            ),
            hard_limit: clamp_to_u32(
                provider.get(ENV_LOADAVG_HARD_LIMIT, DEFAULT_LOADAVG_HARD_LIMIT),
            ),
            sleep_min_secs: clamp_to_u64(
                provider.get(ENV_LOADAVG_SLEEP_MIN, DEFAULT_LOADAVG_SLEEP_MIN),
            ),
            sleep_max_secs: clamp_to_u64(
                provider.get(ENV_LOADAVG_SLEEP_MAX, DEFAULT_LOADAVG_SLEEP_MAX),
            ),
            max_retries: clamp_to_u32(provider.get(ENV_LOADAVG_RETRY, DEFAULT_LOADAVG_RETRY)),
            dry_run: provider.get_bool(ENV_TEST_LOADAVG_DRY_RUN),
            mock_loads: provider
                .get_raw(ENV_TEST_LOADAVG_MOCK)
                .as_deref()
                .and_then(parse_mock_sequence),
            lock_check_disabled: provider.get_bool(ENV_REFS_TXN_NO_HOOK),
        }
    }

    /// Set the soft threshold.
    #[must_use]
    pub const fn with_soft_limit(mut self, percent: u32) -> Self {
        self.soft_limit = percent;
        self
    }

    /// Set the hard threshold.
    #[must_use]
    pub const fn with_hard_limit(mut self, percent: u32) -> Self {
        self.hard_limit = percent;
        self
    }

    /// Set the backoff bounds in seconds.
    #[must_use]
    pub const fn with_sleep_range(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.sleep_min_secs = min_secs;
        self.sleep_max_secs = max_secs;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable or disable dry-run sleeping.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replace the host load source with a preset sequence.
    #[must_use]
    pub fn with_mock_loads(mut self, loads: impl Into<Vec<u32>>) -> Self {
        let loads = loads.into();
        self.mock_loads = if loads.is_empty() { None } else { Some(loads) };
        self
    }

    /// Enable or disable the write-lock bypass.
    #[must_use]
    pub const fn with_lock_check_disabled(mut self, disabled: bool) -> Self {
        self.lock_check_disabled = disabled;
        self
    }

    /// Backoff bounds with an inverted range collapsed onto `sleep_min_secs`.
    pub const fn sleep_bounds(&self) -> (u64, u64) {
        if self.sleep_max_secs < self.sleep_min_secs {
            (self.sleep_min_secs, self.sleep_min_secs)
        } else {
            (self.sleep_min_secs, self.sleep_max_secs)
        }
    }

    /// Check that the thresholds and backoff bounds are ordered.
    ///
    /// The admission loop tolerates both inversions; this exists so callers
    /// can surface a misconfiguration.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.soft_limit > self.hard_limit {
            return Err(GuardError::InvalidConfig(format!(
                "soft limit {}% exceeds hard limit {}%",
                self.soft_limit, self.hard_limit
            )));
        }
        if self.sleep_min_secs > self.sleep_max_secs {
            return Err(GuardError::InvalidConfig(format!(
                "minimum sleep {}s exceeds maximum sleep {}s",
                self.sleep_min_secs, self.sleep_max_secs
            )));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, GuardError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| GuardError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
