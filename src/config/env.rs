//! Environment-backed configuration provider.
//!
//! Values are resolved at most once per provider: the first `get` for a name
//! reads the backing lookup, parses it and caches the result. Later calls
//! return the cached value even if the environment has since changed.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Soft load threshold, percent of CPU capacity.
pub const ENV_LOADAVG_SOFT_LIMIT: &str = "AGIT_LOADAVG_SOFT_LIMIT";
/// Hard load threshold, percent of CPU capacity.
pub const ENV_LOADAVG_HARD_LIMIT: &str = "AGIT_LOADAVG_HARD_LIMIT";
/// Minimum backoff in seconds.
pub const ENV_LOADAVG_SLEEP_MIN: &str = "AGIT_LOADAVG_SLEEP_MIN";
/// Maximum backoff in seconds.
pub const ENV_LOADAVG_SLEEP_MAX: &str = "AGIT_LOADAVG_SLEEP_MAX";
/// Maximum number of backoff rounds.
pub const ENV_LOADAVG_RETRY: &str = "AGIT_LOADAVG_RETRY";
/// Report sleeps instead of performing them.
pub const ENV_TEST_LOADAVG_DRY_RUN: &str = "AGIT_TEST_LOADAVG_DRY_RUN";
/// Comma-separated list of load percentages replacing the host source.
pub const ENV_TEST_LOADAVG_MOCK: &str = "AGIT_TEST_LOADAVG_MOCK";
/// Skip the write-lock check entirely.
pub const ENV_REFS_TXN_NO_HOOK: &str = "GIT_REFS_TXN_NO_HOOK";

/// Default soft threshold.
pub const DEFAULT_LOADAVG_SOFT_LIMIT: i64 = 150;
/// Default hard threshold.
pub const DEFAULT_LOADAVG_HARD_LIMIT: i64 = 300;
/// Default minimum backoff.
pub const DEFAULT_LOADAVG_SLEEP_MIN: i64 = 10;
/// Default maximum backoff.
pub const DEFAULT_LOADAVG_SLEEP_MAX: i64 = 60;
/// Default retry budget.
pub const DEFAULT_LOADAVG_RETRY: i64 = 3;

type Lookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Memoizing reader for named configuration values.
pub struct ConfigProvider {
    lookup: Box<Lookup>,
    values: Mutex<HashMap<String, i64>>,
    raw: Mutex<HashMap<String, Option<String>>>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("values", &*self.values.lock())
            .finish_non_exhaustive()
    }
}

impl ConfigProvider {
    /// Provider reading the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Provider reading from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            values: Mutex::new(HashMap::new()),
            raw: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide provider backed by the real environment.
    pub fn process() -> &'static Self {
        static PROVIDER: OnceLock<ConfigProvider> = OnceLock::new();
        PROVIDER.get_or_init(Self::from_env)
    }

    /// Resolve `name` as an integer, falling back to `default` when unset.
    ///
    /// The cache lock is held across the lookup so concurrent first calls
    /// agree on a single resolved value.
    pub fn get(&self, name: &str, default: i64) -> i64 {
        let mut values = self.values.lock();
        if let Some(value) = values.get(name) {
            return *value;
        }
        let value = (self.lookup)(name).map_or(default, |raw| parse_env_value(&raw));
        tracing::debug!(name, value, "resolved configuration value");
        values.insert(name.to_owned(), value);
        value
    }

    /// Resolve `name` as a boolean (`get(name, 0) != 0`).
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name, 0) != 0
    }

    /// Resolve the unparsed text of `name`, memoized like [`Self::get`].
    pub fn get_raw(&self, name: &str) -> Option<String> {
        let mut raw = self.raw.lock();
        raw.entry(name.to_owned())
            .or_insert_with(|| (self.lookup)(name))
            .clone()
    }
}

/// Parse an environment value.
///
/// `yes`, `y`, `true`, `t` map to 1 and `no`, `n`, `false`, `f` to 0
/// (case-sensitive). Anything else is read as a leading decimal integer;
/// text without one yields 0.
pub fn parse_env_value(raw: &str) -> i64 {
    match raw {
        "yes" | "y" | "true" | "t" => 1,
        "no" | "n" | "false" | "f" => 0,
        _ => parse_leading_int(raw),
    }
}

/// Read an optional sign and the decimal digits that follow it, ignoring
/// leading whitespace and anything after the digits.
pub fn parse_leading_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude = digits[..end].bytes().fold(0_i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Parse a comma-separated list of load percentages.
///
/// Returns `None` for blank input. Items use the leading-integer rule and
/// negative values clamp to zero.
pub fn parse_mock_sequence(raw: &str) -> Option<Vec<u32>> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(
        raw.split(',')
            .map(|item| clamp_to_u32(parse_leading_int(item.trim())))
            .collect(),
    )
}

pub(crate) fn clamp_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

pub(crate) fn clamp_to_u64(value: i64) -> u64 {
    u64::try_from(value.max(0)).unwrap_or(0)
}
