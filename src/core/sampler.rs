//! Host load sampling.
//!
//! Load is expressed as the one-minute load average relative to the number
//! of logical CPUs, in percent: `round(100 * loadavg / cpus)`. A host with
//! four CPUs and a load average of 6.0 samples as 150.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::GuardConfig;
use crate::core::GuardError;

/// Outcome of one load poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadSample {
    /// Load as a percentage of CPU capacity.
    Percent(u32),
    /// The load source could not be read. Admission treats this as low load.
    Unavailable,
    /// The source answered with nothing usable. Admission stops polling.
    NoData,
}

/// Host capability reporting the trailing one-minute load average.
pub trait LoadSource: Send + Sync {
    /// Read the one-minute load average.
    ///
    /// `Ok(None)` means the source was reachable but returned no numeric
    /// content; `Err` means it could not be reached at all.
    fn load_average(&self) -> Result<Option<f64>, GuardError>;

    /// Number of logical CPUs the load is measured against.
    fn cpu_count(&self) -> usize {
        num_cpus::get()
    }
}

/// Extract the first load-average figure from raw source text.
///
/// Accepts both `/proc/loadavg` (`0.52 0.58 0.59 1/467 12345`) and
/// `sysctl -n vm.loadavg` (`{ 1.92 2.17 2.19 }`) output.
pub fn parse_loadavg(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start_matches(['{', ' ']);
    let token = trimmed.split([' ', '\t', '\n']).next()?;
    token
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

/// Convert a load average into a percentage of `cpus`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn load_percent(load: f64, cpus: usize) -> u32 {
    let cpus = cpus.max(1) as f64;
    let percent = (100.0 * load / cpus).round();
    if !percent.is_finite() || percent <= 0.0 {
        0
    } else if percent >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        percent as u32
    }
}

/// Preset load percentages consumed one per poll.
///
/// Once the cursor passes the end, the last value repeats forever.
#[derive(Debug)]
pub struct MockLoadSequence {
    loads: Vec<u32>,
    cursor: AtomicUsize,
}

impl MockLoadSequence {
    /// Create a sequence. Returns `None` for an empty list.
    pub fn new(loads: Vec<u32>) -> Option<Self> {
        if loads.is_empty() {
            return None;
        }
        Some(Self {
            loads,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Return the value under the cursor and advance it.
    pub fn next_load(&self) -> u32 {
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                Some(i.saturating_add(1))
            })
            .unwrap_or_else(|i| i);
        let last = self.loads.len() - 1;
        self.loads[index.min(last)]
    }

    /// Number of polls served so far.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}

/// Sampler combining a host source with the optional mock sequence.
pub struct LoadSampler {
    source: Box<dyn LoadSource>,
    mock: Option<MockLoadSequence>,
}

impl std::fmt::Debug for LoadSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSampler")
            .field("mock", &self.mock)
            .finish_non_exhaustive()
    }
}

impl LoadSampler {
    /// Sampler reading from `source`.
    pub fn new(source: Box<dyn LoadSource>) -> Self {
        Self { source, mock: None }
    }

    /// Sampler reading from `source`, unless `config` carries mock loads.
    pub fn from_config(config: &GuardConfig, source: Box<dyn LoadSource>) -> Self {
        let mock = config.mock_loads.clone().and_then(MockLoadSequence::new);
        if mock.is_some() {
            tracing::debug!(loads = ?config.mock_loads, "using mock load sequence");
        }
        Self { source, mock }
    }

    /// The mock sequence, when one is active.
    pub const fn mock(&self) -> Option<&MockLoadSequence> {
        self.mock.as_ref()
    }

    /// Poll the current load.
    pub fn sample(&self) -> LoadSample {
        if let Some(mock) = &self.mock {
            let load = mock.next_load();
            tracing::debug!(load, position = mock.position(), "mock load sample");
            return LoadSample::Percent(load);
        }

        match self.source.load_average() {
            Ok(Some(load)) => {
                let cpus = self.source.cpu_count();
                let percent = load_percent(load, cpus);
                tracing::debug!(load, cpus, percent, "load sample");
                LoadSample::Percent(percent)
            }
            Ok(None) => {
                tracing::debug!("load source returned no data");
                LoadSample::NoData
            }
            Err(e) => {
                tracing::warn!("load sampling failed: {}", e);
                LoadSample::Unavailable
            }
        }
    }
}
