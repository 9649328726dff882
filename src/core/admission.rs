//! Load-based admission control.
//!
//! The decision loop samples host load and classifies it against the soft
//! and hard thresholds:
//!
//! - below soft: admit immediately
//! - at or above hard, or retry budget spent: reject
//! - otherwise: report, back off for a random number of seconds, sample again
//!
//! Sampling failures admit (fail-open) and an empty sample ends polling.
//!
//! The loop itself is [`AdmissionRun`], a step machine that never blocks:
//! each [`AdmissionRun::step`] either finishes with a verdict or asks the
//! driver to pause. [`AdmissionController::admit`] drives it on the calling
//! thread; `runtime::tokio_admission` drives it on tokio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::GuardConfig;
use crate::core::report::{Reporter, Severity};
use crate::core::sampler::{LoadSample, LoadSampler};

/// Why a write was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitReason {
    /// Load was under the soft threshold.
    BelowSoftLimit {
        /// Sampled load, percent.
        load: u32,
    },
    /// Load could not be sampled.
    LoadUnknown,
    /// The load source returned nothing.
    NoSignal,
}

/// Why a write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    /// Load reached the hard threshold.
    HardLimit,
    /// Load stayed above the soft threshold for the whole retry budget.
    RetriesExhausted,
    /// The caller cancelled the wait.
    Cancelled,
}

/// Details of a refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Rejection category.
    pub kind: RejectKind,
    /// Last sampled load, percent.
    pub load: u32,
    /// Attempt number on which the loop gave up.
    pub attempts: u32,
    /// Human-readable reason, as reported.
    pub message: String,
}

/// Verdict of the admission loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// The write may proceed.
    Admitted(AdmitReason),
    /// The write must not proceed.
    Rejected(Rejection),
}

impl Admission {
    /// Whether the write may proceed.
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// Whether the write was refused.
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Rejection details, if refused.
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Admitted(_) => None,
        }
    }

    /// Process exit status: 0 admitted, 1 rejected.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Admitted(_) => 0,
            Self::Rejected(_) => 1,
        }
    }
}

/// Interruptible wait handle for the backoff sleep.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the token, waking any waiter.
    pub fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.condvar.notify_all();
    }

    /// Whether the token was triggered.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Block for up to `timeout`. Returns `true` if cancelled.
    ///
    /// A timeout past the representable clock range waits for cancellation
    /// alone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut cancelled),
            }
        }
        *cancelled
    }
}

/// Snapshot of admission counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStats {
    /// Verdicts that admitted.
    pub admitted: u64,
    /// Verdicts that rejected.
    pub rejected: u64,
    /// Backoff rounds taken (including dry-run rounds).
    pub backoffs: u64,
    /// Polls where the load source was unavailable.
    pub sample_failures: u64,
}

#[derive(Debug, Default)]
struct AdmissionCounters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    backoffs: AtomicU64,
    sample_failures: AtomicU64,
}

impl AdmissionCounters {
    fn record(&self, admission: &Admission) {
        let counter = match admission {
            Admission::Admitted(_) => &self.admitted,
            Admission::Rejected(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AdmissionStats {
        AdmissionStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            sample_failures: self.sample_failures.load(Ordering::Relaxed),
        }
    }
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The loop finished.
    Done(Admission),
    /// Wait `duration` (zero in dry-run mode), then step again.
    Pause {
        /// How long to wait.
        duration: Duration,
        /// Load that triggered the backoff.
        load: u32,
    },
}

/// Load-based admission controller.
pub struct AdmissionController {
    config: GuardConfig,
    sampler: LoadSampler,
    reporter: Reporter,
    rng: Mutex<StdRng>,
    counters: AdmissionCounters,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("config", &self.config)
            .field("sampler", &self.sampler)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl AdmissionController {
    /// Create a controller. The backoff generator is seeded once from OS entropy.
    pub fn new(config: GuardConfig, sampler: LoadSampler, reporter: Reporter) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!("admission configured with inconsistent limits: {}", e);
        }
        Self {
            config,
            sampler,
            reporter,
            rng: Mutex::new(StdRng::from_os_rng()),
            counters: AdmissionCounters::default(),
        }
    }

    /// Reseed the backoff generator deterministically.
    #[must_use]
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Active configuration.
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Load sampler in use.
    pub const fn sampler(&self) -> &LoadSampler {
        &self.sampler
    }

    /// Counter snapshot.
    pub fn stats(&self) -> AdmissionStats {
        self.counters.snapshot()
    }

    /// Start a new decision loop.
    pub const fn begin(&self, use_sideband: bool) -> AdmissionRun<'_> {
        AdmissionRun {
            controller: self,
            use_sideband,
            attempt: 1,
        }
    }

    /// Run the decision loop on the calling thread.
    pub fn admit(&self, use_sideband: bool) -> Admission {
        self.admit_with_cancel(use_sideband, &CancelToken::new())
    }

    /// Run the decision loop, aborting any backoff wait once `cancel` fires.
    pub fn admit_with_cancel(&self, use_sideband: bool, cancel: &CancelToken) -> Admission {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("admission", %run_id, use_sideband);
        let _entered = span.enter();

        let mut run = self.begin(use_sideband);
        loop {
            match run.step() {
                Step::Done(admission) => return admission,
                Step::Pause { duration, load } => {
                    if duration.is_zero() {
                        continue;
                    }
                    if cancel.wait_timeout(duration) {
                        return run.cancel(load);
                    }
                }
            }
        }
    }

    fn draw_backoff(&self) -> Duration {
        let (min, max) = self.config.sleep_bounds();
        let secs = self.rng.lock().random_range(min..=max);
        Duration::from_secs(secs)
    }
}

/// One execution of the decision loop.
#[derive(Debug)]
pub struct AdmissionRun<'a> {
    controller: &'a AdmissionController,
    use_sideband: bool,
    attempt: u32,
}

impl AdmissionRun<'_> {
    /// Current attempt number, starting at 1.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Sample once and decide. Call until it returns [`Step::Done`].
    pub fn step(&mut self) -> Step {
        let controller = self.controller;
        let config = &controller.config;

        let admission = match controller.sampler.sample() {
            LoadSample::NoData => Admission::Admitted(AdmitReason::NoSignal),
            LoadSample::Unavailable => {
                controller
                    .counters
                    .sample_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!("load unknown, admitting");
                Admission::Admitted(AdmitReason::LoadUnknown)
            }
            LoadSample::Percent(load) if load < config.soft_limit => {
                Admission::Admitted(AdmitReason::BelowSoftLimit { load })
            }
            LoadSample::Percent(load) => {
                let exhausted = self.attempt > config.max_retries;
                if !exhausted && load < config.hard_limit {
                    return self.back_off(load);
                }
                self.reject(
                    if exhausted {
                        RejectKind::RetriesExhausted
                    } else {
                        RejectKind::HardLimit
                    },
                    load,
                )
            }
        };

        if let Admission::Admitted(reason) = &admission {
            tracing::debug!(attempt = self.attempt, ?reason, "admitted");
        }
        controller.counters.record(&admission);
        Step::Done(admission)
    }

    /// Finish the loop because the caller cancelled a backoff wait.
    pub fn cancel(&mut self, load: u32) -> Admission {
        let admission = self.reject(RejectKind::Cancelled, load);
        self.controller.counters.record(&admission);
        admission
    }

    fn back_off(&mut self, load: u32) -> Step {
        let controller = self.controller;
        let config = &controller.config;
        let band = Reporter::band_for(self.use_sideband, Severity::Warn);

        let mut duration = controller.draw_backoff();
        let secs = duration.as_secs();
        controller.reporter.report(
            band,
            Severity::Warn,
            &format!(
                "Server load ({load}%) is high, waiting {secs} seconds [loop {}/{}]...",
                self.attempt, config.max_retries
            ),
        );
        if config.dry_run {
            controller
                .reporter
                .report(band, Severity::Warn, &format!("would sleep {secs} seconds"));
            duration = Duration::ZERO;
        }

        controller.counters.backoffs.fetch_add(1, Ordering::Relaxed);
        self.attempt += 1;
        Step::Pause { duration, load }
    }

    fn reject(&self, kind: RejectKind, load: u32) -> Admission {
        let config = &self.controller.config;
        let message = match kind {
            RejectKind::HardLimit => format!("Server load ({load}%) is too high, quit"),
            RejectKind::RetriesExhausted => format!(
                "Server load ({load}%) is still high after {} retries, quit",
                config.max_retries
            ),
            RejectKind::Cancelled => {
                format!("admission cancelled while waiting for server load ({load}%) to drop")
            }
        };
        let band = Reporter::band_for(self.use_sideband, Severity::Error);
        self.controller
            .reporter
            .report(band, Severity::Error, &message);

        Admission::Rejected(Rejection {
            kind,
            load,
            attempts: self.attempt,
            message,
        })
    }
}
