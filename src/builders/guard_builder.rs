//! Builder assembling a [`RepoGuard`] from configuration.

use std::sync::Arc;

use crate::config::GuardConfig;
use crate::core::admission::AdmissionController;
use crate::core::guard::RepoGuard;
use crate::core::report::{ReportChannel, Reporter};
use crate::core::sampler::{LoadSampler, LoadSource};
use crate::core::write_lock::WriteLockGate;
use crate::infra::loadavg::default_source;
use crate::infra::sideband::StderrChannel;

/// Collects configuration and collaborators, then builds the guards.
pub struct GuardBuilder {
    config: GuardConfig,
    source: Option<Box<dyn LoadSource>>,
    remote: Option<Arc<dyn ReportChannel>>,
    local: Option<Arc<dyn ReportChannel>>,
    rng_seed: Option<u64>,
}

impl std::fmt::Debug for GuardBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardBuilder")
            .field("config", &self.config)
            .field("custom_source", &self.source.is_some())
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl GuardBuilder {
    /// Builder for `config`, using the platform load source and stderr.
    pub const fn new(config: GuardConfig) -> Self {
        Self {
            config,
            source: None,
            remote: None,
            local: None,
            rng_seed: None,
        }
    }

    /// Builder configured from the process environment.
    pub fn from_env() -> Self {
        Self::new(GuardConfig::from_env())
    }

    /// Configuration the guards will use.
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Replace the platform load source.
    #[must_use]
    pub fn with_load_source(mut self, source: Box<dyn LoadSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the remote report channel.
    #[must_use]
    pub fn with_remote_channel(mut self, channel: Arc<dyn ReportChannel>) -> Self {
        self.remote = Some(channel);
        self
    }

    /// Replace the local report channel.
    #[must_use]
    pub fn with_local_channel(mut self, channel: Arc<dyn ReportChannel>) -> Self {
        self.local = Some(channel);
        self
    }

    /// Seed the backoff generator deterministically.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build only the admission controller.
    pub fn build_admission(self) -> AdmissionController {
        let source = self.source.unwrap_or_else(default_source);
        let sampler = LoadSampler::from_config(&self.config, source);
        let local = self.local.unwrap_or_else(|| Arc::new(StderrChannel));
        let reporter = Reporter::new(self.remote, local);
        let controller = AdmissionController::new(self.config, sampler, reporter);
        match self.rng_seed {
            Some(seed) => controller.with_rng_seed(seed),
            None => controller,
        }
    }

    /// Build the full guard.
    pub fn build(self) -> RepoGuard {
        let write_lock = WriteLockGate::new(&self.config);
        RepoGuard::new(self.build_admission(), write_lock)
    }
}
