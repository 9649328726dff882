//! Hierarchical write-lock check.
//!
//! An administrator disables writes to a repository, or to every repository
//! below a directory, by placing a [`LOCK_FILE_NAME`] file there. Its
//! contents are shown to the client as the reason.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::GuardConfig;

/// Sentinel file name checked in every ancestor directory.
pub const LOCK_FILE_NAME: &str = "agit-repo.lock";

/// Parent directories visited above the control directory at most.
pub const MAX_ASCENTS: usize = 20;

/// The ref updates a write is about to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTransaction {
    /// Repository control directory, if known.
    pub control_dir: Option<PathBuf>,
    /// Number of queued ref updates.
    pub updates: usize,
}

impl RefTransaction {
    /// Transaction with `updates` ref updates against `control_dir`.
    pub fn new(control_dir: impl Into<PathBuf>, updates: usize) -> Self {
        Self {
            control_dir: Some(control_dir.into()),
            updates,
        }
    }

    /// Whether the transaction updates nothing.
    pub const fn is_empty(&self) -> bool {
        self.updates == 0
    }
}

/// Outcome of the lock check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockVerdict {
    /// No sentinel found.
    Allowed,
    /// A sentinel was found.
    Denied {
        /// Sentinel that caused the denial.
        lock_path: PathBuf,
        /// Explanation followed by the sentinel contents. Bytes that are
        /// not valid UTF-8 are replaced with U+FFFD.
        reason: String,
    },
}

impl LockVerdict {
    /// Whether the write must not proceed.
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Denial reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Denied { reason, .. } => Some(reason),
            Self::Allowed => None,
        }
    }
}

/// Result of walking the directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScan {
    /// Verdict reached.
    pub verdict: LockVerdict,
    /// Directories examined, including the starting one.
    pub dirs_checked: usize,
}

/// Walk from `control_dir` towards the root looking for the sentinel.
///
/// Stops at the first sentinel, at the filesystem root, or after
/// [`MAX_ASCENTS`] ascents. Never fails: unreadable sentinels still deny,
/// with the preamble alone as reason.
pub fn scan_for_lock(control_dir: &Path) -> LockScan {
    let start = std::path::absolute(control_dir).unwrap_or_else(|e| {
        tracing::warn!(
            "cannot resolve {} to an absolute path: {}",
            control_dir.display(),
            e
        );
        control_dir.to_path_buf()
    });

    let mut dirs_checked = 0;
    for dir in start.ancestors().take(MAX_ASCENTS + 1) {
        dirs_checked += 1;
        let lock_path = dir.join(LOCK_FILE_NAME);
        if !lock_path.exists() {
            continue;
        }

        let mut reason =
            format!("cannot write to repository, locked by file '{LOCK_FILE_NAME}'.\n\n");
        match fs::read(&lock_path) {
            Ok(contents) => reason.push_str(&String::from_utf8_lossy(&contents)),
            Err(e) => tracing::warn!("cannot read {}: {}", lock_path.display(), e),
        }
        tracing::warn!(lock = %lock_path.display(), "repository write-locked");
        return LockScan {
            verdict: LockVerdict::Denied { lock_path, reason },
            dirs_checked,
        };
    }

    tracing::debug!(dirs_checked, start = %start.display(), "no write lock found");
    LockScan {
        verdict: LockVerdict::Allowed,
        dirs_checked,
    }
}

/// Write-lock gate with a once-per-gate verdict.
///
/// The first transaction that reaches the filesystem fixes the verdict;
/// every later check on the same gate returns it unchanged.
#[derive(Debug, Default)]
pub struct WriteLockGate {
    disabled: bool,
    verdict: OnceLock<LockVerdict>,
}

impl WriteLockGate {
    /// Gate honoring the bypass switch in `config`.
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            disabled: config.lock_check_disabled,
            verdict: OnceLock::new(),
        }
    }

    /// Decide whether `txn` may proceed.
    pub fn check(&self, txn: &RefTransaction) -> LockVerdict {
        if self.disabled {
            tracing::debug!("write-lock check disabled");
            return LockVerdict::Allowed;
        }
        if txn.is_empty() {
            return LockVerdict::Allowed;
        }
        let Some(control_dir) = txn.control_dir.as_deref() else {
            return LockVerdict::Allowed;
        };
        self.verdict
            .get_or_init(|| scan_for_lock(control_dir).verdict)
            .clone()
    }

    /// The memoized verdict, once one exists.
    pub fn cached(&self) -> Option<&LockVerdict> {
        self.verdict.get()
    }
}
