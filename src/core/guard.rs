//! Entry points used by the write path.

use std::path::Path;

use crate::core::admission::{Admission, AdmissionController, CancelToken};
use crate::core::timestamp::{touch_last_modified, TouchOutcome};
use crate::core::write_lock::{LockVerdict, RefTransaction, WriteLockGate};

/// Admission controller and write-lock gate for one process.
///
/// Build it once (see [`crate::builders::GuardBuilder`]) and share it; the
/// lock verdict is memoized per guard.
#[derive(Debug)]
pub struct RepoGuard {
    admission: AdmissionController,
    write_lock: WriteLockGate,
}

impl RepoGuard {
    /// Assemble a guard from its parts.
    pub const fn new(admission: AdmissionController, write_lock: WriteLockGate) -> Self {
        Self {
            admission,
            write_lock,
        }
    }

    /// Run load admission. `use_sideband` sends reports over the remote channel.
    pub fn admit(&self, use_sideband: bool) -> Admission {
        self.admission.admit(use_sideband)
    }

    /// Run load admission, abandoning backoff waits once `cancel` fires.
    pub fn admit_with_cancel(&self, use_sideband: bool, cancel: &CancelToken) -> Admission {
        self.admission.admit_with_cancel(use_sideband, cancel)
    }

    /// `true` when the write must be refused because of host load.
    pub fn admission_refused(&self, use_sideband: bool) -> bool {
        self.admit(use_sideband).is_rejected()
    }

    /// Check ancestor directories for the write-lock sentinel.
    pub fn check_write_lock(&self, txn: &RefTransaction) -> LockVerdict {
        self.write_lock.check(txn)
    }

    /// Bump the last-modified timestamp after a committed write.
    pub fn touch_timestamp(&self, control_dir: &Path) -> TouchOutcome {
        touch_last_modified(control_dir)
    }

    /// The admission controller.
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// The write-lock gate.
    pub const fn write_lock(&self) -> &WriteLockGate {
        &self.write_lock
    }
}
