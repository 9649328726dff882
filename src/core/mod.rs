//! Guard algorithms: admission control, write-lock check, timestamp touch.

pub mod admission;
pub mod error;
pub mod guard;
pub mod report;
pub mod sampler;
pub mod timestamp;
pub mod write_lock;

pub use admission::{
    Admission, AdmissionController, AdmissionRun, AdmissionStats, AdmitReason, CancelToken,
    RejectKind, Rejection, Step,
};
pub use error::{AppResult, GuardError};
pub use guard::RepoGuard;
pub use report::{
    compose_line, Band, ReportChannel, Reporter, Severity, MAX_FRAME_SIZE, MAX_REPORT_LEN,
};
pub use sampler::{
    load_percent, parse_loadavg, LoadSample, LoadSampler, LoadSource, MockLoadSequence,
};
pub use timestamp::{last_modified_path, touch_last_modified, TouchOutcome};
pub use write_lock::{
    scan_for_lock, LockScan, LockVerdict, RefTransaction, WriteLockGate, LOCK_FILE_NAME,
    MAX_ASCENTS,
};
