//! Report formatting and band routing.
//!
//! A report is a single `WARN: ` or `ERROR: ` prefixed line, at most
//! [`MAX_REPORT_LEN`] bytes including the trailing newline. Reports go to
//! the remote channel on the progress or error band when one is engaged,
//! and to the local channel (stderr by default) otherwise.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::GuardError;
use crate::infra::sideband::StderrChannel;

/// Upper bound for one formatted report line, newline included.
pub const MAX_REPORT_LEN: usize = 4096;

/// Largest frame the remote channel may emit (git `LARGE_PACKET_MAX`).
pub const MAX_FRAME_SIZE: usize = 65520;

/// Logical channel a report travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// Remote progress band.
    Progress,
    /// Remote error band.
    Error,
    /// Local error stream; no remote channel involved.
    Local,
}

impl Band {
    /// Side-band number used on the wire, if the band is remote.
    pub const fn tag(self) -> Option<u8> {
        match self {
            Self::Progress => Some(2),
            Self::Error => Some(3),
            Self::Local => None,
        }
    }
}

/// Message severity, selecting the line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// `WARN: `
    Warn,
    /// `ERROR: `
    Error,
}

impl Severity {
    /// Line prefix for this severity.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Warn => "WARN: ",
            Self::Error => "ERROR: ",
        }
    }
}

/// Destination for formatted report lines.
pub trait ReportChannel: Send + Sync {
    /// Deliver `payload` on `band`, never emitting frames above `max_frame`.
    fn send(&self, band: Band, payload: &[u8], max_frame: usize) -> Result<(), GuardError>;
}

/// Build the bytes of one report line.
///
/// Trailing newlines in `text` are dropped, the body is cut on a character
/// boundary if the line would exceed [`MAX_REPORT_LEN`], and exactly one
/// newline is appended.
pub fn compose_line(severity: Severity, text: &str) -> Vec<u8> {
    let prefix = severity.prefix();
    let body = text.trim_end_matches('\n');
    let room = MAX_REPORT_LEN - prefix.len() - 1;

    let mut end = body.len().min(room);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let body = body[..end].trim_end_matches('\n');

    let mut line = Vec::with_capacity(prefix.len() + body.len() + 1);
    line.extend_from_slice(prefix.as_bytes());
    line.extend_from_slice(body.as_bytes());
    line.push(b'\n');
    line
}

/// Routes report lines to the remote or local channel.
#[derive(Clone)]
pub struct Reporter {
    remote: Option<Arc<dyn ReportChannel>>,
    local: Arc<dyn ReportChannel>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(None, Arc::new(StderrChannel))
    }
}

impl Reporter {
    /// Create a reporter from its two channels.
    pub fn new(remote: Option<Arc<dyn ReportChannel>>, local: Arc<dyn ReportChannel>) -> Self {
        Self { remote, local }
    }

    /// Replace the local channel.
    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn ReportChannel>) -> Self {
        self.local = local;
        self
    }

    /// Band for a message, given whether the caller engaged the remote channel.
    pub const fn band_for(use_remote: bool, severity: Severity) -> Band {
        match (use_remote, severity) {
            (false, _) => Band::Local,
            (true, Severity::Warn) => Band::Progress,
            (true, Severity::Error) => Band::Error,
        }
    }

    /// Format and deliver one report. Delivery failures are logged only.
    ///
    /// The line is mirrored to tracing at debug level.
    pub fn report(&self, band: Band, severity: Severity, text: &str) {
        tracing::debug!(?band, ?severity, "{}", text.trim_end());

        let line = compose_line(severity, text);
        let (channel, band) = match (&self.remote, band) {
            (Some(remote), Band::Progress | Band::Error) => (remote, band),
            _ => (&self.local, Band::Local),
        };
        if let Err(e) = channel.send(band, &line, MAX_FRAME_SIZE) {
            tracing::error!("failed to deliver report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::sideband::MemoryChannel;

    #[test]
    fn test_compose_prefixes() {
        assert_eq!(compose_line(Severity::Warn, "busy"), b"WARN: busy\n".to_vec());
        assert_eq!(compose_line(Severity::Error, "quit"), b"ERROR: quit\n".to_vec());
    }

    #[test]
    fn test_compose_collapses_trailing_newlines() {
        assert_eq!(
            compose_line(Severity::Warn, "waiting...\n\n"),
            b"WARN: waiting...\n".to_vec()
        );
    }

    #[test]
    fn test_compose_truncates_to_limit() {
        let long = "x".repeat(10_000);
        let line = compose_line(Severity::Error, &long);
        assert_eq!(line.len(), MAX_REPORT_LEN);
        assert!(line.starts_with(b"ERROR: "));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn test_compose_truncates_on_char_boundary() {
        let long = "\u{00e9}".repeat(5_000);
        let line = compose_line(Severity::Warn, &long);
        assert!(line.len() <= MAX_REPORT_LEN);
        assert!(std::str::from_utf8(&line).is_ok());
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn test_band_selection() {
        assert_eq!(Reporter::band_for(true, Severity::Warn), Band::Progress);
        assert_eq!(Reporter::band_for(true, Severity::Error), Band::Error);
        assert_eq!(Reporter::band_for(false, Severity::Error), Band::Local);
        assert_eq!(Band::Progress.tag(), Some(2));
        assert_eq!(Band::Error.tag(), Some(3));
        assert_eq!(Band::Local.tag(), None);
    }

    #[test]
    fn test_report_routes_remote_and_local() {
        let remote = Arc::new(MemoryChannel::new(8));
        let local = Arc::new(MemoryChannel::new(8));
        let reporter = Reporter::new(Some(remote.clone()), local.clone());

        reporter.report(Band::Progress, Severity::Warn, "waiting");
        reporter.report(Band::Local, Severity::Error, "refused");

        let remote_records = remote.records();
        assert_eq!(remote_records.len(), 1);
        assert_eq!(remote_records[0].band, Band::Progress);
        assert_eq!(remote_records[0].line, "WARN: waiting\n");

        let local_records = local.records();
        assert_eq!(local_records.len(), 1);
        assert_eq!(local_records[0].band, Band::Local);
        assert_eq!(local_records[0].line, "ERROR: refused\n");
    }

    #[test]
    fn test_report_without_remote_falls_back_to_local() {
        let local = Arc::new(MemoryChannel::new(8));
        let reporter = Reporter::default().with_local(local.clone());
        reporter.report(Band::Error, Severity::Error, "too high");
        assert_eq!(local.lines(), vec!["ERROR: too high\n".to_string()]);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_local_report_is_not_duplicated_in_default_log() {
        let local = Arc::new(MemoryChannel::new(8));
        let reporter = Reporter::default().with_local(local.clone());
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            reporter.report(Band::Local, Severity::Error, "too high");
        });

        assert_eq!(local.lines(), vec!["ERROR: too high\n".to_string()]);
        assert!(log.0.lock().is_empty());
    }
}
