//! Report channel implementations.
//!
//! - [`PktLineSideband`] frames reports as git side-band pkt-lines.
//! - [`StderrChannel`] writes raw lines to the local error stream.
//! - [`MemoryChannel`] keeps a bounded log of reports for tests and diagnostics.

use std::collections::VecDeque;
use std::io::Write;

use parking_lot::Mutex;

use crate::core::report::{Band, ReportChannel};
use crate::core::GuardError;

/// Four hex length digits plus the band byte.
const SIDEBAND_HEADER_LEN: usize = 5;

/// Largest pkt-line length representable on the wire.
const PKT_LEN_MAX: usize = 0xfff0;

/// Side-band multiplexer writing pkt-line frames to `W`.
///
/// Each frame is `<4 hex digits total length><band byte><payload>`; payloads
/// that do not fit one frame are split across several.
#[derive(Debug)]
pub struct PktLineSideband<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> PktLineSideband<W> {
    /// Wrap a writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> ReportChannel for PktLineSideband<W> {
    fn send(&self, band: Band, payload: &[u8], max_frame: usize) -> Result<(), GuardError> {
        let Some(tag) = band.tag() else {
            return Err(GuardError::Report(
                "local band cannot be framed as side-band".into(),
            ));
        };
        let frame_len = max_frame.clamp(SIDEBAND_HEADER_LEN + 1, PKT_LEN_MAX);
        let chunk_len = frame_len - SIDEBAND_HEADER_LEN;

        let mut writer = self.writer.lock();
        for chunk in payload.chunks(chunk_len) {
            write_frame(&mut *writer, tag, chunk)
                .map_err(|e| GuardError::Report(e.to_string()))?;
        }
        writer.flush().map_err(|e| GuardError::Report(e.to_string()))
    }
}

fn write_frame<W: Write>(writer: &mut W, tag: u8, chunk: &[u8]) -> std::io::Result<()> {
    let header = format!("{:04x}", chunk.len() + SIDEBAND_HEADER_LEN);
    writer.write_all(header.as_bytes())?;
    writer.write_all(&[tag])?;
    writer.write_all(chunk)
}

/// Writes report lines straight to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrChannel;

impl ReportChannel for StderrChannel {
    fn send(&self, _band: Band, payload: &[u8], _max_frame: usize) -> Result<(), GuardError> {
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(payload)
            .map_err(|e| GuardError::Report(e.to_string()))
    }
}

/// One report captured by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    /// Band the report was sent on.
    pub band: Band,
    /// Formatted line, lossily decoded.
    pub line: String,
}

/// In-memory channel with a bounded buffer.
#[derive(Debug)]
pub struct MemoryChannel {
    records: Mutex<VecDeque<ReportRecord>>,
    max_records: usize,
}

impl MemoryChannel {
    /// Create a channel keeping at most `max_records` reports.
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_records.min(1024))),
            max_records,
        }
    }

    /// Snapshot of captured reports, oldest first.
    pub fn records(&self) -> Vec<ReportRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Snapshot of captured lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.line.clone()).collect()
    }
}

impl ReportChannel for MemoryChannel {
    fn send(&self, band: Band, payload: &[u8], _max_frame: usize) -> Result<(), GuardError> {
        let mut records = self.records.lock();
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(ReportRecord {
            band,
            line: String::from_utf8_lossy(payload).into_owned(),
        });
        Ok(())
    }
}
