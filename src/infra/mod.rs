//! Infrastructure adapters for host load sources and report channels.

pub mod loadavg;
pub mod sideband;

pub use loadavg::{default_source, FixedLoad, ProcLoadAvg};
pub use sideband::{MemoryChannel, PktLineSideband, ReportRecord, StderrChannel};
