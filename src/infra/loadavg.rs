//! Platform load-average sources.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::core::sampler::{parse_loadavg, LoadSource};
use crate::core::GuardError;

/// Bytes read from the source; enough for the one-minute figure.
const LOADAVG_READ_LEN: usize = 20;

/// [`LOADAVG_READ_LEN`] as a reader limit.
const LOADAVG_READ_LIMIT: u64 = 20;

/// Parse the one-minute figure from at most [`LOADAVG_READ_LEN`] bytes.
fn parse_head(raw: &[u8]) -> Option<f64> {
    let head = raw.get(..LOADAVG_READ_LEN).unwrap_or(raw);
    parse_loadavg(&String::from_utf8_lossy(head))
}

/// Linux `/proc/loadavg` reader.
#[derive(Debug, Clone)]
pub struct ProcLoadAvg {
    path: PathBuf,
}

impl Default for ProcLoadAvg {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcLoadAvg {
    /// Reader for `/proc/loadavg`.
    pub fn new() -> Self {
        Self::with_path("/proc/loadavg")
    }

    /// Reader for a file in `/proc/loadavg` format at `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

}

impl LoadSource for ProcLoadAvg {
    fn load_average(&self) -> Result<Option<f64>, GuardError> {
        let file = File::open(&self.path).map_err(|e| GuardError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity(LOADAVG_READ_LEN);
        file.take(LOADAVG_READ_LIMIT)
            .read_to_end(&mut buf)
            .map_err(|e| GuardError::io(&self.path, e))?;
        Ok(parse_head(&buf))
    }
}

/// macOS `sysctl -n vm.loadavg` reader.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SysctlLoadAvg;

#[cfg(target_os = "macos")]
impl LoadSource for SysctlLoadAvg {
    fn load_average(&self) -> Result<Option<f64>, GuardError> {
        let output = std::process::Command::new("sysctl")
            .args(["-n", "vm.loadavg"])
            .output()
            .map_err(|e| GuardError::LoadSource(format!("unable to spawn sysctl: {e}")))?;
        if !output.status.success() {
            return Err(GuardError::LoadSource(format!(
                "sysctl exited with {}",
                output.status
            )));
        }
        Ok(parse_head(&output.stdout))
    }
}

/// Source returning a constant load, for tests and benchmarks.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad {
    load: Option<f64>,
    cpus: usize,
}

impl FixedLoad {
    /// Always report `load` against `cpus` CPUs.
    pub const fn new(load: f64, cpus: usize) -> Self {
        Self {
            load: Some(load),
            cpus,
        }
    }

    /// Always report an empty read.
    pub const fn empty() -> Self {
        Self { load: None, cpus: 1 }
    }
}

impl LoadSource for FixedLoad {
    fn load_average(&self) -> Result<Option<f64>, GuardError> {
        Ok(self.load)
    }

    fn cpu_count(&self) -> usize {
        self.cpus
    }
}

/// The load source for the current platform.
pub fn default_source() -> Box<dyn LoadSource> {
    #[cfg(target_os = "macos")]
    {
        Box::new(SysctlLoadAvg)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(ProcLoadAvg::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_proc_reader_parses_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "3.25 2.10 1.05 4/512 9876").expect("write");
        let source = ProcLoadAvg::with_path(file.path());
        assert_eq!(source.load_average().expect("readable"), Some(3.25));
    }

    #[test]
    fn test_parse_head_reads_only_the_prefix() {
        assert_eq!(parse_head(b"0.52 0.58 0.59 1/467 12345\n"), Some(0.52));
        assert_eq!(parse_head(b"{ 1.92 2.17 2.19 }\n"), Some(1.92));

        let mut padded = vec![b' '; LOADAVG_READ_LEN];
        padded.extend_from_slice(b"1.0");
        assert_eq!(parse_head(&padded), None);
    }

    #[test]
    fn test_proc_reader_empty_file_is_no_data() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let source = ProcLoadAvg::with_path(file.path());
        assert_eq!(source.load_average().expect("readable"), None);
    }

    #[test]
    fn test_proc_reader_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = ProcLoadAvg::with_path(dir.path().join("missing"));
        assert!(matches!(
            source.load_average(),
            Err(GuardError::Io { .. })
        ));
    }

    #[test]
    fn test_fixed_load() {
        let source = FixedLoad::new(1.5, 3);
        assert_eq!(source.load_average().expect("fixed"), Some(1.5));
        assert_eq!(source.cpu_count(), 3);
        assert_eq!(FixedLoad::empty().load_average().expect("fixed"), None);
    }
}
