//! Process memory readings via `/proc/self/status`.
//!
//! Two figures matter for overload decisions:
//!
//! | Field | Source line | Meaning |
//! |-------|-------------|---------|
//! | `rss_bytes` | `VmRSS` | Resident set size of the whole process |
//! | `heap_used_bytes` | `RssAnon` (fallback `VmData`) | Resident anonymous memory, i.e. what the allocator holds |
//!
//! Readings are never cached: every evaluation asks again.

use crate::error::{MonitorError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default path to the per-process status file.
const SELF_STATUS_PATH: &str = "/proc/self/status";

/// A point-in-time memory reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Bytes held by the allocator.
    pub heap_used_bytes: u64,
    /// Resident set size in bytes.
    pub rss_bytes: u64,
}

impl MemoryUsage {
    /// Creates a reading from raw byte counts.
    #[must_use]
    pub const fn new(heap_used_bytes: u64, rss_bytes: u64) -> Self {
        Self {
            heap_used_bytes,
            rss_bytes,
        }
    }
}

/// Source of memory readings.
///
/// Implementations must be cheap and synchronous: the gate calls
/// [`read`](Self::read) on every request.
pub trait MemoryReader: Send + Sync {
    /// Returns the current memory usage.
    fn read(&self) -> MemoryUsage;

    /// Reads, surfacing failures instead of reporting zero usage.
    ///
    /// Used once at guard construction to confirm the source works. The
    /// default never fails.
    ///
    /// # Errors
    ///
    /// Implementation-specific read or parse failures.
    fn try_read(&self) -> Result<MemoryUsage> {
        Ok(self.read())
    }
}

/// Reads the current process's memory from procfs.
#[derive(Debug, Clone)]
pub struct ProcessMemoryReader {
    path: PathBuf,
}

impl ProcessMemoryReader {
    /// Creates a reader for `/proc/self/status`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(SELF_STATUS_PATH)
    }

    /// Creates a reader for a status file at a specific path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcessMemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReader for ProcessMemoryReader {
    /// Fails open: an unreadable status file reports zero usage.
    fn read(&self) -> MemoryUsage {
        self.try_read().unwrap_or_else(|e| {
            debug!(error = %e, "memory reading unavailable, reporting zero usage");
            MemoryUsage::default()
        })
    }

    /// Returns [`MonitorError::ReadError`] if the file cannot be read and
    /// [`MonitorError::ParseError`] if `VmRSS` is missing or malformed.
    fn try_read(&self) -> Result<MemoryUsage> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| MonitorError::ReadError {
                path: self.path.display().to_string(),
                source,
            })?;
        parse_status(&content, &self.path)
    }
}

/// Parses the content of a `/proc/<pid>/status`-formatted string.
fn parse_status(content: &str, source_path: &Path) -> Result<MemoryUsage> {
    let mut rss_kb: Option<u64> = None;
    let mut anon_kb: Option<u64> = None;
    let mut data_kb: Option<u64> = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let slot = match fields.next() {
            Some("VmRSS:") => &mut rss_kb,
            Some("RssAnon:") => &mut anon_kb,
            Some("VmData:") => &mut data_kb,
            _ => continue,
        };
        let value = fields.next().ok_or_else(|| MonitorError::ParseError {
            path: source_path.display().to_string(),
            detail: format!("missing value on line '{line}'"),
        })?;
        *slot = Some(parse_kb_value(value, source_path)?);
    }

    let rss_kb = rss_kb.ok_or_else(|| MonitorError::ParseError {
        path: source_path.display().to_string(),
        detail: "VmRSS not found".to_string(),
    })?;
    let heap_kb = anon_kb.or(data_kb).unwrap_or(0);

    Ok(MemoryUsage {
        heap_used_bytes: heap_kb.saturating_mul(1024),
        rss_bytes: rss_kb.saturating_mul(1024),
    })
}

/// Parses a numeric kB value.
fn parse_kb_value(s: &str, source_path: &Path) -> Result<u64> {
    s.parse::<u64>().map_err(|_| MonitorError::ParseError {
        path: source_path.display().to_string(),
        detail: format!("expected integer kB value, got '{s}'"),
    })
}
