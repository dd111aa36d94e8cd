//! Host resource sampling: memory, load-based CPU, disk and database sizes
//!
//! Parsing of `/proc` text is kept in free functions so it can be tested
//! against fixed input; `HostSampler` only does the I/O.

use std::collections::BTreeMap;
use tracing::warn;

use crate::types::ResourceSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected format in {0}")]
    Format(&'static str),
    #[error("statvfs failed for {0}")]
    Statvfs(String),
}

/// Source of host usage figures, all in percent.
pub trait ResourceSampler: Send + Sync {
    fn memory_percent(&self) -> Result<f64, SampleError>;

    fn cpu_percent(&self) -> Result<f64, SampleError>;

    fn disk_percent(&self, path: &str) -> Result<f64, SampleError>;

    /// File size in MB; 0 when the file does not exist
    fn file_size_mb(&self, path: &str) -> f64;
}

/// Reads `/proc` and calls `statvfs` on the local host.
#[derive(Debug, Clone, Default)]
pub struct HostSampler;

const MEMINFO: &str = "/proc/meminfo";
const LOADAVG: &str = "/proc/loadavg";

impl ResourceSampler for HostSampler {
    fn memory_percent(&self) -> Result<f64, SampleError> {
        let text = std::fs::read_to_string(MEMINFO)
            .map_err(|source| SampleError::Read { path: MEMINFO, source })?;
        parse_meminfo(&text).ok_or(SampleError::Format(MEMINFO))
    }

    fn cpu_percent(&self) -> Result<f64, SampleError> {
        let text = std::fs::read_to_string(LOADAVG)
            .map_err(|source| SampleError::Read { path: LOADAVG, source })?;
        let load_1m = parse_loadavg(&text).ok_or(SampleError::Format(LOADAVG))?;
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Ok(load_to_percent(load_1m, cores))
    }

    fn disk_percent(&self, path: &str) -> Result<f64, SampleError> {
        disk_used_percent(path)
    }

    fn file_size_mb(&self, path: &str) -> f64 {
        std::fs::metadata(path)
            .map(|m| bytes_to_mb(m.len()))
            .unwrap_or(0.0)
    }
}

/// Used memory percent from `/proc/meminfo`: (MemTotal - MemAvailable) / MemTotal.
pub fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok())
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

/// 1-minute load average from `/proc/loadavg`.
pub fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Load per core as a percentage, capped at 100.
#[allow(clippy::cast_precision_loss)]
pub fn load_to_percent(load_1m: f64, cores: usize) -> f64 {
    (load_1m / cores.max(1) as f64 * 100.0).min(100.0)
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Used space of the filesystem holding `path`, as seen by unprivileged users.
#[allow(clippy::cast_precision_loss, clippy::useless_conversion)]
fn disk_used_percent(path: &str) -> Result<f64, SampleError> {
    use std::mem::MaybeUninit;

    let c_path =
        std::ffi::CString::new(path).map_err(|_| SampleError::Statvfs(path.to_string()))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return Err(SampleError::Statvfs(path.to_string()));
    }
    let stat = unsafe { stat.assume_init() };

    let blocks = u64::from(stat.f_blocks);
    let avail = u64::from(stat.f_bavail);
    if blocks == 0 {
        return Ok(0.0);
    }
    Ok(blocks.saturating_sub(avail) as f64 / blocks as f64 * 100.0)
}

/// RAM, CPU and database sizes. Unreadable figures are logged and read as 0.
pub fn sample_resources(sampler: &dyn ResourceSampler, databases: &[String]) -> ResourceSnapshot {
    let ram_percent = sampler.memory_percent().unwrap_or_else(|e| {
        warn!(error = %e, "Memory sample failed");
        0.0
    });
    let cpu_percent = sampler.cpu_percent().unwrap_or_else(|e| {
        warn!(error = %e, "CPU sample failed");
        0.0
    });
    let db_sizes_mb: BTreeMap<String, f64> = databases
        .iter()
        .map(|db| (db.clone(), sampler.file_size_mb(db)))
        .collect();

    ResourceSnapshot {
        ram_percent,
        cpu_percent,
        disk_percent: 0.0,
        db_sizes_mb,
    }
}

/// Disk usage of `path`, or `None` when it cannot be measured.
pub fn sample_disk(sampler: &dyn ResourceSampler, path: &str) -> Option<f64> {
    match sampler.disk_percent(path) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "Disk sample failed");
            None
        }
    }
}
