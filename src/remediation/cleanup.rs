//! Disk-critical cleanup
//!
//! Three rules, applied in order:
//! 1. Sweep paths: every direct child is removed (directories recursively).
//! 2. Cache directories: any directory named like `__pycache__` under the
//!    cache roots is removed whole.
//! 3. Aged paths: only regular files older than `max_age_days` are removed.
//!
//! Symlinks are removed as links and never followed. Per-item errors are
//! swallowed. A dry run walks the same tree and reports the same totals
//! without touching anything.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::config::CleanupConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupRule {
    Sweep,
    CacheDirs,
    Aged,
}

/// Totals for one configured path.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PathCleanup {
    pub path: PathBuf,
    pub rule: CleanupRule,
    pub items: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub items_deleted: u64,
    pub bytes_freed: u64,
    pub details: Vec<PathCleanup>,
    pub dry_run: bool,
}

impl CleanupReport {
    #[allow(clippy::cast_precision_loss)]
    pub fn mb_freed(&self) -> f64 {
        self.bytes_freed as f64 / (1024.0 * 1024.0)
    }

    fn add(&mut self, path: &Path, rule: CleanupRule, (items, bytes): (u64, u64)) {
        self.items_deleted += items;
        self.bytes_freed += bytes;
        self.details.push(PathCleanup {
            path: path.to_path_buf(),
            rule,
            items,
            bytes,
        });
    }
}

/// Run every cleanup rule in `config`.
pub fn run_cleanup(config: &CleanupConfig, dry_run: bool) -> CleanupReport {
    run_cleanup_at(config, dry_run, SystemTime::now())
}

/// `run_cleanup` with an explicit reference time for the age rule.
pub fn run_cleanup_at(config: &CleanupConfig, dry_run: bool, now: SystemTime) -> CleanupReport {
    let mut report = CleanupReport {
        dry_run,
        ..CleanupReport::default()
    };

    for path in &config.sweep_paths {
        report.add(path, CleanupRule::Sweep, sweep_directory(path, dry_run));
    }

    for root in &config.cache_roots {
        let totals = sweep_cache_dirs(root, &config.cache_dir_names, &config.sweep_paths, dry_run);
        report.add(root, CleanupRule::CacheDirs, totals);
    }

    for aged in &config.aged {
        let max_age = Duration::from_secs(aged.max_age_days.saturating_mul(SECS_PER_DAY));
        report.add(&aged.path, CleanupRule::Aged, sweep_aged(&aged.path, max_age, now, dry_run));
    }

    info!(
        items = report.items_deleted,
        mb = format!("{:.2}", report.mb_freed()),
        dry_run,
        "Cleanup finished"
    );
    report
}

/// Remove one entry. Returns its size when it is (or would be) gone.
fn remove_entry(path: &Path, dry_run: bool) -> Option<u64> {
    let meta = fs::symlink_metadata(path).ok()?;
    let is_dir = meta.file_type().is_dir();
    let size = if is_dir { dir_size(path) } else { meta.len() };
    if dry_run {
        return Some(size);
    }
    let removed = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Some(size),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping entry");
            None
        }
    }
}

/// Total size of regular files below `path`, without following symlinks.
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}

fn sweep_directory(path: &Path, dry_run: bool) -> (u64, u64) {
    let Ok(entries) = fs::read_dir(path) else {
        return (0, 0);
    };
    let mut totals = (0, 0);
    for entry in entries.flatten() {
        if let Some(size) = remove_entry(&entry.path(), dry_run) {
            totals.0 += 1;
            totals.1 += size;
        }
    }
    totals
}

/// Remove cache directories under `root`. Directories inside a sweep path
/// are left to the sweep so they are never counted twice.
fn sweep_cache_dirs(root: &Path, names: &[String], sweep_paths: &[PathBuf], dry_run: bool) -> (u64, u64) {
    let mut totals = (0, 0);
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(ft) = entry.file_type() else { continue };
            if !ft.is_dir() {
                continue;
            }
            let path = entry.path();
            if sweep_paths.iter().any(|s| path.starts_with(s)) {
                continue;
            }
            let is_cache = entry
                .file_name()
                .to_str()
                .is_some_and(|n| names.iter().any(|c| c == n));
            if is_cache {
                if let Some(size) = remove_entry(&path, dry_run) {
                    totals.0 += 1;
                    totals.1 += size;
                }
            } else {
                stack.push(path);
            }
        }
    }
    totals
}

fn sweep_aged(path: &Path, max_age: Duration, now: SystemTime, dry_run: bool) -> (u64, u64) {
    let Ok(entries) = fs::read_dir(path) else {
        return (0, 0);
    };
    let mut totals = (0, 0);
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if !entry.file_type().is_ok_and(|ft| ft.is_file()) {
            continue;
        }
        let old_enough = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .is_some_and(|age| age > max_age);
        if !old_enough {
            continue;
        }
        if let Some(size) = remove_entry(&entry.path(), dry_run) {
            totals.0 += 1;
            totals.1 += size;
        }
    }
    totals
}
