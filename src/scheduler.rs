//! Per-kind check scheduling
//!
//! The loop ticks at a fixed cadence; each tick asks the schedule which
//! kinds are due. A kind is due when it has never run or when its interval
//! has elapsed since its last *completion*.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::IntervalsConfig;
use crate::types::CheckKind;

/// Source of the current time. Injected so tests can drive the loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// CheckKind -> last completion time. Only the coordinator mutates it.
#[derive(Debug, Clone, Default)]
pub struct CheckSchedule {
    last_run: BTreeMap<CheckKind, DateTime<Utc>>,
}

impl CheckSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_due(&self, kind: CheckKind, now: DateTime<Utc>, interval: Duration) -> bool {
        let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
        self.last_run
            .get(&kind)
            .map_or(true, |last| now.signed_duration_since(*last) >= interval)
    }

    pub fn mark_run(&mut self, kind: CheckKind, at: DateTime<Utc>) {
        self.last_run.insert(kind, at);
    }

    pub fn last_run(&self, kind: CheckKind) -> Option<DateTime<Utc>> {
        self.last_run.get(&kind).copied()
    }

    /// Due kinds in execution order.
    pub fn due_kinds(&self, now: DateTime<Utc>, intervals: &IntervalsConfig) -> Vec<CheckKind> {
        CheckKind::ALL
            .into_iter()
            .filter(|kind| self.is_due(*kind, now, intervals.for_kind(*kind)))
            .collect()
    }

    /// Snapshot for the status report, with `None` for kinds not yet run.
    pub fn snapshot(&self) -> BTreeMap<CheckKind, Option<DateTime<Utc>>> {
        CheckKind::ALL
            .into_iter()
            .map(|kind| (kind, self.last_run(kind)))
            .collect()
    }
}
