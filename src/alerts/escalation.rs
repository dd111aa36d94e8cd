//! Per-metric escalation state
//!
//! Warning and critical are separate alert keys, so a metric sliding back
//! from critical to warning would otherwise fire a fresh warning alert that
//! carries no new information. The tracker drops those de-escalation ticks;
//! everything else still goes through the dispatcher cooldown.

use std::collections::HashMap;

use crate::types::Severity;

#[derive(Debug, Default)]
pub struct EscalationTracker {
    levels: HashMap<String, Severity>,
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current level of `metric` and report whether it may alert.
    ///
    /// Returns `None` when the metric is normal or has just de-escalated,
    /// otherwise the severity to alert with.
    pub fn observe(&mut self, metric: &str, level: Option<Severity>) -> Option<Severity> {
        let Some(level) = level else {
            self.levels.remove(metric);
            return None;
        };
        let previous = self.levels.insert(metric.to_string(), level);
        match previous {
            Some(prev) if level < prev => None,
            _ => Some(level),
        }
    }

    pub fn level(&self, metric: &str) -> Option<Severity> {
        self.levels.get(metric).copied()
    }
}
