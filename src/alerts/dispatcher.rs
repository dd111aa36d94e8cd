//! Cooldown-deduplicated alert delivery
//!
//! An alert key identifies "the same alert" (`ram:warning`, `health:prod`).
//! A key is sent when it has never been sent or its cooldown has elapsed,
//! and its timestamp only advances on confirmed delivery, so an alert that
//! failed to go out is retried the next time it occurs.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::channel::{AlertChannel, AlertError};
use crate::storage::StateStore;

/// What `send_alert` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    /// Same key sent less than a cooldown ago
    Suppressed,
    /// Channel did not confirm delivery; key not advanced
    Failed,
}

/// Alert key -> last confirmed delivery. Entries are overwritten, never removed.
#[derive(Debug, Clone, Default)]
pub struct AlertHistory {
    last_sent: HashMap<String, DateTime<Utc>>,
}

impl AlertHistory {
    pub fn from_map(last_sent: HashMap<String, DateTime<Utc>>) -> Self {
        Self { last_sent }
    }

    pub fn last_sent(&self, key: &str) -> Option<DateTime<Utc>> {
        self.last_sent.get(key).copied()
    }

    /// True when `key` was never sent or `now - last >= cooldown`.
    pub fn is_due(&self, key: &str, now: DateTime<Utc>, cooldown: TimeDelta) -> bool {
        self.last_sent
            .get(key)
            .map_or(true, |last| now.signed_duration_since(*last) >= cooldown)
    }

    pub fn record(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_sent.insert(key.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

/// Sends alerts through a channel, at most once per key per cooldown.
pub struct AlertDispatcher {
    channel: Arc<dyn AlertChannel>,
    store: Arc<dyn StateStore>,
    history: AlertHistory,
    cooldown: TimeDelta,
}

impl AlertDispatcher {
    /// Build a dispatcher, seeding its history from the store.
    pub fn new(channel: Arc<dyn AlertChannel>, store: Arc<dyn StateStore>, cooldown: Duration) -> Self {
        let history = match store.load_alert_history() {
            Ok(map) => {
                if !map.is_empty() {
                    info!(keys = map.len(), backend = store.backend_name(), "Restored alert history");
                }
                AlertHistory::from_map(map)
            }
            Err(e) => {
                warn!(error = %e, "Could not load alert history, starting empty");
                AlertHistory::default()
            }
        };
        Self {
            channel,
            store,
            history,
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Send `message` under `key` unless the key is cooling down.
    pub async fn send_alert(&mut self, message: &str, key: &str, now: DateTime<Utc>) -> AlertOutcome {
        if !self.history.is_due(key, now, self.cooldown) {
            debug!(key, "Alert suppressed by cooldown");
            return AlertOutcome::Suppressed;
        }

        match self.channel.send(message).await {
            Ok(()) => {
                self.history.record(key, now);
                if let Err(e) = self.store.record_alert(key, now) {
                    warn!(key, error = %e, "Alert sent but history not persisted");
                }
                info!(key, channel = self.channel.name(), "Alert sent");
                AlertOutcome::Sent
            }
            Err(AlertError::NotConfigured) => {
                warn!(key, "Alert not delivered: channel not configured");
                AlertOutcome::Failed
            }
            Err(e) => {
                error!(key, error = %e, "Alert delivery failed");
                AlertOutcome::Failed
            }
        }
    }

    /// Send without deduplication (startup notice, status report).
    pub async fn send_direct(&self, message: &str) -> Result<(), AlertError> {
        self.channel.send(message).await
    }

    pub const fn history(&self) -> &AlertHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        sent: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl AlertChannel for Recorder {
        async fn send(&self, _text: &str) -> Result<(), AlertError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AlertError::NotConfigured);
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    fn dispatcher(channel: Arc<Recorder>) -> AlertDispatcher {
        AlertDispatcher::new(channel, Arc::new(InMemoryStore::new()), Duration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn same_key_inside_cooldown_is_suppressed() {
        let ch = Arc::new(Recorder::default());
        let mut d = dispatcher(ch.clone());
        let t0 = Utc::now();

        assert_eq!(d.send_alert("m", "ram:warning", t0).await, AlertOutcome::Sent);
        assert_eq!(
            d.send_alert("m", "ram:warning", t0 + TimeDelta::minutes(29)).await,
            AlertOutcome::Suppressed
        );
        assert_eq!(
            d.send_alert("m", "ram:warning", t0 + TimeDelta::minutes(30)).await,
            AlertOutcome::Sent
        );
        assert_eq!(ch.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn severity_is_part_of_the_key() {
        let ch = Arc::new(Recorder::default());
        let mut d = dispatcher(ch.clone());
        let t0 = Utc::now();
        d.send_alert("m", "ram:warning", t0).await;
        assert_eq!(d.send_alert("m", "ram:critical", t0).await, AlertOutcome::Sent);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_advance_key() {
        let ch = Arc::new(Recorder::default());
        ch.fail.store(true, Ordering::SeqCst);
        let mut d = dispatcher(ch.clone());
        let t0 = Utc::now();

        assert_eq!(d.send_alert("m", "health:prod", t0).await, AlertOutcome::Failed);
        assert!(d.history().last_sent("health:prod").is_none());

        ch.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            d.send_alert("m", "health:prod", t0 + TimeDelta::seconds(60)).await,
            AlertOutcome::Sent
        );
    }

    #[tokio::test]
    async fn history_is_restored_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();
        store.record_alert("disk:critical", t0).unwrap();

        let mut d = AlertDispatcher::new(
            Arc::new(Recorder::default()),
            store,
            Duration::from_secs(30 * 60),
        );
        assert_eq!(
            d.send_alert("m", "disk:critical", t0 + TimeDelta::minutes(5)).await,
            AlertOutcome::Suppressed
        );
    }
}
