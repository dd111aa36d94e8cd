//! StateStore trait: pluggable backend for alert and restart history
//!
//! The watchdog owns its history in memory; a store only mirrors it so the
//! cooldowns and restart budget survive a process restart.
//! - `InMemoryStore`: default, nothing survives a restart
//! - `SledStore`: named sled trees, JSON values

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::types::RestartRecord;

/// Tree holding alert key -> last sent time.
const ALERT_TREE: &str = "alert_history";

/// Tree holding service -> bounded restart records.
const RESTART_TREE: &str = "restart_history";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Trait for history persistence backends
///
/// Implementations must be thread-safe (Send + Sync) so the status endpoint
/// and the loop can share one store.
pub trait StateStore: Send + Sync {
    /// All alert keys with the time they were last delivered
    fn load_alert_history(&self) -> Result<HashMap<String, DateTime<Utc>>, StorageError>;

    /// Record a confirmed alert delivery
    fn record_alert(&self, key: &str, sent_at: DateTime<Utc>) -> Result<(), StorageError>;

    /// All services with their retained restart records
    fn load_restart_history(&self) -> Result<HashMap<String, Vec<RestartRecord>>, StorageError>;

    /// Replace the retained restart records for one service
    fn save_restart_history(
        &self,
        service: &str,
        records: &[RestartRecord],
    ) -> Result<(), StorageError>;

    /// Push buffered writes to durable storage. Called once on shutdown.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// In-memory
// ============================================================================

/// Thread-safe via `RwLock`. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    alerts: RwLock<HashMap<String, DateTime<Utc>>>,
    restarts: RwLock<HashMap<String, Vec<RestartRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Poisoned(e.to_string())
}

impl StateStore for InMemoryStore {
    fn load_alert_history(&self) -> Result<HashMap<String, DateTime<Utc>>, StorageError> {
        Ok(self.alerts.read().map_err(poisoned)?.clone())
    }

    fn record_alert(&self, key: &str, sent_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.alerts
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), sent_at);
        Ok(())
    }

    fn load_restart_history(&self) -> Result<HashMap<String, Vec<RestartRecord>>, StorageError> {
        Ok(self.restarts.read().map_err(poisoned)?.clone())
    }

    fn save_restart_history(
        &self,
        service: &str,
        records: &[RestartRecord],
    ) -> Result<(), StorageError> {
        self.restarts
            .write()
            .map_err(poisoned)?
            .insert(service.to_string(), records.to_vec());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Sled
// ============================================================================

/// Durable history in a sled database.
///
/// Keys are the alert key / service name as UTF-8; values are JSON.
/// Writes are not flushed individually. sled flushes in the background and
/// the process flushes once more on shutdown.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    alerts: sled::Tree,
    restarts: sled::Tree,
}

impl SledStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let alerts = db.open_tree(ALERT_TREE)?;
        let restarts = db.open_tree(RESTART_TREE)?;
        Ok(Self { db, alerts, restarts })
    }
}

impl StateStore for SledStore {
    fn load_alert_history(&self) -> Result<HashMap<String, DateTime<Utc>>, StorageError> {
        let mut out = HashMap::new();
        for item in self.alerts.iter() {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k).into_owned();
            let sent_at: DateTime<Utc> = serde_json::from_slice(&v)?;
            out.insert(key, sent_at);
        }
        Ok(out)
    }

    fn record_alert(&self, key: &str, sent_at: DateTime<Utc>) -> Result<(), StorageError> {
        let value = serde_json::to_vec(&sent_at)?;
        self.alerts.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn load_restart_history(&self) -> Result<HashMap<String, Vec<RestartRecord>>, StorageError> {
        let mut out = HashMap::new();
        for item in self.restarts.iter() {
            let (k, v) = item?;
            let service = String::from_utf8_lossy(&k).into_owned();
            let records: Vec<RestartRecord> = serde_json::from_slice(&v)?;
            out.insert(service, records);
        }
        Ok(out)
    }

    fn save_restart_history(
        &self,
        service: &str,
        records: &[RestartRecord],
    ) -> Result<(), StorageError> {
        let value = serde_json::to_vec(records)?;
        self.restarts.insert(service.as_bytes(), value)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn records(now: DateTime<Utc>) -> Vec<RestartRecord> {
        vec![
            RestartRecord { timestamp: now - Duration::minutes(2), success: false },
            RestartRecord { timestamp: now, success: true },
        ]
    }

    #[test]
    fn memory_store_overwrites_alert_key() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        store.record_alert("ram:warning", t0).unwrap();
        store.record_alert("ram:warning", t0 + Duration::minutes(31)).unwrap();
        let history = store.load_alert_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history["ram:warning"], t0 + Duration::minutes(31));
    }

    #[test]
    fn sled_store_reads_back_history() {
        let dir = tempdir().unwrap();
        let now = Utc::now();
        let store = SledStore::open(dir.path().join("state.db")).unwrap();
        store.record_alert("health:prod", now).unwrap();
        store.save_restart_history("api", &records(now)).unwrap();
        store.flush().unwrap();

        assert_eq!(store.load_alert_history().unwrap()["health:prod"], now);
        let restarts = store.load_restart_history().unwrap();
        assert_eq!(restarts["api"], records(now));
        assert_eq!(store.backend_name(), "sled");
    }

    #[test]
    fn sled_history_survives_reopen_after_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let now = Utc::now();
        {
            let store: Arc<dyn StateStore> = Arc::new(SledStore::open(&path).unwrap());
            store.record_alert("service:api:exhausted", now).unwrap();
            store.save_restart_history("api", &records(now)).unwrap();
            store.flush().unwrap();
        }

        let reopened = SledStore::open(&path).unwrap();
        assert_eq!(reopened.load_alert_history().unwrap()["service:api:exhausted"], now);
        assert_eq!(reopened.load_restart_history().unwrap()["api"], records(now));
    }

    #[test]
    fn memory_flush_is_a_no_op() {
        assert!(InMemoryStore::new().flush().is_ok());
    }
}
