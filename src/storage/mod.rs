//! Alert and restart history persistence
//!
//! History lives in the watchdog loop; the store mirrors every change so a
//! restarted watchdog keeps its cooldowns and restart budget.

pub mod lockfile;
pub mod state;

pub use lockfile::ProcessLock;
pub use state::{InMemoryStore, SledStore, StateStore, StorageError};
