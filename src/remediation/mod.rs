//! Remediation: allow-listed service restarts with a per-service budget, and
//! filesystem cleanup when the disk goes critical.

pub mod cleanup;
pub mod restart;

pub use cleanup::{run_cleanup, run_cleanup_at, CleanupReport, CleanupRule, PathCleanup};
pub use restart::{RemediationEngine, RemediationOutcome, RestartAction, RestartHistory};
