//! Watchdog Configuration Module
//!
//! Loads intervals, thresholds, remediation limits and alert settings from
//! TOML, with built-in defaults matching the stock deployment.
//!
//! ## Loading Order
//!
//! 1. `--config` CLI flag (hard error if the file is bad)
//! 2. `WATCHKEEPER_CONFIG` environment variable (path to TOML file)
//! 3. `watchkeeper.toml` in the current working directory
//! 4. Built-in defaults
//!
//! ## Usage
//!
//! The watchdog takes ownership of the loaded config:
//!
//! ```ignore
//! let config = WatchdogConfig::load();
//! let parts = WatchdogParts::from_config(&config, store)?;
//! let watchdog = Watchdog::new(config, parts);
//! ```

mod watchdog_config;
pub mod defaults;
pub mod validation;

pub use watchdog_config::*;
