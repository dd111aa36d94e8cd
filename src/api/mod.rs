//! Read-only HTTP status surface using Axum
//!
//! Serves the snapshot the watchdog loop publishes after every tick. The
//! handlers only ever take the read lock.

pub mod handlers;
mod routes;

pub use routes::status_routes;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::watchdog::SharedStatus;

/// Create the complete status router.
pub fn create_app(status: SharedStatus) -> Router {
    status_routes(status).layer(TraceLayer::new_for_http())
}
