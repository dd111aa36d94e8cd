//! Route definitions
//!
//! - /health - process liveness
//! - /status - operational snapshot (uptime, counters, last checks, services)

use axum::{routing::get, Router};

use super::handlers;
use crate::watchdog::SharedStatus;

pub fn status_routes(status: SharedStatus) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .with_state(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckKind, ServiceState, StatusReport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn create_test_status() -> SharedStatus {
        let mut report = StatusReport::empty(Utc::now());
        report.total_checks = 7;
        report.services.insert("bot".to_string(), ServiceState::PersistentlyUnhealthy);
        report.last_checks.insert(CheckKind::Services, Some(Utc::now()));
        Arc::new(RwLock::new(report))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_route() {
        let (status, body) = get_json(status_routes(create_test_status()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_route_serves_snapshot() {
        let (status, body) = get_json(status_routes(create_test_status()), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_checks"], 7);
        assert_eq!(body["services"]["bot"], "persistently_unhealthy");
        assert!(body["last_checks"]["services"].is_string());
        assert!(body["last_checks"]["billing"].is_null());
    }

    #[tokio::test]
    async fn test_status_reflects_updates() {
        let shared = create_test_status();
        shared.write().await.alerts_sent = 3;
        let (_, body) = get_json(status_routes(shared), "/status").await;
        assert_eq!(body["alerts_sent"], 3);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = status_routes(create_test_status())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
