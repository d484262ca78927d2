use axum::{
    routing::{get, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    alert_stats, alert_trend, create_alert, get_alert, health_check, list_alerts, update_status,
    AppState,
};
use crate::config::ApiConfig;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Alerts
        .route("/alerts", get(list_alerts).post(create_alert))
        .route("/alerts/stats", get(alert_stats))
        .route("/alerts/trend", get(alert_trend))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/status", put(update_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the operator API until `shutdown` resolves
pub async fn run_server<F>(
    config: &ApiConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting operator API on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Operator API stopped");
    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertManager, AlertStore};
    use crate::notify::{NotificationChannel, NotificationFanout, NotifyError};
    use crate::Alert;
    use async_trait::async_trait;
    use axum::body::Body;
    use std::time::Duration;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    async fn create_test_app() -> (Router, Arc<AlertManager>) {
        let store = Arc::new(AlertStore::in_memory().await.unwrap());
        let manager = Arc::new(AlertManager::new(store, Arc::new(NotificationFanout::new())));
        let state = Arc::new(AppState {
            manager: Arc::clone(&manager),
        });
        (build_router(state), manager)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = create_test_app().await;

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_and_list_alerts() {
        let (app, _) = create_test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/alerts",
                serde_json::json!({"message": "manual test", "severity": "high"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["status"], "new");

        app.clone()
            .oneshot(json_request(
                "POST",
                "/alerts",
                serde_json::json!({"message": "low noise", "severity": "low"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/alerts?severity=high"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["alerts"][0]["message"], "manual test");

        let response = app.oneshot(get_request("/alerts")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["alerts"][0]["message"], "low noise");
    }

    #[tokio::test]
    async fn test_invalid_input_is_bad_request() {
        let (app, _) = create_test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/alerts",
                serde_json::json!({"message": "x", "severity": "critical"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("critical"));

        let response = app
            .clone()
            .oneshot(get_request("/alerts?status=resolved"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get_request("/alerts?start=yesterday"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_update_flow() {
        let (app, manager) = create_test_app().await;
        let alert = manager.raise_alert("disk full", "medium").await.unwrap();
        let uri = format!("/alerts/{}/status", alert.id);

        let response = app
            .clone()
            .oneshot(json_request("PUT", &uri, serde_json::json!({"status": "read"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "read");

        let response = app
            .clone()
            .oneshot(json_request("PUT", &uri, serde_json::json!({"status": "ignored"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(json_request("PUT", &uri, serde_json::json!({"status": "new"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/alerts/9999/status",
                serde_json::json!({"status": "read"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_alert_and_stats() {
        let (app, manager) = create_test_app().await;
        let first = manager.raise_alert("one", "high").await.unwrap();
        manager.raise_alert("two", "low").await.unwrap();
        manager.store().update_status(first.id, "ignored").await.unwrap();

        let response = app
            .clone()
            .oneshot(get_request(&format!("/alerts/{}", first.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");

        let response = app
            .clone()
            .oneshot(get_request("/alerts/stats"))
            .await
            .unwrap();
        let stats = body_json(response).await;
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["new"], 1);
        assert_eq!(stats["ignored"], 1);
        assert_eq!(stats["high"], 1);
        assert_eq!(stats["low"], 1);

        let response = app.oneshot(get_request("/alerts/424242")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alert_trend() {
        let (app, manager) = create_test_app().await;
        manager.raise_alert("one", "high").await.unwrap();
        manager.raise_alert("two", "high").await.unwrap();
        manager.raise_alert("three", "low").await.unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/alerts/trend?days=3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let trend = body_json(response).await;
        let days = trend.as_array().unwrap();
        assert_eq!(days.len(), 3);
        let today = chrono::Utc::now().date_naive().to_string();
        assert_eq!(days[2]["date"], today.as_str());
        assert_eq!(days[2]["high"], 2);
        assert_eq!(days[2]["low"], 1);
        assert_eq!(days[2]["medium"], 0);

        let response = app
            .clone()
            .oneshot(get_request("/alerts/trend"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 7);

        let response = app
            .oneshot(get_request("/alerts/trend?days=0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Holds every delivery for a minute
    struct StalledChannel;

    #[async_trait]
    impl NotificationChannel for StalledChannel {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_does_not_wait_for_delivery() {
        let store = Arc::new(AlertStore::in_memory().await.unwrap());
        let manager = Arc::new(AlertManager::new(store, Arc::new(StalledChannel)));
        let app = build_router(Arc::new(AppState {
            manager: Arc::clone(&manager),
        }));

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            app.oneshot(json_request(
                "POST",
                "/alerts",
                serde_json::json!({"message": "slow channel", "severity": "high"}),
            )),
        )
        .await
        .expect("create should answer before delivery finishes")
        .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(manager.store().get(id).await.unwrap().message, "slow channel");
    }
}
