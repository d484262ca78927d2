use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::alerts::{
    Alert, AlertCounts, AlertFilter, AlertManager, AlertStatus, AlertTrend, Severity, StoreError,
};

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<AlertManager>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Alert Queries
// ============================================================================

/// Query string for `GET /alerts`; values are validated by the handler
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub severity: Option<String>,
    pub status: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<u32>,
}

impl AlertQuery {
    fn into_filter(self) -> Result<AlertFilter, ApiError> {
        let mut filter = AlertFilter::new();

        if let Some(severity) = non_empty(self.severity) {
            filter = filter.with_severity(severity.parse::<Severity>()?);
        }
        if let Some(status) = non_empty(self.status) {
            filter = filter.with_status(status.parse::<AlertStatus>()?);
        }
        if let Some(start) = non_empty(self.start) {
            filter = filter.with_start(parse_time("start", &start)?);
        }
        if let Some(end) = non_empty(self.end) {
            filter = filter.with_end(parse_time("end", &end)?);
        }
        filter.limit = self.limit;

        Ok(filter)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("Invalid {} time {:?}: {}", field, value, e)))
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub count: usize,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let filter = query.into_filter()?;
    let alerts = state.manager.store().query(&filter).await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.manager.store().get(id).await?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub days: Option<u32>,
}

const DEFAULT_TREND_DAYS: u32 = 7;
const MAX_TREND_DAYS: u32 = 365;

/// Per-day alert counts by severity, oldest day first
pub async fn alert_trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<AlertTrend>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(1..=MAX_TREND_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}, got {}",
            MAX_TREND_DAYS, days
        )));
    }

    let trend = state.manager.store().trend(days).await?;
    Ok(Json(trend))
}

pub async fn alert_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AlertCounts>, ApiError> {
    let counts = state.manager.store().counts().await?;
    Ok(Json(counts))
}

// ============================================================================
// Alert Mutations
// ============================================================================

#[derive(Deserialize)]
pub struct CreateAlertRequest {
    pub message: String,
    pub severity: String,
}

pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let severity = request.severity.parse::<Severity>()?;
    let alert = state.manager.record(&request.message, severity).await?;
    tracing::info!(alert_id = alert.id, severity = %alert.severity, "Alert created via API");

    // Delivery can take a full channel timeout; answer once the record is stored
    let manager = Arc::clone(&state.manager);
    let pending = alert.clone();
    tokio::spawn(async move {
        manager.notify(&pending).await;
    });

    Ok((StatusCode::CREATED, Json(alert)))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .manager
        .store()
        .update_status(id, request.status.as_str())
        .await?;
    Ok(Json(alert))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(_) => ApiError::BadRequest(e.to_string()),
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Storage(_) | StoreError::Corrupted(_) => {
                tracing::error!(error = %e, "Alert store failure");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<crate::alerts::ValidationError> for ApiError {
    fn from(e: crate::alerts::ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
