use crate::aggregate::{Aggregator, DEFAULT_HISTORY_LIMIT};
use crate::errors::Error;
use crate::ingest;
use crate::model::{NewReading, Reading};
use crate::store::ReadingStore;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ReadingStore>,
    aggregator: Aggregator,
    history_max_limit: usize,
}

pub fn create_router(store: Arc<dyn ReadingStore>, history_max_limit: usize) -> Router {
    let state = AppState {
        aggregator: Aggregator::new(store.clone()),
        store,
        history_max_limit,
    };

    Router::new()
        .route("/api/data", post(add_reading))
        .route("/api/data/", post(add_reading))
        .route("/api/data/latest", get(latest_all))
        .route("/api/data/latest/", get(latest_all))
        .route("/api/data/latest/:device_id", get(latest_for_device))
        .route("/api/data/latest/:device_id/", get(latest_for_device))
        .route("/api/data/history/:device_id", get(device_history))
        .route("/api/data/history/:device_id/", get(device_history))
        .with_state(state)
}

async fn add_reading(
    State(state): State<AppState>,
    payload: Result<Json<NewReading>, JsonRejection>,
) -> Result<(StatusCode, Json<Reading>), AppError> {
    let Json(request) = payload.map_err(|e| Error::Validation(e.body_text()))?;
    let reading = ingest::append(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn latest_all(State(state): State<AppState>) -> Result<Json<Vec<Reading>>, AppError> {
    Ok(Json(state.aggregator.latest_all().await?))
}

async fn latest_for_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let reading = state.aggregator.latest(&device_id).await?;
    Ok(Json(vec![reading]))
}

async fn device_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let Query(params) = query.map_err(|e| Error::Validation(e.body_text()))?;
    let raw_limit = params
        .iter()
        .find(|(key, _)| key == "limit")
        .map(|(_, value)| value.as_str());
    let limit = parse_limit(raw_limit, state.history_max_limit);
    debug!("History for {} with limit {}", device_id, limit);
    Ok(Json(state.aggregator.history(&device_id, limit).await?))
}

/// Only the leading integer counts (`"5abc"` is 5, `"2.5"` is 2). Missing,
/// non-numeric and zero limits fall back to the default; negative limits
/// count from the newest reading just like positive ones.
fn parse_limit(raw: Option<&str>, max: usize) -> usize {
    let limit = raw
        .and_then(leading_magnitude)
        .filter(|value| *value != 0)
        .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    limit.min(max)
}

/// Absolute value of the integer prefix of `raw`, sign and leading
/// whitespace allowed. Overlong digit runs saturate.
fn leading_magnitude(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if end == 0 {
        return None;
    }
    Some(unsigned[..end].parse::<u64>().unwrap_or(u64::MAX))
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            other if other.is_unavailable() => {
                error!("Store unavailable: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Reading store is unavailable".to_string(),
                )
            }
            other => {
                error!("API error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", other),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}
