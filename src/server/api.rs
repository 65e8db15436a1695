use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use itemhub_common::{Item, ItemId};

use crate::bridge;
use crate::errors::ServiceError;
use crate::service::ItemService;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: ItemService,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ItemNotFound { .. } => ApiError::NotFound(err.to_string()),
            ServiceError::Validation(errors) => ApiError::BadRequest(errors.to_string()),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal(bridge::INTERNAL_ERROR_MESSAGE.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/process", get(process_items))
        .route(
            "/api/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/health", get(health))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn list_items(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let items = state.service.find_all().await?;
    if items.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(items).into_response())
}

async fn get_item(
    State(state): State<SharedState>,
    Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.service.find_by_id(id).await?;
    Ok(Json(item))
}

async fn create_item(
    State(state): State<SharedState>,
    Json(item): Json<Item>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create(item).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_item(
    State(state): State<SharedState>,
    Path(id): Path<ItemId>,
    Json(item): Json<Item>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.service.update(id, item).await?;
    Ok(Json(updated))
}

async fn delete_item(
    State(state): State<SharedState>,
    Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::OK)
}

/// Start a batch run and suspend until its result is bridged to a response.
async fn process_items(State(state): State<SharedState>) -> Response {
    let handle = state.service.process_all().await;
    tracing::info!(run_id = %handle.run_id(), submitted = handle.submitted(), "Batch run triggered");
    bridge::respond(handle)
        .unwrap_or_else(bridge::internal_error)
        .await
}
