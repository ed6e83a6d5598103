//! HTTP surface consumed by the frontend. JSON in, JSON out; errors are
//! always `{error, message}` bodies.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use farmchain_common::product::{ProductId, ProductSummary};
use farmchain_common::projection::ProductProjection;

use crate::error::ServiceError;
use crate::reconcile::{OwnerListing, ReconcileService};

/// Listings are capped at this many rows regardless of cache size.
pub const RECENT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReconcileService>,
    pub cache_enabled: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error_response(error: &str, err: ServiceError) -> HandlerError {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: err.to_string(),
        }),
    )
}

fn parse_id(raw: &str) -> Result<ProductId, HandlerError> {
    ProductId::parse(raw).ok_or_else(|| {
        error_response(
            "Invalid product id",
            ServiceError::Validation(format!("'{raw}' is not a positive integer id")),
        )
    })
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    cache: String,
    timestamp: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        cache: if state.cache_enabled { "enabled" } else { "disabled" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn recent_products_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductSummary>>, HandlerError> {
    state
        .service
        .list_recent(RECENT_LIMIT)
        .await
        .map(Json)
        .map_err(|e| error_response("Failed to fetch products", e))
}

async fn product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductProjection>, HandlerError> {
    let id = parse_id(&id)?;
    state
        .service
        .get_by_id(id)
        .await
        .map(Json)
        .map_err(|e| error_response("Failed to fetch product", e))
}

async fn owner_products_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<OwnerListing>, HandlerError> {
    state
        .service
        .get_by_owner(&address)
        .await
        .map(Json)
        .map_err(|e| error_response("Failed to fetch products", e))
}

async fn sync_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductProjection>, HandlerError> {
    let id = parse_id(&id)?;
    state
        .service
        .sync(id)
        .await
        .map(Json)
        .map_err(|e| error_response("Failed to sync product", e))
}

async fn fallback_handler() -> HandlerError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Route not found".to_string(),
            message: "no handler matched this path".to_string(),
        }),
    )
}

/// Build the full router. CORS is wide open, as the original dev setup was.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/products", get(recent_products_handler))
        .route("/api/products/{id}", get(product_handler))
        .route("/api/products/owner/{address}", get(owner_products_handler))
        .route("/api/products/sync/{id}", post(sync_handler))
        .fallback(fallback_handler)
        .layer(cors)
        .with_state(state)
}
