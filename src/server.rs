use crate::csv_io;
use crate::domain::{Address, AddressPatch, NewAddress};
use crate::error::GeofullError;
use crate::pipeline::EnrichmentPipeline;
use crate::storage::AddressStore;
use crate::tasks;
use axum::{
    extract::{Path, Query},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AddressStore>,
    pub pipeline: Arc<EnrichmentPipeline>,
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "detail": message }))).into_response()
}

fn internal_error(e: GeofullError) -> Response {
    error!(error = %e, "request failed");
    detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "project": "geofull",
        "status": "ok"
    }))
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "geofull",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Register a raw address and kick off its enrichment in the background.
/// The response returns immediately with the pending record.
async fn create_address(
    Extension(state): Extension<AppState>,
    Json(payload): Json<NewAddress>,
) -> Response {
    let original = payload.original_address.trim().to_string();
    if original.is_empty() {
        return detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "original_address must not be empty",
        );
    }

    match state.store.create(Address::new(original)).await {
        Ok(address) => {
            info!(id = %address.id, "address created, enrichment scheduled");
            state.pipeline.spawn_run(address.id);
            (StatusCode::CREATED, Json(address)).into_response()
        }
        Err(GeofullError::DuplicateAddress(_)) => {
            detail(StatusCode::BAD_REQUEST, "Address already registered")
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_addresses(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    match state.store.list(params.skip, params.limit).await {
        Ok(addresses) => Json(addresses).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_address(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(address)) => Json(address).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, "Address not found"),
        Err(e) => internal_error(e),
    }
}

/// Partial update. The raw text and id are immutable; enrichment is not
/// re-triggered here. An empty patch reads the record back unchanged.
async fn update_address(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<AddressPatch>,
) -> Response {
    let result = if patch.is_empty() {
        state.store.get(id).await
    } else {
        state.store.update(id, patch).await
    };

    match result {
        Ok(Some(address)) => Json(address).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, "Address not found"),
        Err(e) => internal_error(e),
    }
}

async fn delete_address(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.delete(id).await {
        Ok(Some(address)) => Json(address).into_response(),
        Ok(None) => detail(StatusCode::NOT_FOUND, "Address not found"),
        Err(e) => internal_error(e),
    }
}

/// Accept a CSV document, register every new address in it, and start
/// one enrichment run per created record.
async fn upload_csv(Extension(state): Extension<AppState>, body: String) -> Response {
    let summary = match tasks::import_csv_text(&state.store, &body).await {
        Ok(summary) => summary,
        Err(e @ GeofullError::Csv(_)) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => return internal_error(e),
    };

    for id in &summary.created_ids {
        state.pipeline.spawn_run(*id);
    }

    info!(
        rows = summary.rows_found,
        created = summary.created(),
        skipped = summary.skipped,
        "processed CSV upload"
    );
    Json(serde_json::json!({
        "message": format!("CSV accepted. Started {} enrichment tasks.", summary.created()),
        "rows_found": summary.rows_found,
        "new_addresses_created": summary.created(),
        "addresses_skipped": summary.skipped,
    }))
    .into_response()
}

/// Download every record as a CSV attachment.
async fn export_csv(Extension(state): Extension<AppState>) -> Response {
    let addresses = match state.store.list_all().await {
        Ok(addresses) => addresses,
        Err(e) => return internal_error(e),
    };

    if addresses.is_empty() {
        return detail(StatusCode::NOT_FOUND, "No addresses to export");
    }

    let csv = csv_io::render(&addresses);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"addresses_export.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

/// Create the HTTP API with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/addresses", post(create_address).get(list_addresses))
        .route(
            "/addresses/:id",
            get(get_address).put(update_address).delete(delete_address),
        )
        .route("/upload", post(upload_csv))
        .route("/export/csv", get(export_csv))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured address
pub async fn start_server(
    state: AppState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    println!("🚀 HTTP server running on http://{addr}");
    println!("💚 Health check: http://{addr}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
