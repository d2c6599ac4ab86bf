// Card Collection - Web Server
// REST API over the reconciliation engine (Axum)

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use card_collection::{
    apply_batch, parse_json_batch, setup_database, AmbiguousStateError, CardEntry, CardFilter,
    CardStore, CatalogLookup, Config, FlushSummary, ReconciliationReport, SqliteCardStore,
};
use clap::Parser;
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "card-collection-server", version, about = "Card collection REST API")]
struct Args {
    /// Config file (default: card-collection.toml or .card-collection.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides `database` from the config
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Shared application state
///
/// One connection behind one mutex: batches never run concurrently, so no
/// two batches can race on the same owner's snapshot.
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

impl AppState {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

#[derive(Serialize)]
struct ApplyResponse {
    report: ReconciliationReport,
    flushed: FlushSummary,
}

#[derive(Serialize)]
struct ClearResponse {
    deleted: usize,
}

// ============================================================================
// Errors
// ============================================================================

struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(ambiguous) = err.downcast_ref::<AmbiguousStateError>() {
            return ApiError {
                status: StatusCode::CONFLICT,
                message: ambiguous.to_string(),
                details: Some(serde_json::json!({
                    "owner_id": ambiguous.owner_id,
                    "fingerprint": ambiguous.fingerprint,
                    "entry_ids": ambiguous.entry_ids,
                })),
            };
        }
        tracing::error!(error = ?err, "request failed");
        ApiError::internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: self.details,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "OK",
        "version": card_collection::VERSION,
    })))
}

/// GET /api/collections/:owner/cards - All cards of an owner
async fn list_cards(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Vec<CardEntry>> {
    let conn = state.lock()?;
    let store = SqliteCardStore::new(&conn, state.config.actor.as_str());
    Ok(Json(ApiResponse::ok(store.load_owner_entries(&owner)?)))
}

/// GET /api/collections/:owner/cards/:id - One card
async fn get_card(
    State(state): State<AppState>,
    Path((owner, id)): Path<(String, String)>,
) -> ApiResult<CardEntry> {
    let conn = state.lock()?;
    let store = SqliteCardStore::new(&conn, state.config.actor.as_str());

    match store.find_one(&CardFilter::owner(owner).with_id(id.as_str()))? {
        Some(entry) => Ok(Json(ApiResponse::ok(entry))),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("card {id} not found"),
        )),
    }
}

/// POST /api/collections/:owner/cards - Apply a batch of change requests
///
/// Body: JSON array of requests, or `{"cards": [...]}`. Per-item failures
/// are reported inside the report; a corrupted collection yields 409.
async fn apply_changes(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    body: String,
) -> ApiResult<ApplyResponse> {
    let requests = parse_json_batch(&body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("{e:#}")))?;

    let conn = state.lock()?;
    let store = SqliteCardStore::new(&conn, state.config.actor.as_str());
    let catalog = if state.config.validate_catalog {
        Some(store.load_catalog()?)
    } else {
        None
    };

    let (report, flushed) = apply_batch(
        &store,
        catalog.as_ref().map(|c| c as &dyn CatalogLookup),
        &owner,
        requests,
    )?;

    Ok(Json(ApiResponse::ok(ApplyResponse { report, flushed })))
}

/// DELETE /api/collections/:owner/cards - Remove every card of an owner
async fn clear_cards(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<ClearResponse> {
    let conn = state.lock()?;
    let store = SqliteCardStore::new(&conn, state.config.actor.as_str());
    let deleted = store.delete_all(&owner)?;
    Ok(Json(ApiResponse::ok(ClearResponse { deleted })))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/collections/:owner/cards",
            get(list_cards).post(apply_changes).delete(clear_cards),
        )
        .route("/collections/:owner/cards/:id", get(get_card))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::resolve(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database = db;
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", config.log_filter()).into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let conn = Connection::open(&config.database)
        .with_context(|| format!("Failed to open database: {}", config.database.display()))?;
    setup_database(&conn)?;
    tracing::info!(database = %config.database.display(), "database opened");

    let addr = config.server.bind_address();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("server running on http://{addr}/api");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
