// Statement Parser - Web Server
// REST API with Axum: statement upload, merchant overrides, bank metadata

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use statement_parser::{
    bank_logo, Categorizer, Database, ExtractionFailure, OverrideStore, ParsedStatement, Settings,
    StatementError, StatementPipeline,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Request header carrying the user password of an encrypted statement
const PASSWORD_HEADER: &str = "x-pdf-password";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    pipeline: Arc<StatementPipeline>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct ApiError {
    code: &'static str,
    message: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Map a library error onto status code + envelope
fn error_response(err: &StatementError) -> Response {
    let status = status_for(err);
    if err.is_client_error() {
        warn!(code = err.code(), error = %err, "request rejected");
    } else {
        error!(code = err.code(), error = %err, "request failed");
    }
    (status, Json(ApiResponse::<()>::failure(err.code(), err.to_string()))).into_response()
}

fn status_for(err: &StatementError) -> StatusCode {
    match err {
        StatementError::DocumentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StatementError::DuplicateStatement => StatusCode::CONFLICT,
        StatementError::TimeoutExceeded { .. } => StatusCode::REQUEST_TIMEOUT,
        StatementError::Extraction(
            ExtractionFailure::PasswordRequired | ExtractionFailure::IncorrectPassword,
        ) => StatusCode::BAD_REQUEST,
        StatementError::Storage(_)
        | StatementError::Serialization(_)
        | StatementError::WorkerLost => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Document password from the upload headers, if any
fn document_password(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

#[derive(Serialize)]
struct UploadResponse {
    statement_id: String,
    statement: ParsedStatement,
    warnings: Vec<String>,
}

#[derive(Deserialize)]
struct OverrideRequest {
    merchant: String,
    category: String,
}

#[derive(Serialize)]
struct LogoResponse {
    bank: String,
    logo_url: &'static str,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/statements/:user_id - Parse and store a raw PDF body.
/// Encrypted statements carry their password in `X-Pdf-Password`.
async fn upload_statement(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let pipeline = Arc::clone(&state.pipeline);
    let budget = pipeline.timeout();
    let bytes = body.to_vec();
    let password = document_password(&headers);

    let task =
        tokio::task::spawn_blocking(move || pipeline.parse_bytes(bytes, password.as_deref()));
    let mut statement = match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(statement))) => statement,
        Ok(Ok(Err(e))) => return error_response(&e),
        Ok(Err(join_error)) => {
            error!(error = %join_error, "parse task failed");
            return error_response(&StatementError::WorkerLost);
        }
        Err(_) => {
            return error_response(&StatementError::TimeoutExceeded {
                secs: budget.as_secs(),
            })
        }
    };

    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return error_response(&StatementError::WorkerLost),
    };
    let saved = state
        .pipeline
        .categorize(&user_id, &mut statement, &*db)
        .and_then(|_| db.save_statement(&user_id, &statement));

    match saved {
        Ok(id) => {
            info!(user = %user_id, statement = %id, bank = %statement.bank, "statement uploaded");
            let response = UploadResponse {
                statement_id: id.to_string(),
                warnings: statement.warnings(),
                statement,
            };
            (StatusCode::CREATED, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// PUT /api/overrides/:user_id - Upsert a merchant override
async fn put_override(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Response {
    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return error_response(&StatementError::WorkerLost),
    };

    let categorizer = Categorizer::new(state.pipeline.rules(), &*db);
    match categorizer.apply_override(&user_id, &request.merchant, &request.category) {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::ok(outcome))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/overrides/:user_id - List a user's overrides
async fn list_overrides(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return error_response(&StatementError::WorkerLost),
    };

    match db.list_overrides(&user_id) {
        Ok(overrides) => (StatusCode::OK, Json(ApiResponse::ok(overrides))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/overrides/:user_id/:merchant - Remove an override
async fn delete_override(
    State(state): State<AppState>,
    Path((user_id, merchant)): Path<(String, String)>,
) -> Response {
    // Decode URL-encoded merchant
    let merchant = urlencoding::decode(&merchant)
        .unwrap_or_else(|_| merchant.clone().into())
        .into_owned();

    let db = match state.db.lock() {
        Ok(db) => db,
        Err(_) => return error_response(&StatementError::WorkerLost),
    };

    match Categorizer::new(state.pipeline.rules(), &*db).remove_override(&user_id, &merchant) {
        Ok(Some(outcome)) => (StatusCode::OK, Json(ApiResponse::ok(outcome))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::failure("API_004", format!("no override for '{}'", merchant))),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/banks/:code/logo - Static logo path for a bank
async fn get_bank_logo(Path(code): Path<String>) -> Response {
    match bank_logo(&code) {
        Some(logo_url) => (
            StatusCode::OK,
            Json(ApiResponse::ok(LogoResponse {
                bank: code.trim().to_lowercase(),
                logo_url,
            })),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::failure("API_004", format!("no logo for bank '{}'", code))),
        )
            .into_response(),
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn build_app(state: AppState) -> Router {
    let max_body = state.pipeline.settings().max_document_bytes;

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/statements/:user_id", post(upload_statement))
        .route("/overrides/:user_id", put(put_override).get(list_overrides))
        .route("/overrides/:user_id/:merchant", delete(delete_override))
        .route("/banks/:code/logo", get(get_bank_logo))
        .with_state(state);

    // Build main router
    Router::new()
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web/static"))
        .layer(
            ServiceBuilder::new()
                // one byte over the limit so the pipeline reports DocumentTooLarge itself
                .layer(DefaultBodyLimit::max(max_body.saturating_add(1)))
                .layer(CorsLayer::permissive()),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Statement Parser - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var_os("STATEMENT_CONFIG").map(std::path::PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    let db = Database::open(&settings.database_path)?;
    println!("✓ Database opened: {:?}", settings.database_path);

    let pipeline = StatementPipeline::from_settings(settings)?;
    println!(
        "✓ Limits: {} bytes, {:?} per parse",
        pipeline.settings().max_document_bytes,
        Duration::from_secs(pipeline.settings().parse_timeout_secs)
    );

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        pipeline: Arc::new(pipeline),
    };

    let app = build_app(state);

    // Start server
    let addr = std::env::var("STATEMENT_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
