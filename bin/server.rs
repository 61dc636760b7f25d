// FinWise - Web Server
// JSON API plus the static dashboard page

use axum::{
    extract::{FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use finwise::{
    auth, categories, db, files, parser, reports, transactions, users, NewTransaction,
    UploadedFile, User,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    storage: PathBuf,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn json_ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
    .into_response()
}

fn json_err(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }),
    )
        .into_response()
}

/// Log the full error server-side, surface a generic message; the client
/// shows an alert and the user retries
fn internal_error(context: &str, err: anyhow::Error) -> Response {
    log::error!("{}: {:#}", context, err);
    json_err(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ============================================================================
// Session extraction
// ============================================================================

/// The authenticated user behind the request's bearer token
struct AuthUser {
    user: User,
    token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = match token {
            Some(token) => token,
            None => return Err(json_err(StatusCode::UNAUTHORIZED, "Not authenticated")),
        };

        let conn = state.db.lock().unwrap();
        match auth::session_user(&conn, &token) {
            Ok(Some(user)) => Ok(AuthUser { user, token }),
            Ok(None) => Err(json_err(StatusCode::UNAUTHORIZED, "Not authenticated")),
            Err(e) => Err(internal_error("resolving session", e)),
        }
    }
}

// ============================================================================
// Auth handlers
// ============================================================================

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Session token plus the profile, returned by signup and login
#[derive(Serialize)]
struct AuthData {
    token: String,
    user: User,
    message: String,
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    json_ok("OK")
}

/// POST /api/auth/signup - Create an account and log it in
async fn signup(State(state): State<AppState>, Json(req): Json<SignupRequest>) -> Response {
    let conn = state.db.lock().unwrap();

    let outcome = match auth::signup(&conn, &req.email, &req.password, &req.name) {
        Ok(outcome) => outcome,
        Err(e) => return internal_error("signup", e),
    };

    if !outcome.success {
        return json_err(StatusCode::BAD_REQUEST, &outcome.message);
    }

    let user = match outcome.user {
        Some(user) => user,
        None => return json_err(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    match auth::create_session(&conn, &user.id) {
        Ok(session) => json_ok(AuthData {
            token: session.token,
            user,
            message: outcome.message,
        }),
        Err(e) => internal_error("creating session", e),
    }
}

/// POST /api/auth/login
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let conn = state.db.lock().unwrap();

    let outcome = match auth::login(&conn, &req.email, &req.password) {
        Ok(outcome) => outcome,
        Err(e) => return internal_error("login", e),
    };

    if !outcome.success {
        return json_err(StatusCode::UNAUTHORIZED, &outcome.message);
    }

    let user = match outcome.user {
        Some(user) => user,
        None => return json_err(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    match auth::create_session(&conn, &user.id) {
        Ok(session) => json_ok(AuthData {
            token: session.token,
            user,
            message: outcome.message,
        }),
        Err(e) => internal_error("creating session", e),
    }
}

/// POST /api/auth/logout - Drop the caller's session
async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match auth::destroy_session(&conn, &auth_user.token) {
        Ok(()) => json_ok("Signed out"),
        Err(e) => internal_error("logout", e),
    }
}

/// GET /api/auth/me - Profile for the current session
async fn me(AuthUser { user, .. }: AuthUser) -> Response {
    json_ok(user)
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    name: String,
}

/// PUT /api/profile - Update the display name
async fn update_profile(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match users::update_profile(&conn, &user.id, &req.name) {
        Ok(true) => match users::get_profile(&conn, &user.id) {
            Ok(Some(updated)) => json_ok(updated),
            Ok(None) => json_err(StatusCode::NOT_FOUND, "Profile not found"),
            Err(e) => internal_error("reloading profile", e),
        },
        Ok(false) => json_err(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => internal_error("updating profile", e),
    }
}

// ============================================================================
// Category handlers
// ============================================================================

#[derive(Deserialize)]
struct CreateCategoryRequest {
    name: String,
    color: Option<String>,
}

#[derive(Deserialize)]
struct UpdateCategoryRequest {
    name: Option<String>,
    color: Option<String>,
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match categories::list(&conn, &user.id) {
        Ok(cats) => json_ok(cats),
        Err(e) => internal_error("listing categories", e),
    }
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match categories::create(&conn, &user.id, &req.name, req.color.as_deref()) {
        Ok(category) => json_ok(category),
        Err(e) => {
            log::warn!("Rejected category create: {:#}", e);
            json_err(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// PUT /api/categories/:id
async fn update_category(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match categories::update(&conn, &user.id, &id, req.name.as_deref(), req.color.as_deref()) {
        Ok(true) => match categories::get(&conn, &user.id, &id) {
            Ok(Some(category)) => json_ok(category),
            Ok(None) => json_err(StatusCode::NOT_FOUND, "Category not found"),
            Err(e) => internal_error("reloading category", e),
        },
        Ok(false) => json_err(StatusCode::NOT_FOUND, "Category not found"),
        Err(e) => {
            log::warn!("Rejected category update: {:#}", e);
            json_err(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// DELETE /api/categories/:id - Referencing transactions become uncategorized
async fn delete_category(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match categories::delete(&conn, &user.id, &id) {
        Ok(true) => json_ok(true),
        Ok(false) => json_err(StatusCode::NOT_FOUND, "Category not found"),
        Err(e) => internal_error("deleting category", e),
    }
}

// ============================================================================
// Transaction handlers
// ============================================================================

/// GET /api/transactions
async fn list_transactions(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match transactions::list(&conn, &user.id) {
        Ok(txs) => json_ok(txs),
        Err(e) => internal_error("listing transactions", e),
    }
}

/// POST /api/transactions
async fn create_transaction(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Json(req): Json<NewTransaction>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match transactions::create(&conn, &user.id, &req) {
        Ok(tx) => json_ok(tx),
        Err(e) => {
            log::warn!("Rejected transaction create: {:#}", e);
            json_err(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// PUT /api/transactions/:id - Full replacement, including the category
/// assignment from the table's picker
async fn update_transaction(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<NewTransaction>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match transactions::update(&conn, &user.id, &id, &req) {
        Ok(true) => match transactions::get(&conn, &user.id, &id) {
            Ok(Some(tx)) => json_ok(tx),
            Ok(None) => json_err(StatusCode::NOT_FOUND, "Transaction not found"),
            Err(e) => internal_error("reloading transaction", e),
        },
        Ok(false) => json_err(StatusCode::NOT_FOUND, "Transaction not found"),
        Err(e) => {
            log::warn!("Rejected transaction update: {:#}", e);
            json_err(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// DELETE /api/transactions/:id
async fn delete_transaction(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match transactions::delete(&conn, &user.id, &id) {
        Ok(true) => json_ok(true),
        Ok(false) => json_err(StatusCode::NOT_FOUND, "Transaction not found"),
        Err(e) => internal_error("deleting transaction", e),
    }
}

// ============================================================================
// Report handlers
// ============================================================================

/// GET /api/reports/summary - Totals for the dashboard cards
async fn report_summary(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match reports::summary(&conn, &user.id) {
        Ok(summary) => json_ok(summary),
        Err(e) => internal_error("building summary", e),
    }
}

/// GET /api/reports/spending - Expense totals per category
async fn report_spending(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match reports::spending_by_category(&conn, &user.id) {
        Ok(spending) => json_ok(spending),
        Err(e) => internal_error("building spending report", e),
    }
}

/// GET /api/reports/cashflow - Monthly income/expense buckets
async fn report_cashflow(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match reports::monthly_cash_flow(&conn, &user.id) {
        Ok(flow) => json_ok(flow),
        Err(e) => internal_error("building cash flow report", e),
    }
}

// ============================================================================
// File handlers
// ============================================================================

/// Upload result: the stored file plus what the parser made of it
#[derive(Serialize)]
struct UploadData {
    file: UploadedFile,
    imported: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// GET /api/files
async fn list_files(State(state): State<AppState>, AuthUser { user, .. }: AuthUser) -> Response {
    let conn = state.db.lock().unwrap();

    match files::list(&conn, &user.id) {
        Ok(list) => json_ok(list),
        Err(e) => internal_error("listing files", e),
    }
}

/// POST /api/files - Multipart statement upload; CSV statements are parsed
/// into transactions on the spot
async fn upload_file(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Malformed multipart upload: {}", e);
                return json_err(StatusCode::BAD_REQUEST, "Malformed upload request");
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("statement.csv").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        match field.bytes().await {
            Ok(bytes) => upload = Some((file_name, content_type, bytes.to_vec())),
            Err(e) => {
                log::warn!("Failed to read upload body: {}", e);
                return json_err(StatusCode::BAD_REQUEST, "Failed to read uploaded file");
            }
        }
    }

    let (file_name, content_type, bytes) = match upload {
        Some(upload) => upload,
        None => return json_err(StatusCode::BAD_REQUEST, "Missing 'file' field"),
    };

    let conn = state.db.lock().unwrap();

    let file = match files::store(&conn, &state.storage, &user.id, &file_name, &content_type, &bytes) {
        Ok(file) => file,
        Err(e) => {
            log::warn!("Rejected upload: {:#}", e);
            return json_err(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    let (imported, skipped, warning) = if parser::is_csv(&file_name, &content_type) {
        match parser::import_statement(&conn, &user.id, &bytes) {
            Ok(summary) => (summary.inserted, summary.skipped, None),
            Err(e) => {
                log::warn!("Statement {} stored but not parsed: {:#}", file.id, e);
                (0, 0, Some(e.to_string()))
            }
        }
    } else {
        (0, 0, Some("Only CSV statements are parsed automatically".to_string()))
    };

    json_ok(UploadData { file, imported, skipped, warning })
}

/// GET /api/files/:id/download
async fn download_file(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
) -> Response {
    let conn = state.db.lock().unwrap();

    let file = match files::get(&conn, &user.id, &id) {
        Ok(Some(file)) => file,
        Ok(None) => return json_err(StatusCode::NOT_FOUND, "File not found"),
        Err(e) => return internal_error("loading file record", e),
    };

    match files::read_contents(&state.storage, &file) {
        Ok(bytes) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                urlencoding::encode(&file.file_name)
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, file.file_type.clone()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => internal_error("reading statement file", e),
    }
}

/// DELETE /api/files/:id
async fn delete_file(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    Path(id): Path<String>,
) -> Response {
    let conn = state.db.lock().unwrap();

    match files::delete(&conn, &state.storage, &user.id, &id) {
        Ok(true) => json_ok(true),
        Ok(false) => json_err(StatusCode::NOT_FOUND, "File not found"),
        Err(e) => internal_error("deleting file", e),
    }
}

/// GET / - Serve the dashboard page
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("🌐 FinWise - Personal Finance Dashboard");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = db::database_path();
    let conn = db::open_database(&db_path).expect("Failed to open database");
    db::setup_database(&conn).expect("Failed to set up database schema");
    println!("✓ Database ready: {:?}", db_path);

    let storage = db::storage_root();
    std::fs::create_dir_all(&storage).expect("Failed to create storage directory");
    println!("✓ Statement storage: {:?}", storage);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        storage,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/profile", put(update_profile))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/:id", put(update_transaction).delete(delete_transaction))
        .route("/reports/summary", get(report_summary))
        .route("/reports/spending", get(report_spending))
        .route("/reports/cashflow", get(report_cashflow))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/:id", delete(delete_file))
        .route("/files/:id/download", get(download_file))
        .with_state(state.clone());

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("FINWISE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
