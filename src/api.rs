// Account Ledger - HTTP API
//
// POST /daftar, GET /saldo/:no_rekening, POST /tarik, POST /tabung.
// Every failure is answered with 400 {"remark": "..."}.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::LedgerError;
use crate::registration::Registration;
use crate::service::AccountService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AccountService>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: AccountService, request_timeout: Duration) -> Self {
        Self {
            service: Arc::new(service),
            request_timeout,
        }
    }
}

// ============================================================================
// Request / Response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub nama: String,
    pub nik: String,
    pub no_hp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub no_rekening: String,
}

/// Body of /tarik and /tabung; `saldo` is the amount to move.
#[derive(Debug, Deserialize)]
pub struct BalanceChangeRequest {
    pub no_rekening: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub saldo: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub saldo: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub remark: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    BadRequest(String),
    #[error("request timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Ledger(LedgerError::Store(_)) | ApiError::Internal(_) | ApiError::Timeout => {
                tracing::error!(error = %self, "request failed")
            }
            _ => tracing::warn!(error = %self, "request rejected"),
        }

        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                remark: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Run a service call on the blocking pool, bounded by the request timeout.
///
/// On timeout the caller gets an error straight away; the statement already
/// handed to SQLite still completes or fails as a whole.
async fn run_blocking<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AccountService) -> Result<T, LedgerError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    let span = tracing::Span::current();
    let task = tokio::task::spawn_blocking(move || span.in_scope(|| call(&service)));

    match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join_error)) => Err(ApiError::Internal(join_error.to_string())),
        Err(_) => Err(ApiError::Timeout),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /daftar - Register a new account
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(body) = payload?;
    let registration = Registration {
        name: body.nama,
        nik: body.nik,
        phone_number: body.no_hp,
    };

    let account = run_blocking(&state, move |service| service.register(&registration)).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            no_rekening: account.account_number,
        }),
    ))
}

/// GET /saldo/:no_rekening - Current balance
async fn get_balance(
    State(state): State<AppState>,
    Path(no_rekening): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = run_blocking(&state, move |service| service.get_account(&no_rekening)).await?;
    Ok(Json(BalanceResponse {
        saldo: account.balance,
    }))
}

/// POST /tarik - Withdraw
async fn withdraw(
    State(state): State<AppState>,
    payload: Result<Json<BalanceChangeRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(body) = payload?;
    let saldo =
        run_blocking(&state, move |service| service.withdraw(&body.no_rekening, body.saldo)).await?;
    Ok(Json(BalanceResponse { saldo }))
}

/// POST /tabung - Deposit
async fn deposit(
    State(state): State<AppState>,
    payload: Result<Json<BalanceChangeRequest>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(body) = payload?;
    let saldo =
        run_blocking(&state, move |service| service.deposit(&body.no_rekening, body.saldo)).await?;
    Ok(Json(BalanceResponse { saldo }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/daftar", post(register))
        .route("/saldo/:no_rekening", get(get_balance))
        .route("/tarik", post(withdraw))
        .route("/tabung", post(deposit))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %uuid::Uuid::new_v4(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// SERVING
// ============================================================================

/// How long in-flight requests may run once shutdown has been signalled.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Serve `app` until `signal` resolves, then drain in-flight requests for
/// at most `grace`. Returns once the grace period expires even if
/// requests are still running.
pub async fn serve_with_grace<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let shutdown = async move {
        signal.await;
        notify.notify_one();
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return result,
        _ = signalled.notified() => {}
    }

    match tokio::time::timeout(grace, &mut serve).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                grace_secs = grace.as_secs_f64(),
                "shutdown grace period expired with requests still in flight"
            );
            Ok(())
        }
    }
}
