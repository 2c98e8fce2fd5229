//! HTTP surface for the ledger: append, reporting reads, verification.

pub mod handlers;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::audit::AuditLedger;
use crate::error::LedgerError;

#[derive(Clone)]
pub struct ApiState {
    pub ledger: AuditLedger,
    pub api_token: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(ledger: AuditLedger, api_token: Option<String>) -> Self {
        Self {
            ledger,
            api_token: api_token.map(Arc::from),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let audit_routes = Router::new()
        .route(
            "/audit",
            post(handlers::append_entry).get(handlers::list_entries),
        )
        .route("/audit/verify", get(handlers::verify))
        .route("/audit/checkpoint", get(handlers::checkpoint))
        .route("/audit/:id", get(handlers::get_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(audit_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_token {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        if presented != Some(expected.as_ref()) {
            warn!("Rejected {} {}: missing or invalid bearer token", request.method(), request.uri().path());
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    NotFound(String),
    Unauthorized,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Ledger(err) => {
                let status = match &err {
                    LedgerError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    LedgerError::ConcurrentAppend(_) => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::ImmutabilityViolation(_) | LedgerError::ChainViolation { .. } => {
                        error!(target: "security", "Ledger integrity error: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    _ => {
                        error!("Ledger request failed: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
