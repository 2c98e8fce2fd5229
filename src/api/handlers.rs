use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{ApiError, ApiState};
use crate::audit::{AppendRequest, AuditEntryInput, AuditLogEntry, Checkpoint, VerificationResult};
use crate::database::queries::AuditLogFilter;

/// Optional `?from=&to=` sequence bounds.
#[derive(Debug, Default, Deserialize)]
pub struct SeqRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl SeqRange {
    fn bounds(&self) -> (i64, i64) {
        (self.from.unwrap_or(1), self.to.unwrap_or(i64::MAX))
    }
}

/// 503 with `"degraded"` when the ledger cannot be read.
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, code, ledger) = match state.ledger.count().await {
        Ok(rows) => (
            "healthy",
            StatusCode::OK,
            serde_json::json!({ "status": "healthy", "rows": rows }),
        ),
        Err(e) => {
            warn!("Health check could not read the ledger: {}", e);
            (
                "degraded",
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "status": "error", "error": e.to_string() }),
            )
        }
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "blud-audit-ledger",
            "timestamp": chrono::Utc::now(),
            "ledger": ledger,
        })),
    )
}

pub async fn append_entry(
    State(state): State<ApiState>,
    Json(request): Json<AppendRequest>,
) -> Result<(StatusCode, Json<AuditLogEntry>), ApiError> {
    let input = AuditEntryInput::try_from(request)?;
    let entry = state.ledger.append(input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_entries(
    State(state): State<ApiState>,
    Query(filter): Query<AuditLogFilter>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    Ok(Json(state.ledger.list(&filter).await?))
}

pub async fn get_entry(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AuditLogEntry>, ApiError> {
    state
        .ledger
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Audit entry {} not found", id)))
}

pub async fn verify(
    State(state): State<ApiState>,
    Query(range): Query<SeqRange>,
) -> Result<Json<VerificationResult>, ApiError> {
    let result = match (range.from, range.to) {
        (None, None) => state.ledger.verify_all().await?,
        _ => {
            let (from, to) = range.bounds();
            state.ledger.verify(from, to).await?
        }
    };

    info!("Verification requested over API: {}", result.summary());
    Ok(Json(result))
}

pub async fn checkpoint(
    State(state): State<ApiState>,
    Query(range): Query<SeqRange>,
) -> Result<Json<Checkpoint>, ApiError> {
    let (from, to) = range.bounds();
    Ok(Json(state.ledger.checkpoint(from, to).await?))
}
