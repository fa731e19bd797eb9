//! Admin audit listing over the payment ledger.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::database::ledger_repository::LedgerEntry;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub related_id: Option<Uuid>,
    pub provider: String,
    pub kind: String,
    pub provider_event_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: String,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            related_id: entry.related_id,
            provider: entry.provider,
            kind: entry.kind,
            provider_event_id: entry.provider_event_id,
            provider_reference: entry.provider_reference,
            status: entry.status,
            amount: entry.amount.map(|amount| amount.to_string()),
            currency: entry.currency,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<i64>,
}

fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if !user.is_admin() {
        return Err(AppError::forbidden("admin role required"));
    }
    Ok(())
}

/// GET /api/admin/ledger
pub async fn list_ledger(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<LedgerQuery>,
) -> AppResult<Json<Vec<LedgerEntryResponse>>> {
    require_admin(&user)?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let entries = state.ledger.list_recent(limit).await?;
    Ok(Json(
        entries.into_iter().map(LedgerEntryResponse::from).collect(),
    ))
}

/// GET /api/admin/ledger/{related_id} — audit trail for one order or
/// contribution
pub async fn ledger_for_related(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(related_id): Path<Uuid>,
) -> AppResult<Json<Vec<LedgerEntryResponse>>> {
    require_admin(&user)?;

    let entries = state.ledger.list_for_related(related_id).await?;
    Ok(Json(
        entries.into_iter().map(LedgerEntryResponse::from).collect(),
    ))
}
