//! Crowdfunding snapshot and live stream endpoints.

use axum::extract::{Path, State};
use axum::response::sse::Sse;
use axum::Json;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppResult;
use crate::services::CampaignSnapshot;

/// GET /api/campaigns/{book_id} — one-shot snapshot
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<CampaignSnapshot>> {
    let snapshot = state.aggregator.snapshot(book_id).await?;
    Ok(Json(snapshot))
}

/// GET /api/campaigns/{book_id}/stream — server-push snapshot stream.
///
/// Emits immediately, then on a fixed interval; recompute errors arrive as
/// named `error` events instead of closing the stream. Dropping the
/// connection drops the stream and its timer.
pub async fn stream_snapshots(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    Sse::new(state.aggregator.clone().stream(book_id))
}
