//! Campaign snapshot computation and streaming
//!
//! A snapshot is derived on demand from settled pledges and never stored,
//! so every emission of the stream is an independent, idempotent recompute:
//! a missed tick just means the next one carries a fresher total. The
//! stream is polling-over-push by design; dropping it (client disconnect)
//! releases the interval timer.

use axum::response::sse::Event;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::database::book_repository::BookRepository;
use crate::database::contribution_repository::ContributionRepository;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};

/// How many public contributors a snapshot lists
pub const TOP_CONTRIBUTORS_LIMIT: i64 = 5;

/// Tick period of the snapshot stream
pub const STREAM_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct ContributorView {
    pub name: String,
    pub amount: BigDecimal,
    pub contributed_at: chrono::DateTime<chrono::Utc>,
}

/// Derived campaign state; recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSnapshot {
    pub book_id: Uuid,
    pub goal: BigDecimal,
    pub raised: BigDecimal,
    pub percent: f64,
    pub contributor_count: i64,
    pub top_contributors: Vec<ContributorView>,
}

pub struct CampaignAggregator {
    books: Arc<BookRepository>,
    contributions: Arc<ContributionRepository>,
}

impl CampaignAggregator {
    pub fn new(books: Arc<BookRepository>, contributions: Arc<ContributionRepository>) -> Self {
        Self {
            books,
            contributions,
        }
    }

    /// Sum settled pledges for the campaign and derive the funding
    /// percentage, capped at 100 and zero for goalless campaigns.
    pub async fn snapshot(&self, book_id: Uuid) -> AppResult<CampaignSnapshot> {
        let book = self.books.find_by_id(book_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::BookNotFound {
                book_id: book_id.to_string(),
            }))
        })?;

        let raised = self.contributions.sum_paid(book_id).await?;
        let contributor_count = self.contributions.count_paid(book_id).await?;
        let top = self
            .contributions
            .top_public_contributors(book_id, TOP_CONTRIBUTORS_LIMIT)
            .await?;

        let goal = book.funding_goal.unwrap_or_else(|| BigDecimal::from(0));
        let percent = compute_percent(&goal, &raised);

        Ok(CampaignSnapshot {
            book_id,
            goal,
            raised,
            percent,
            contributor_count,
            top_contributors: top
                .into_iter()
                .map(|row| ContributorView {
                    name: row.contributor_name,
                    amount: row.amount,
                    contributed_at: row.created_at,
                })
                .collect(),
        })
    }

    /// Long-lived one-way push channel for a campaign.
    ///
    /// Emits a snapshot immediately on open (the first interval tick fires
    /// at once) and again every `STREAM_INTERVAL` until the subscriber
    /// drops the stream. Errors become named `error` events rather than
    /// terminating the stream.
    pub fn stream(
        self: Arc<Self>,
        book_id: Uuid,
    ) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        let mut interval = tokio::time::interval(STREAM_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        IntervalStream::new(interval).then(move |_| {
            let aggregator = Arc::clone(&self);
            async move { Ok::<Event, Infallible>(aggregator.emit(book_id).await) }
        })
    }

    async fn emit(&self, book_id: Uuid) -> Event {
        match self.snapshot(book_id).await {
            Ok(snapshot) => match serde_json::to_string(&snapshot) {
                Ok(data) => Event::default().data(data),
                Err(e) => error_event(&format!("snapshot serialization failed: {}", e)),
            },
            Err(e) => {
                warn!(book_id = %book_id, error = %e, "snapshot recompute failed");
                error_event(&e.user_message())
            }
        }
    }
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(serde_json::json!({ "error": message }).to_string())
}

/// `min(100, raised/goal*100)`, and 0 whenever the goal is not positive.
pub fn compute_percent(goal: &BigDecimal, raised: &BigDecimal) -> f64 {
    if goal <= &BigDecimal::from(0) {
        return 0.0;
    }
    let ratio = (raised / goal).to_f64().unwrap_or(0.0) * 100.0;
    ratio.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn percent_is_the_paid_share_of_the_goal() {
        let goal = BigDecimal::from(100);
        let raised = BigDecimal::from(50);
        assert_eq!(compute_percent(&goal, &raised), 50.0);
    }

    #[test]
    fn percent_caps_at_one_hundred() {
        let goal = BigDecimal::from(100);
        let raised = BigDecimal::from(250);
        assert_eq!(compute_percent(&goal, &raised), 100.0);
    }

    #[test]
    fn zero_or_negative_goal_yields_zero_percent() {
        let raised = BigDecimal::from(50);
        assert_eq!(compute_percent(&BigDecimal::from(0), &raised), 0.0);
        assert_eq!(compute_percent(&BigDecimal::from(-10), &raised), 0.0);
    }

    #[test]
    fn fractional_amounts_round_trip() {
        let goal = BigDecimal::from(100);
        let raised = BigDecimal::from_str("12.50").unwrap();
        assert_eq!(compute_percent(&goal, &raised), 12.5);
    }
}
