use crate::database::error::DatabaseError;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Payment ledger entry
///
/// One row per provider event or payment attempt. Rows are never deleted;
/// the table doubles as the audit trail behind the admin listing.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub related_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub kind: String,
    pub provider_event_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: String,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub raw_payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Insert shape for a ledger write
#[derive(Debug, Clone)]
pub struct NewLedgerEntry<'a> {
    pub related_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub provider: &'a str,
    pub kind: &'a str,
    pub provider_event_id: Option<&'a str>,
    pub provider_reference: Option<&'a str>,
    pub status: &'a str,
    pub amount: Option<BigDecimal>,
    pub currency: Option<&'a str>,
    pub raw_payload: serde_json::Value,
}

const LEDGER_COLUMNS: &str = "id, related_id, user_id, provider, kind, provider_event_id, \
     provider_reference, status, amount, currency, raw_payload, created_at";

/// Repository for the payment reconciliation ledger
///
/// The unique index on (provider, provider_event_id) is the idempotency
/// guard against duplicate provider delivery; `record` leans on it with an
/// upsert so a redelivered event updates the existing row instead of
/// creating a second one.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a provider event.
    ///
    /// When `provider_event_id` is present this is an upsert keyed on
    /// (provider, provider_event_id): the first delivery inserts, any
    /// replay updates status and payload on the same row. Entries without
    /// an event id (e.g. outbound payment attempts) insert unconditionally.
    pub async fn record(&self, entry: NewLedgerEntry<'_>) -> Result<LedgerEntry, DatabaseError> {
        if entry.provider_event_id.is_some() {
            sqlx::query_as::<_, LedgerEntry>(&format!(
                "INSERT INTO payment_ledger \
                 (related_id, user_id, provider, kind, provider_event_id, \
                  provider_reference, status, amount, currency, raw_payload) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (provider, provider_event_id) \
                 DO UPDATE SET status = EXCLUDED.status, raw_payload = EXCLUDED.raw_payload \
                 RETURNING {LEDGER_COLUMNS}"
            ))
            .bind(entry.related_id)
            .bind(entry.user_id)
            .bind(entry.provider)
            .bind(entry.kind)
            .bind(entry.provider_event_id)
            .bind(entry.provider_reference)
            .bind(entry.status)
            .bind(entry.amount)
            .bind(entry.currency)
            .bind(entry.raw_payload)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
        } else {
            sqlx::query_as::<_, LedgerEntry>(&format!(
                "INSERT INTO payment_ledger \
                 (related_id, user_id, provider, kind, provider_event_id, \
                  provider_reference, status, amount, currency, raw_payload) \
                 VALUES ($1, $2, $3, $4, NULL, $5, $6, $7, $8, $9) \
                 RETURNING {LEDGER_COLUMNS}"
            ))
            .bind(entry.related_id)
            .bind(entry.user_id)
            .bind(entry.provider)
            .bind(entry.kind)
            .bind(entry.provider_reference)
            .bind(entry.status)
            .bind(entry.amount)
            .bind(entry.currency)
            .bind(entry.raw_payload)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
        }
    }

    /// Has this provider event already been recorded?
    pub async fn has_processed(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<bool, DatabaseError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                 SELECT 1 FROM payment_ledger \
                 WHERE provider = $1 AND provider_event_id = $2 \
             )",
        )
        .bind(provider)
        .bind(provider_event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.0)
    }

    /// Count rows for one provider event (at most 1 by construction)
    pub async fn count_for_event(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_ledger \
             WHERE provider = $1 AND provider_event_id = $2",
        )
        .bind(provider)
        .bind(provider_event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.0)
    }

    /// Audit listing, newest first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM payment_ledger \
             ORDER BY created_at DESC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Audit trail for one order or contribution
    pub async fn list_for_related(
        &self,
        related_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, DatabaseError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM payment_ledger \
             WHERE related_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(related_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
