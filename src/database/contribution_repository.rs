use crate::database::error::DatabaseError;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Crowdfunding pledge entity
#[derive(Debug, Clone, FromRow)]
pub struct Contribution {
    pub id: Uuid,
    pub book_id: Uuid,
    pub contributor_id: Option<Uuid>,
    pub contributor_name: String,
    pub amount: BigDecimal,
    pub reward: Option<String>,
    pub is_public: bool,
    pub status: String,
    pub payment_method: String,
    pub provider_payment_reference: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Row shape for the public contributor listing
#[derive(Debug, Clone, FromRow)]
pub struct PublicContributor {
    pub contributor_name: String,
    pub amount: BigDecimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const CONTRIBUTION_COLUMNS: &str = "id, book_id, contributor_id, contributor_name, amount, reward, \
     is_public, status, payment_method, provider_payment_reference, \
     provider_transaction_id, created_at, updated_at";

/// Repository for managing contributions
///
/// Same conditional-update discipline as orders: `pending` is the only
/// mutable source state for settlement, `paid` for refunds.
pub struct ContributionRepository {
    pool: PgPool,
}

impl ContributionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_contribution(
        &self,
        book_id: Uuid,
        contributor_id: Option<Uuid>,
        contributor_name: &str,
        amount: BigDecimal,
        reward: Option<&str>,
        is_public: bool,
        payment_method: &str,
    ) -> Result<Contribution, DatabaseError> {
        sqlx::query_as::<_, Contribution>(&format!(
            "INSERT INTO contributions \
             (book_id, contributor_id, contributor_name, amount, reward, is_public, status, payment_method) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7) \
             RETURNING {CONTRIBUTION_COLUMNS}"
        ))
        .bind(book_id)
        .bind(contributor_id)
        .bind(contributor_name)
        .bind(amount)
        .bind(reward)
        .bind(is_public)
        .bind(payment_method)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Contribution>, DatabaseError> {
        sqlx::query_as::<_, Contribution>(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Contribution>, DatabaseError> {
        sqlx::query_as::<_, Contribution>(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE provider_payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Store the provider's pending reference, only while still pending.
    pub async fn set_payment_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE contributions \
             SET provider_payment_reference = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    /// `pending -> paid`
    pub async fn mark_paid(
        &self,
        id: Uuid,
        provider_transaction_id: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE contributions \
             SET status = 'paid', \
                 provider_transaction_id = COALESCE($2, provider_transaction_id), \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(provider_transaction_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    /// `paid -> refunded`
    pub async fn mark_refunded(&self, id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE contributions \
             SET status = 'refunded', updated_at = NOW() \
             WHERE id = $1 AND status = 'paid'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    /// Sum of settled pledges for a campaign
    pub async fn sum_paid(&self, book_id: Uuid) -> Result<BigDecimal, DatabaseError> {
        let row: (BigDecimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM contributions \
             WHERE book_id = $1 AND status = 'paid'",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.0)
    }

    pub async fn count_paid(&self, book_id: Uuid) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM contributions \
             WHERE book_id = $1 AND status = 'paid'",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.0)
    }

    /// Most recent public settled pledges, newest first
    pub async fn top_public_contributors(
        &self,
        book_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PublicContributor>, DatabaseError> {
        sqlx::query_as::<_, PublicContributor>(
            "SELECT contributor_name, amount, created_at FROM contributions \
             WHERE book_id = $1 AND status = 'paid' AND is_public = TRUE \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(book_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
