use crate::database::error::DatabaseError;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Book fields the payment core reads and writes.
///
/// The catalog has more columns; this repository only touches what order
/// validation and campaign accounting need.
#[derive(Debug, Clone, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub price: BigDecimal,
    pub crowdfunding_enabled: bool,
    pub funding_goal: Option<BigDecimal>,
    pub funding_raised: BigDecimal,
}

const BOOK_COLUMNS: &str = "id, title, price, crowdfunding_enabled, funding_goal, funding_raised";

pub struct BookRepository {
    pool: PgPool,
}

impl BookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Book>, DatabaseError> {
        sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Batch lookup for order line-item validation
    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Book>, DatabaseError> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Add a settled pledge to the campaign's running total
    pub async fn increment_funding(
        &self,
        id: Uuid,
        amount: &BigDecimal,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE books \
             SET funding_raised = funding_raised + $2 \
             WHERE id = $1 AND crowdfunding_enabled = TRUE",
        )
        .bind(id)
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}
