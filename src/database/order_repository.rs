use crate::database::error::DatabaseError;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Order entity
///
/// `items` is the JSONB array of line items ({book_id, title, quantity,
/// unit_price}); the lifecycle service owns its shape.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub items: serde_json::Value,
    pub total: BigDecimal,
    pub status: String,
    pub sale_type: String,
    pub payment_method: String,
    pub provider_transaction_id: Option<String>,
    pub provider_payment_reference: Option<String>,
    pub promo_code: Option<String>,
    pub invoice_number: String,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

const ORDER_COLUMNS: &str = "id, owner_id, items, total, status, sale_type, payment_method, \
     provider_transaction_id, provider_payment_reference, promo_code, \
     invoice_number, paid_at, created_at, updated_at";

/// Repository for managing orders
///
/// Every state transition is a conditional update: the WHERE clause names
/// the expected source status and the caller inspects `rows_affected` to
/// learn whether it won the transition. Orders are never deleted.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new order in `pending`
    #[allow(clippy::too_many_arguments)]
    pub async fn create_order(
        &self,
        owner_id: Uuid,
        items: serde_json::Value,
        total: BigDecimal,
        sale_type: &str,
        payment_method: &str,
        promo_code: Option<&str>,
        invoice_number: &str,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders \
             (owner_id, items, total, status, sale_type, payment_method, promo_code, invoice_number) \
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(items)
        .bind(total)
        .bind(sale_type)
        .bind(payment_method)
        .bind(promo_code)
        .bind(invoice_number)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find the order a provider webhook refers to
    pub async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE provider_payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Store the provider's pending reference, only while still pending.
    ///
    /// Returns the number of rows updated; 0 means the order left `pending`
    /// between the read and this write.
    pub async fn set_payment_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders \
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

    /// `pending -> paid`; sets paid_at and the provider transaction id.
    pub async fn mark_paid(
        &self,
        id: Uuid,
        provider_transaction_id: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders \
             SET status = 'paid', paid_at = NOW(), \
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

    /// `pending -> cancelled`
    pub async fn mark_cancelled(&self, id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders \
             SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    /// `paid -> refunded`; reachable only through the ledger-driven admin path.
    pub async fn mark_refunded(&self, id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders \
             SET status = 'refunded', updated_at = NOW() \
             WHERE id = $1 AND status = 'paid'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}
