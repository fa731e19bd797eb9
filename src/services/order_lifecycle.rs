//! Order state machine
//!
//! States: `pending -> paid`, `pending -> cancelled`, `paid -> refunded`
//! (ledger-driven admin path only). Every transition is a conditional
//! update at the repository layer; when two requests race, exactly one wins
//! and the loser observes `rows_affected == 0`. For provider-driven
//! settlement the lost race is a silent no-op; for user-driven cancel it
//! surfaces as a state conflict.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::database::book_repository::BookRepository;
use crate::database::order_repository::{Order, OrderRepository};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, Money, PaymentMethod, PaymentState, ProviderName,
    WebhookEvent,
};
use crate::services::ledger::ReconciliationLedger;
use crate::services::notification::NotificationService;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleType {
    Direct,
    Preorder,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Direct => "direct",
            SaleType::Preorder => "preorder",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub book_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub items: Vec<OrderItemInput>,
    pub sale_type: SaleType,
    pub payment_method: String,
    #[serde(default)]
    pub promo_code: Option<String>,
}

/// What applying a provider event did to the matched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// `pending -> paid` happened now
    Settled,
    /// `paid -> refunded` happened now
    Refunded,
    /// Event id already in the ledger; nothing touched
    Duplicate,
    /// Recorded for audit but no transition applied (lost race, failed
    /// payment, or an event kind with no transition)
    Ignored,
}

pub struct OrderLifecycleService {
    orders: Arc<OrderRepository>,
    books: Arc<BookRepository>,
    ledger: Arc<ReconciliationLedger>,
    providers: Arc<PaymentProviderFactory>,
    checkout: CheckoutConfig,
    notifications: Arc<NotificationService>,
}

impl OrderLifecycleService {
    pub fn new(
        orders: Arc<OrderRepository>,
        books: Arc<BookRepository>,
        ledger: Arc<ReconciliationLedger>,
        providers: Arc<PaymentProviderFactory>,
        checkout: CheckoutConfig,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            orders,
            books,
            ledger,
            providers,
            checkout,
            notifications,
        }
    }

    /// Validate line items against the catalog, price the order server-side
    /// and persist it in `pending` under a fresh invoice number.
    pub async fn create(&self, owner_id: Uuid, input: CreateOrderInput) -> AppResult<Order> {
        if input.items.is_empty() {
            return Err(AppError::validation("items", "order must have at least one item"));
        }
        for item in &input.items {
            if item.quantity == 0 {
                return Err(AppError::validation("quantity", "must be greater than zero"));
            }
        }
        let payment_method = PaymentMethod::from_str(&input.payment_method)?;

        let book_ids: Vec<Uuid> = input.items.iter().map(|item| item.book_id).collect();
        let books = self.books.find_many(&book_ids).await?;

        let mut total = BigDecimal::from(0);
        let mut items_json = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let book = books
                .iter()
                .find(|book| book.id == item.book_id)
                .ok_or_else(|| {
                    AppError::new(AppErrorKind::Domain(DomainError::BookNotFound {
                        book_id: item.book_id.to_string(),
                    }))
                })?;

            total += &book.price * BigDecimal::from(item.quantity);
            items_json.push(serde_json::json!({
                "book_id": book.id,
                "title": book.title,
                "quantity": item.quantity,
                "unit_price": book.price.to_string(),
            }));
        }

        // The invoice number's unique index backs uniqueness; regenerate on
        // the (vanishingly rare) collision instead of failing the request.
        let mut attempts = 0;
        loop {
            let invoice_number = new_invoice_number();
            match self
                .orders
                .create_order(
                    owner_id,
                    serde_json::Value::Array(items_json.clone()),
                    total.clone(),
                    input.sale_type.as_str(),
                    payment_method.as_str(),
                    input.promo_code.as_deref(),
                    &invoice_number,
                )
                .await
            {
                Ok(order) => {
                    info!(
                        order_id = %order.id,
                        invoice = %order.invoice_number,
                        total = %order.total,
                        "order created"
                    );
                    return Ok(order);
                }
                Err(e) if e.is_unique_violation() && attempts < 2 => {
                    attempts += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Open a provider checkout for a pending order.
    ///
    /// The provider's reference is stored on the order before the redirect
    /// URL is returned, so a webhook racing the HTTP response still matches.
    /// The order stays `pending`.
    pub async fn initiate_payment(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        user_email: &str,
        provider: ProviderName,
    ) -> AppResult<CheckoutSession> {
        let order = self.find_owned(order_id, user_id).await?;
        self.ensure_pending(&order, "only pending orders can be paid")?;

        let method = PaymentMethod::from_str(&order.payment_method)?;
        if !self.providers.method_matches(method, provider) {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::PaymentMethodMismatch {
                    configured: order.payment_method.clone(),
                    requested: provider.to_string(),
                },
            )));
        }

        let amount = Money::new(order.total.to_string(), method.checkout_currency());
        amount.validate_positive("total")?;

        let adapter = self.providers.get_provider(provider)?;
        let session = adapter
            .create_checkout(CheckoutRequest {
                amount: amount.clone(),
                description: format!("Commande {}", order.invoice_number),
                reference: order.invoice_number.clone(),
                success_url: self.checkout.success_url.clone(),
                cancel_url: self.checkout.cancel_url.clone(),
                customer_email: Some(user_email.to_string()),
                metadata: None,
            })
            .await?;

        let stored = self
            .orders
            .set_payment_reference(order.id, &session.provider_reference)
            .await?;
        if stored == 0 {
            // Left `pending` while the checkout was being created
            return Err(AppError::invalid_state(
                "order",
                "only pending orders can be paid",
            ));
        }

        self.ledger
            .record_checkout_attempt(order.id, Some(user_id), &session, &amount)
            .await?;
        info!(
            order_id = %order.id,
            provider = %provider,
            reference = %session.provider_reference,
            "checkout created"
        );

        Ok(session)
    }

    /// Apply a ledger-confirmed provider event to the order it references.
    ///
    /// Returns `None` when no order matches the event's reference (the
    /// caller may then try contributions). Duplicate deliveries and lost
    /// races resolve to no-ops, never errors.
    pub async fn settle_from_event(
        &self,
        event: &WebhookEvent,
    ) -> AppResult<Option<SettleOutcome>> {
        let reference = match &event.provider_reference {
            Some(reference) => reference,
            None => return Ok(None),
        };
        let order = match self.orders.find_by_provider_reference(reference).await? {
            Some(order) => order,
            None => return Ok(None),
        };

        if let Some(event_id) = &event.event_id {
            if self.ledger.has_processed(event.provider, event_id).await? {
                info!(order_id = %order.id, event_id = %event_id, "duplicate provider event, no-op");
                return Ok(Some(SettleOutcome::Duplicate));
            }
        }
        self.ledger.record_webhook_event(event, Some(order.id)).await?;

        let transaction_id = provider_transaction_id(event);
        match event.status {
            Some(PaymentState::Succeeded) => {
                let updated = self.orders.mark_paid(order.id, transaction_id).await?;
                if updated == 1 {
                    info!(order_id = %order.id, "order settled");
                    self.notifications.order_paid(&order);
                    Ok(Some(SettleOutcome::Settled))
                } else {
                    // Raced by a cancel or an earlier settle; the
                    // precondition already decided the winner.
                    info!(order_id = %order.id, status = %order.status, "settle lost the transition race, no-op");
                    Ok(Some(SettleOutcome::Ignored))
                }
            }
            Some(PaymentState::Refunded) => {
                let updated = self.orders.mark_refunded(order.id).await?;
                if updated == 1 {
                    self.notifications.order_refunded(&order);
                    Ok(Some(SettleOutcome::Refunded))
                } else {
                    Ok(Some(SettleOutcome::Ignored))
                }
            }
            Some(PaymentState::Failed) => {
                // The order stays pending; the user can retry payment.
                warn!(order_id = %order.id, event_type = %event.event_type, "payment failed at provider");
                Ok(Some(SettleOutcome::Ignored))
            }
            _ => Ok(Some(SettleOutcome::Ignored)),
        }
    }

    /// `pending -> cancelled`, owner only.
    pub async fn cancel(&self, order_id: Uuid, user_id: Uuid) -> AppResult<Order> {
        let order = self.find_owned(order_id, user_id).await?;
        self.ensure_pending(&order, "only pending orders can be cancelled")?;

        let updated = self.orders.mark_cancelled(order.id).await?;
        if updated == 0 {
            // A settle won the race between the read and this write
            return Err(AppError::invalid_state(
                "order",
                "only pending orders can be cancelled",
            ));
        }

        info!(order_id = %order.id, "order cancelled");
        self.find(order_id).await
    }

    /// Re-open a checkout for the order's configured provider.
    pub async fn retry_payment(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        user_email: &str,
    ) -> AppResult<CheckoutSession> {
        let order = self.find_owned(order_id, user_id).await?;
        self.ensure_pending(&order, "only pending orders can retry payment")?;

        let method = PaymentMethod::from_str(&order.payment_method)?;
        self.initiate_payment(order_id, user_id, user_email, method.provider())
            .await
    }

    pub async fn find(&self, order_id: Uuid) -> AppResult<Order> {
        self.orders.find_by_id(order_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            }))
        })
    }

    pub async fn list_for_owner(&self, owner_id: Uuid, limit: i64) -> AppResult<Vec<Order>> {
        Ok(self.orders.find_by_owner(owner_id, limit).await?)
    }

    async fn find_owned(&self, order_id: Uuid, user_id: Uuid) -> AppResult<Order> {
        let order = self.find(order_id).await?;
        if order.owner_id != user_id {
            return Err(AppError::forbidden("order belongs to another user"));
        }
        Ok(order)
    }

    fn ensure_pending(&self, order: &Order, message: &str) -> AppResult<()> {
        if order.status != "pending" {
            return Err(AppError::invalid_state("order", message));
        }
        Ok(())
    }
}

/// `LIV-<year>-<8 hex>`; uniqueness is backed by the invoice_number index.
fn new_invoice_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("LIV-{}-{}", chrono::Utc::now().format("%Y"), suffix)
}

/// The Stripe adapter folds the payment intent into the event payload;
/// other providers carry nothing extra.
fn provider_transaction_id(event: &WebhookEvent) -> Option<&str> {
    event
        .payload
        .get("provider_transaction_id")
        .and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_have_the_expected_shape() {
        let invoice = new_invoice_number();
        let year = chrono::Utc::now().format("%Y").to_string();
        assert!(invoice.starts_with(&format!("LIV-{}-", year)));
        assert_eq!(invoice.len(), 4 + 4 + 1 + 8);

        let other = new_invoice_number();
        assert_ne!(invoice, other);
    }

    #[test]
    fn transaction_id_is_read_from_event_payload() {
        let event = WebhookEvent {
            provider: ProviderName::Stripe,
            event_type: "checkout.session.completed".to_string(),
            event_id: Some("evt_1".to_string()),
            provider_reference: Some("cs_1".to_string()),
            status: Some(PaymentState::Succeeded),
            amount: None,
            payload: serde_json::json!({ "provider_transaction_id": "pi_42" }),
            received_at: chrono::Utc::now().to_rfc3339(),
        };

        assert_eq!(provider_transaction_id(&event), Some("pi_42"));
    }

    #[test]
    fn sale_type_serializes_snake_case() {
        assert_eq!(SaleType::Direct.as_str(), "direct");
        assert_eq!(SaleType::Preorder.as_str(), "preorder");
        let parsed: SaleType = serde_json::from_str("\"preorder\"").unwrap();
        assert_eq!(parsed, SaleType::Preorder);
    }
}
