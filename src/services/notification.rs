use crate::database::contribution_repository::Contribution;
use crate::database::order_repository::Order;
use tracing::info;

/// Settlement notification trigger point.
///
/// Delivery (email templates, SMS) lives outside this service; the trigger
/// is logged in a structured format a shipper can fan out from.
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }

    pub fn order_paid(&self, order: &Order) {
        info!(
            order_id = %order.id,
            invoice = %order.invoice_number,
            owner = %order.owner_id,
            total = %order.total,
            "🔔 NOTIFICATION: Order Paid - confirmation email queued"
        );
    }

    pub fn order_refunded(&self, order: &Order) {
        info!(
            order_id = %order.id,
            invoice = %order.invoice_number,
            owner = %order.owner_id,
            "🔔 NOTIFICATION: Order Refunded - refund email queued"
        );
    }

    pub fn contribution_paid(&self, contribution: &Contribution) {
        info!(
            contribution_id = %contribution.id,
            book_id = %contribution.book_id,
            amount = %contribution.amount,
            "🔔 NOTIFICATION: Contribution Received - thank-you email queued"
        );
    }

    pub fn contribution_refunded(&self, contribution: &Contribution) {
        info!(
            contribution_id = %contribution.id,
            book_id = %contribution.book_id,
            "🔔 NOTIFICATION: Contribution Refunded - refund email queued"
        );
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}
