use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, PaymentState, ProviderName, WebhookEvent,
    WebhookVerification,
};
use async_trait::async_trait;

/// Capability set every checkout provider implements.
///
/// The contract: `create_checkout` converts the amount to the provider's
/// smallest currency unit itself where required, and the returned
/// `provider_reference` is opaque — callers store it before redirecting the
/// user. Preconditions (amount > 0, record still pending, method matches
/// the provider) belong to the caller, not the adapter.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession>;

    /// Server-side status lookup for a previously created checkout
    async fn verify_payment(&self, provider_reference: &str) -> PaymentResult<PaymentState>;

    fn name(&self) -> ProviderName;

    /// Authenticate an inbound webhook delivery.
    ///
    /// Async because some providers (PayPal) confirm server-side rather
    /// than by a locally checkable signature.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerification>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::Money;

    struct MockProvider;

    #[async_trait]
    impl PaymentProvider for MockProvider {
        async fn create_checkout(
            &self,
            request: CheckoutRequest,
        ) -> PaymentResult<CheckoutSession> {
            request.amount.validate_positive("amount")?;
            Ok(CheckoutSession {
                provider: ProviderName::Stripe,
                provider_reference: "mock_ref".to_string(),
                redirect_url: "https://example.com/pay".to_string(),
                provider_data: None,
            })
        }

        async fn verify_payment(&self, _provider_reference: &str) -> PaymentResult<PaymentState> {
            Ok(PaymentState::Succeeded)
        }

        fn name(&self) -> ProviderName {
            ProviderName::Stripe
        }

        async fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> PaymentResult<WebhookVerification> {
            Ok(WebhookVerification {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            Ok(WebhookEvent {
                provider: ProviderName::Stripe,
                event_type: "mock".to_string(),
                event_id: Some("evt_mock".to_string()),
                provider_reference: None,
                status: Some(PaymentState::Succeeded),
                amount: None,
                payload: serde_json::json!({}),
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(MockProvider);
        let session = provider
            .create_checkout(CheckoutRequest {
                amount: Money::new("25.00", "EUR"),
                description: "Commande LIV-2026-TEST".to_string(),
                reference: "LIV-2026-TEST".to_string(),
                success_url: "https://example.com/success".to_string(),
                cancel_url: "https://example.com/cancel".to_string(),
                customer_email: Some("reader@example.com".to_string()),
                metadata: None,
            })
            .await
            .expect("checkout creation should succeed");
        assert_eq!(session.provider_reference, "mock_ref");

        let rejected = provider
            .create_checkout(CheckoutRequest {
                amount: Money::new("0", "EUR"),
                description: String::new(),
                reference: String::new(),
                success_url: String::new(),
                cancel_url: String::new(),
                customer_email: None,
                metadata: None,
            })
            .await;
        assert!(rejected.is_err());
    }
}
