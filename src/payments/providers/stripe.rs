use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, Money, PaymentState, ProviderName, WebhookEvent,
    WebhookVerification,
};
use crate::payments::utils::{hmac_sha256_hex, secure_eq, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Maximum accepted age of the `t=` timestamp in a webhook signature
    pub signature_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            signature_tolerance_secs: 300,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "STRIPE_SECRET_KEY environment variable is required".to_string(),
                field: Some("STRIPE_SECRET_KEY".to_string()),
            })?;
        let webhook_secret =
            std::env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| PaymentError::ValidationError {
                message: "STRIPE_WEBHOOK_SECRET environment variable is required".to_string(),
                field: Some("STRIPE_WEBHOOK_SECRET".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_secs: std::env::var("STRIPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("STRIPE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            signature_tolerance_secs: std::env::var("STRIPE_SIGNATURE_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(300),
            secret_key,
            webhook_secret,
        })
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Check a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=…]`) against
    /// the payload. The signed message is `<ts>.<payload>`.
    fn check_signature(&self, payload: &[u8], signature: &str, now: i64) -> WebhookVerification {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = match timestamp {
            Some(ts) => ts,
            None => {
                return WebhookVerification {
                    valid: false,
                    reason: Some("missing timestamp in stripe signature".to_string()),
                }
            }
        };
        if signatures.is_empty() {
            return WebhookVerification {
                valid: false,
                reason: Some("no v1 signature found".to_string()),
            };
        }

        if (now - timestamp).abs() > self.config.signature_tolerance_secs {
            return WebhookVerification {
                valid: false,
                reason: Some("stripe signature timestamp outside tolerance".to_string()),
            };
        }

        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let expected = match hmac_sha256_hex(&signed, &self.config.webhook_secret) {
            Some(v) => v,
            None => {
                return WebhookVerification {
                    valid: false,
                    reason: Some("signature computation failed".to_string()),
                }
            }
        };

        let valid = signatures
            .iter()
            .any(|sig| secure_eq(expected.as_bytes(), sig.trim().as_bytes()));
        WebhookVerification {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid stripe signature".to_string())
            },
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        request.amount.validate_positive("amount")?;
        // Stripe takes minor units; the adapter owns the conversion.
        let unit_amount = request.amount.to_minor_units(2)?;

        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                request.reference.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.amount.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        let session: StripeCheckoutSession = self
            .http
            .request_form(
                reqwest::Method::POST,
                &self.endpoint("/v1/checkout/sessions"),
                Some(&self.config.secret_key),
                &form,
                &[],
            )
            .await?;

        let redirect_url = session.url.ok_or(PaymentError::ProviderError {
            provider: "stripe".to_string(),
            message: "checkout session has no redirect URL".to_string(),
            provider_code: None,
            retryable: false,
        })?;
        info!(reference = %session.id, "stripe checkout session created");

        Ok(CheckoutSession {
            provider: ProviderName::Stripe,
            provider_reference: session.id.clone(),
            redirect_url,
            provider_data: Some(serde_json::json!({
                "payment_intent": session.payment_intent,
                "provider_reference": session.id
            })),
        })
    }

    async fn verify_payment(&self, provider_reference: &str) -> PaymentResult<PaymentState> {
        let session: StripeCheckoutSession = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/checkout/sessions/{}", provider_reference)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;

        Ok(match session.payment_status.as_deref() {
            Some("paid") | Some("no_payment_required") => PaymentState::Succeeded,
            Some("unpaid") => match session.status.as_deref() {
                Some("expired") => PaymentState::Failed,
                _ => PaymentState::Pending,
            },
            _ => PaymentState::Unknown,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerification> {
        Ok(self.check_signature(payload, signature, chrono::Utc::now().timestamp()))
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let event_type = parsed
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event_id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let object = parsed.get("data").and_then(|v| v.get("object"));
        let provider_reference = object
            .and_then(|o| o.get("id"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let transaction_id = object
            .and_then(|o| o.get("payment_intent"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let amount = object.and_then(|o| {
            let total = o.get("amount_total").and_then(|v| v.as_i64())?;
            let currency = o.get("currency").and_then(|v| v.as_str())?;
            // back to major units for the ledger
            Some(Money::new(
                format!("{}.{:02}", total / 100, total % 100),
                currency.to_uppercase(),
            ))
        });

        let status = match event_type.as_str() {
            "checkout.session.completed" => {
                let paid = object
                    .and_then(|o| o.get("payment_status"))
                    .and_then(|v| v.as_str())
                    .map(|v| v == "paid" || v == "no_payment_required")
                    .unwrap_or(false);
                Some(if paid {
                    PaymentState::Succeeded
                } else {
                    PaymentState::Pending
                })
            }
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                Some(PaymentState::Failed)
            }
            "charge.refunded" => Some(PaymentState::Refunded),
            _ => None,
        };

        let mut payload_out = parsed;
        if let Some(tx) = transaction_id {
            payload_out["provider_transaction_id"] = serde_json::json!(tx);
        }

        Ok(WebhookEvent {
            provider: ProviderName::Stripe,
            event_type,
            event_id,
            provider_reference,
            status,
            amount,
            payload: payload_out,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StripeProvider {
        StripeProvider::new(StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            signature_tolerance_secs: 300,
        })
        .expect("provider init should succeed")
    }

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let sig = hmac_sha256_hex(&signed, secret).expect("hmac should compute");
        format!("t={},v1={}", timestamp, sig)
    }

    #[test]
    fn webhook_signature_validation_accepts_fresh_signature() {
        let provider = provider();
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = sign(payload, "whsec_test", now);
        let result = provider.check_signature(payload, &header, now);
        assert!(result.valid);
    }

    #[test]
    fn webhook_signature_validation_rejects_wrong_secret() {
        let provider = provider();
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = sign(payload, "whsec_other", now);
        let result = provider.check_signature(payload, &header, now);
        assert!(!result.valid);
    }

    #[test]
    fn webhook_signature_validation_rejects_stale_timestamp() {
        let provider = provider();
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = sign(payload, "whsec_test", now - 3600);
        let result = provider.check_signature(payload, &header, now);
        assert!(!result.valid);
        assert!(result
            .reason
            .as_deref()
            .unwrap_or("")
            .contains("tolerance"));
    }

    #[test]
    fn parse_webhook_event_extracts_session_completion() {
        let provider = provider();
        let payload = serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_456",
                    "payment_intent": "pi_789",
                    "payment_status": "paid",
                    "amount_total": 2500,
                    "currency": "eur"
                }
            }
        });
        let event = provider
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("event should parse");

        assert_eq!(event.event_id.as_deref(), Some("evt_123"));
        assert_eq!(event.provider_reference.as_deref(), Some("cs_test_456"));
        assert_eq!(event.status, Some(PaymentState::Succeeded));
        assert_eq!(event.amount.as_ref().map(|m| m.amount.as_str()), Some("25.00"));
    }
}
