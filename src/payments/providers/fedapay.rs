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
pub struct FedapayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Maximum accepted age of the `t=` timestamp in a webhook signature
    pub signature_tolerance_secs: i64,
}

impl Default for FedapayConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            base_url: "https://api.fedapay.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            signature_tolerance_secs: 300,
        }
    }
}

impl FedapayConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("FEDAPAY_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "FEDAPAY_SECRET_KEY environment variable is required".to_string(),
                field: Some("FEDAPAY_SECRET_KEY".to_string()),
            })?;
        let webhook_secret =
            std::env::var("FEDAPAY_WEBHOOK_SECRET").map_err(|_| PaymentError::ValidationError {
                message: "FEDAPAY_WEBHOOK_SECRET environment variable is required".to_string(),
                field: Some("FEDAPAY_WEBHOOK_SECRET".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("FEDAPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.fedapay.com".to_string()),
            timeout_secs: std::env::var("FEDAPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("FEDAPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            signature_tolerance_secs: std::env::var("FEDAPAY_SIGNATURE_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(300),
            secret_key,
            webhook_secret,
        })
    }
}

/// FedaPay adapter for mobile-money checkouts.
///
/// Two-step flow: create the transaction, then generate a payment token
/// whose URL hosts the payment page. Amounts are whole XOF — the currency
/// has no minor unit.
pub struct FedapayProvider {
    config: FedapayConfig,
    http: PaymentHttpClient,
}

impl FedapayProvider {
    pub fn new(config: FedapayConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(FedapayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Check an `X-FEDAPAY-SIGNATURE` header (`t=<ts>,s=<hex>`) against the
    /// payload. The signed message is `<ts>.<payload>`.
    fn check_signature(&self, payload: &[u8], signature: &str, now: i64) -> WebhookVerification {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("s", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = match timestamp {
            Some(ts) => ts,
            None => {
                return WebhookVerification {
                    valid: false,
                    reason: Some("missing timestamp in fedapay signature".to_string()),
                }
            }
        };
        if signatures.is_empty() {
            return WebhookVerification {
                valid: false,
                reason: Some("no s signature found".to_string()),
            };
        }

        if (now - timestamp).abs() > self.config.signature_tolerance_secs {
            return WebhookVerification {
                valid: false,
                reason: Some("fedapay signature timestamp outside tolerance".to_string()),
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
                Some("invalid fedapay signature".to_string())
            },
        }
    }

    fn map_transaction_status(status: Option<&str>) -> PaymentState {
        match status {
            Some("approved") | Some("transferred") => PaymentState::Succeeded,
            Some("pending") | Some("created") => PaymentState::Pending,
            Some("declined") | Some("canceled") | Some("expired") => PaymentState::Failed,
            Some("refunded") => PaymentState::Refunded,
            _ => PaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentProvider for FedapayProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        request.amount.validate_positive("amount")?;
        // XOF has no minor unit; the adapter rounds to whole francs.
        let amount = request.amount.to_minor_units(0)?;

        let mut transaction_body = serde_json::json!({
            "description": request.description,
            "amount": amount,
            "currency": { "iso": request.amount.currency.to_uppercase() },
            "callback_url": request.success_url,
            "merchant_reference": request.reference,
        });
        if let Some(email) = &request.customer_email {
            transaction_body["customer"] = serde_json::json!({ "email": email });
        }

        let created: FedapayTransactionEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/transactions"),
                Some(&self.config.secret_key),
                Some(&transaction_body),
                &[],
            )
            .await?;
        let transaction = created.transaction;

        let token: FedapayTokenResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v1/transactions/{}/token", transaction.id)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;
        info!(reference = transaction.id, "fedapay transaction created");

        Ok(CheckoutSession {
            provider: ProviderName::Fedapay,
            provider_reference: transaction.id.to_string(),
            redirect_url: token.url,
            provider_data: Some(serde_json::json!({
                "token": token.token,
                "provider_reference": transaction.id.to_string()
            })),
        })
    }

    async fn verify_payment(&self, provider_reference: &str) -> PaymentResult<PaymentState> {
        let envelope: FedapayTransactionEnvelope = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/transactions/{}", provider_reference)),
                Some(&self.config.secret_key),
                None,
                &[],
            )
            .await?;

        Ok(Self::map_transaction_status(
            envelope.transaction.status.as_deref(),
        ))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Fedapay
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
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let entity = parsed.get("entity");
        let entity_id = entity
            .and_then(|e| e.get("id"))
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string());
        // FedaPay events have no separate event id; name + entity id is
        // stable across redeliveries of the same event.
        let event_id = entity_id
            .as_ref()
            .map(|id| format!("{}:{}", event_type, id));
        let amount = entity.and_then(|e| {
            let value = e.get("amount").and_then(|v| v.as_i64())?;
            let currency = e
                .get("currency")
                .and_then(|c| c.get("iso"))
                .and_then(|v| v.as_str())
                .unwrap_or("XOF");
            Some(Money::new(value.to_string(), currency))
        });
        let transaction_status = entity
            .and_then(|e| e.get("status"))
            .and_then(|v| v.as_str());

        let status = match event_type.as_str() {
            "transaction.approved" => Some(PaymentState::Succeeded),
            "transaction.declined" | "transaction.canceled" => Some(PaymentState::Failed),
            "transaction.refunded" => Some(PaymentState::Refunded),
            "transaction.updated" => Some(Self::map_transaction_status(transaction_status)),
            _ => None,
        };

        Ok(WebhookEvent {
            provider: ProviderName::Fedapay,
            event_type,
            event_id,
            provider_reference: entity_id,
            status,
            amount,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FedapayTransactionEnvelope {
    #[serde(rename = "v1/transaction")]
    transaction: FedapayTransaction,
}

#[derive(Debug, Deserialize)]
struct FedapayTransaction {
    id: i64,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FedapayTokenResponse {
    token: String,
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FedapayProvider {
        FedapayProvider::new(FedapayConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "wh_test".to_string(),
            base_url: "https://sandbox-api.fedapay.com".to_string(),
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
        format!("t={},s={}", timestamp, sig)
    }

    #[test]
    fn webhook_signature_validation_accepts_fresh_signature() {
        let provider = provider();
        let payload = br#"{"name":"transaction.approved"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = sign(payload, "wh_test", now);
        assert!(provider.check_signature(payload, &header, now).valid);
    }

    #[test]
    fn webhook_signature_validation_rejects_wrong_secret_and_stale_timestamp() {
        let provider = provider();
        let payload = br#"{"name":"transaction.approved"}"#;
        let now = chrono::Utc::now().timestamp();

        let wrong = sign(payload, "other", now);
        assert!(!provider.check_signature(payload, &wrong, now).valid);

        let stale = sign(payload, "wh_test", now - 3600);
        let result = provider.check_signature(payload, &stale, now);
        assert!(!result.valid);
        assert!(result.reason.as_deref().unwrap_or("").contains("tolerance"));
    }

    #[test]
    fn parse_webhook_event_extracts_approval() {
        let provider = provider();
        let payload = serde_json::json!({
            "name": "transaction.approved",
            "entity": {
                "id": 90871,
                "status": "approved",
                "amount": 5000,
                "currency": { "iso": "XOF" }
            }
        });

        let event = provider
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("event should parse");

        assert_eq!(
            event.event_id.as_deref(),
            Some("transaction.approved:90871")
        );
        assert_eq!(event.provider_reference.as_deref(), Some("90871"));
        assert_eq!(event.status, Some(PaymentState::Succeeded));
        assert_eq!(event.amount.as_ref().map(|m| m.amount.as_str()), Some("5000"));
    }

    #[test]
    fn transaction_status_mapping() {
        assert_eq!(
            FedapayProvider::map_transaction_status(Some("approved")),
            PaymentState::Succeeded
        );
        assert_eq!(
            FedapayProvider::map_transaction_status(Some("pending")),
            PaymentState::Pending
        );
        assert_eq!(
            FedapayProvider::map_transaction_status(Some("declined")),
            PaymentState::Failed
        );
    }

    #[test]
    fn whole_franc_amounts_are_preserved() {
        let money = Money::new("5000", "XOF");
        assert_eq!(money.to_minor_units(0).unwrap(), 5000);
    }
}
