use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, Money, PaymentState, ProviderName, WebhookEvent,
    WebhookVerification,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaypalConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: "https://api-m.paypal.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaypalConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let client_id =
            std::env::var("PAYPAL_CLIENT_ID").map_err(|_| PaymentError::ValidationError {
                message: "PAYPAL_CLIENT_ID environment variable is required".to_string(),
                field: Some("PAYPAL_CLIENT_ID".to_string()),
            })?;
        let client_secret =
            std::env::var("PAYPAL_CLIENT_SECRET").map_err(|_| PaymentError::ValidationError {
                message: "PAYPAL_CLIENT_SECRET environment variable is required".to_string(),
                field: Some("PAYPAL_CLIENT_SECRET".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("PAYPAL_BASE_URL")
                .unwrap_or_else(|_| "https://api-m.paypal.com".to_string()),
            timeout_secs: std::env::var("PAYPAL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYPAL_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            client_id,
            client_secret,
        })
    }
}

/// PayPal adapter: OAuth2 client-credentials token, then the Orders v2 API.
///
/// PayPal has no locally checkable webhook signature without a certificate
/// fetch, so webhook verification re-queries the referenced order
/// server-side before the event is trusted.
pub struct PaypalProvider {
    config: PaypalConfig,
    http: PaymentHttpClient,
}

impl PaypalProvider {
    pub fn new(config: PaypalConfig) -> PaymentResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(PaypalConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn access_token(&self) -> PaymentResult<String> {
        let response: PaypalTokenResponse = self
            .http
            .request_basic_form(
                &self.endpoint("/v1/oauth2/token"),
                &self.config.client_id,
                &self.config.client_secret,
                &[(
                    "grant_type".to_string(),
                    "client_credentials".to_string(),
                )],
            )
            .await?;

        Ok(response.access_token)
    }

    /// PayPal takes amounts as decimal strings with the currency's usual
    /// scale ("25.00").
    fn format_amount(amount: &Money) -> PaymentResult<String> {
        let parsed =
            BigDecimal::from_str(&amount.amount).map_err(|_| PaymentError::ValidationError {
                message: format!("invalid decimal amount: {}", amount.amount),
                field: Some("amount".to_string()),
            })?;
        Ok(parsed.with_scale(2).to_string())
    }

    async fn fetch_order(&self, order_id: &str) -> PaymentResult<PaypalOrder> {
        let token = self.access_token().await?;
        self.http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v2/checkout/orders/{}", order_id)),
                Some(&token),
                None,
                &[],
            )
            .await
    }

    fn map_order_status(status: Option<&str>) -> PaymentState {
        match status {
            Some("COMPLETED") => PaymentState::Succeeded,
            Some("CREATED") | Some("SAVED") | Some("APPROVED") | Some("PAYER_ACTION_REQUIRED") => {
                PaymentState::Pending
            }
            Some("VOIDED") => PaymentState::Failed,
            _ => PaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    async fn create_checkout(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        request.amount.validate_positive("amount")?;
        let value = Self::format_amount(&request.amount)?;
        let token = self.access_token().await?;

        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.reference,
                "description": request.description,
                "amount": {
                    "currency_code": request.amount.currency.to_uppercase(),
                    "value": value
                }
            }],
            "application_context": {
                "return_url": request.success_url,
                "cancel_url": request.cancel_url,
                "user_action": "PAY_NOW"
            }
        });

        let order: PaypalOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v2/checkout/orders"),
                Some(&token),
                Some(&body),
                &[],
            )
            .await?;

        let redirect_url = order
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
            .ok_or(PaymentError::ProviderError {
                provider: "paypal".to_string(),
                message: "order response has no approval link".to_string(),
                provider_code: None,
                retryable: false,
            })?;
        info!(reference = %order.id, "paypal order created");

        Ok(CheckoutSession {
            provider: ProviderName::Paypal,
            provider_reference: order.id.clone(),
            redirect_url,
            provider_data: Some(serde_json::json!({
                "status": order.status,
                "provider_reference": order.id
            })),
        })
    }

    async fn verify_payment(&self, provider_reference: &str) -> PaymentResult<PaymentState> {
        let order = self.fetch_order(provider_reference).await?;
        Ok(Self::map_order_status(order.status.as_deref()))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Paypal
    }

    /// Server-side verification: trust the event only if the order it names
    /// exists at PayPal and its status can be read back.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        _signature: &str,
    ) -> PaymentResult<WebhookVerification> {
        let event = self.parse_webhook_event(payload)?;
        let reference = match event.provider_reference {
            Some(reference) => reference,
            None => {
                return Ok(WebhookVerification {
                    valid: false,
                    reason: Some("event carries no order reference".to_string()),
                })
            }
        };

        match self.fetch_order(&reference).await {
            Ok(_) => Ok(WebhookVerification {
                valid: true,
                reason: None,
            }),
            Err(e) => {
                warn!(reference = %reference, error = %e, "paypal order lookup failed during webhook verification");
                Ok(WebhookVerification {
                    valid: false,
                    reason: Some(format!("order lookup failed: {}", e)),
                })
            }
        }
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let event_type = parsed
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event_id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());

        let resource = parsed.get("resource");
        // Capture events reference the order through supplementary_data;
        // order events carry the id directly.
        let provider_reference = resource
            .and_then(|r| {
                r.get("supplementary_data")
                    .and_then(|s| s.get("related_ids"))
                    .and_then(|ids| ids.get("order_id"))
                    .or_else(|| r.get("id"))
            })
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let amount = resource.and_then(|r| {
            let amount = r.get("amount")?;
            let value = amount.get("value").and_then(|v| v.as_str())?;
            let currency = amount.get("currency_code").and_then(|v| v.as_str())?;
            Some(Money::new(value, currency))
        });

        let status = match event_type.as_str() {
            "CHECKOUT.ORDER.APPROVED" => Some(PaymentState::Pending),
            "PAYMENT.CAPTURE.COMPLETED" | "CHECKOUT.ORDER.COMPLETED" => {
                Some(PaymentState::Succeeded)
            }
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => Some(PaymentState::Failed),
            "PAYMENT.CAPTURE.REFUNDED" => Some(PaymentState::Refunded),
            _ => None,
        };

        Ok(WebhookEvent {
            provider: ProviderName::Paypal,
            event_type,
            event_id,
            provider_reference,
            status,
            amount,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaypalTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaypalOrder {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<PaypalLink>,
}

#[derive(Debug, Deserialize)]
struct PaypalLink {
    rel: String,
    href: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> PaypalProvider {
        PaypalProvider::new(PaypalConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            base_url: "https://api-m.sandbox.paypal.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("provider init should succeed")
    }

    #[test]
    fn amount_is_formatted_with_two_decimals() {
        assert_eq!(
            PaypalProvider::format_amount(&Money::new("25", "EUR")).unwrap(),
            "25.00"
        );
        assert_eq!(
            PaypalProvider::format_amount(&Money::new("19.9", "EUR")).unwrap(),
            "19.90"
        );
        assert!(PaypalProvider::format_amount(&Money::new("abc", "EUR")).is_err());
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(
            PaypalProvider::map_order_status(Some("COMPLETED")),
            PaymentState::Succeeded
        );
        assert_eq!(
            PaypalProvider::map_order_status(Some("APPROVED")),
            PaymentState::Pending
        );
        assert_eq!(
            PaypalProvider::map_order_status(Some("VOIDED")),
            PaymentState::Failed
        );
        assert_eq!(
            PaypalProvider::map_order_status(None),
            PaymentState::Unknown
        );
    }

    #[test]
    fn parse_capture_completed_event() {
        let provider = provider();
        let payload = serde_json::json!({
            "id": "WH-58D329510W468432D-8HN650336L201105X",
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "42311647XV020574X",
                "amount": { "currency_code": "EUR", "value": "25.00" },
                "supplementary_data": {
                    "related_ids": { "order_id": "5O190127TN364715T" }
                }
            }
        });

        let event = provider
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("event should parse");

        assert_eq!(
            event.event_id.as_deref(),
            Some("WH-58D329510W468432D-8HN650336L201105X")
        );
        assert_eq!(event.provider_reference.as_deref(), Some("5O190127TN364715T"));
        assert_eq!(event.status, Some(PaymentState::Succeeded));
        assert_eq!(event.amount.as_ref().map(|m| m.amount.as_str()), Some("25.00"));
    }

    #[test]
    fn parse_order_approved_event_uses_resource_id() {
        let provider = provider();
        let payload = serde_json::json!({
            "id": "WH-1",
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": { "id": "5O190127TN364715T", "status": "APPROVED" }
        });

        let event = provider
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("event should parse");

        assert_eq!(event.provider_reference.as_deref(), Some("5O190127TN364715T"));
        assert_eq!(event.status, Some(PaymentState::Pending));
    }
}
