use crate::payments::error::PaymentError;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// The three supported checkout providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Stripe,
    Paypal,
    Fedapay,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Stripe => "stripe",
            ProviderName::Paypal => "paypal",
            ProviderName::Fedapay => "fedapay",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stripe" => Ok(ProviderName::Stripe),
            "paypal" => Ok(ProviderName::Paypal),
            "fedapay" => Ok(ProviderName::Fedapay),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Payment method configured on an order or contribution.
///
/// Distinct from `ProviderName`: mobile money is presented to clients as a
/// method but is fulfilled by FedaPay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }

    /// The provider that fulfills this method
    pub fn provider(&self) -> ProviderName {
        match self {
            PaymentMethod::Stripe => ProviderName::Stripe,
            PaymentMethod::Paypal => ProviderName::Paypal,
            PaymentMethod::MobileMoney => ProviderName::Fedapay,
        }
    }

    /// Does the requested provider match this configured method?
    pub fn matches(&self, provider: ProviderName) -> bool {
        self.provider() == provider
    }

    /// Currency a checkout in this method is denominated in. Card and
    /// PayPal charge in euros; mobile money settles in CFA francs.
    pub fn checkout_currency(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe | PaymentMethod::Paypal => "EUR",
            PaymentMethod::MobileMoney => "XOF",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stripe" => Ok(PaymentMethod::Stripe),
            "paypal" => Ok(PaymentMethod::Paypal),
            "mobile_money" | "fedapay" => Ok(PaymentMethod::MobileMoney),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported payment method: {}", value),
                field: Some("payment_method".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn new(amount: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
        }
    }

    pub fn validate_positive(&self, field: &str) -> Result<(), PaymentError> {
        let parsed =
            BigDecimal::from_str(&self.amount).map_err(|_| PaymentError::ValidationError {
                message: format!("invalid decimal amount: {}", self.amount),
                field: Some(field.to_string()),
            })?;
        if parsed <= BigDecimal::from(0) {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }

    /// Convert to the provider's smallest currency unit.
    ///
    /// `exponent` is the number of decimal places the provider drops
    /// (2 for EUR/USD cents, 0 for XOF). Rounds half-up on sub-unit input.
    pub fn to_minor_units(&self, exponent: u32) -> Result<i64, PaymentError> {
        let parsed =
            BigDecimal::from_str(&self.amount).map_err(|_| PaymentError::ValidationError {
                message: format!("invalid decimal amount: {}", self.amount),
                field: Some("amount".to_string()),
            })?;
        let scaled = parsed * BigDecimal::from(10_i64.pow(exponent));
        scaled
            .with_scale_round(0, RoundingMode::HalfUp)
            .to_i64()
            .ok_or(PaymentError::ValidationError {
                message: format!("amount out of range: {}", self.amount),
                field: Some("amount".to_string()),
            })
    }
}

/// Where a payment attempt stands from the provider's point of view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Unknown,
}

/// What the lifecycle services hand an adapter to open a checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Money,
    pub description: String,
    /// Our reference (invoice number or contribution id), echoed back by
    /// the provider where its API supports it.
    pub reference: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// Provider-hosted payment handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub provider: ProviderName,
    /// Opaque reference; must be stored before the user is redirected so a
    /// webhook racing the HTTP response can still be matched.
    pub provider_reference: String,
    pub redirect_url: String,
    pub provider_data: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerification {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Normalized asynchronous provider event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: ProviderName,
    pub event_type: String,
    /// Provider-assigned event id; the ledger's dedup key when present
    pub event_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: Option<PaymentState>,
    pub amount: Option<Money>,
    pub payload: JsonValue,
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_parsing_works() {
        assert!(matches!(
            ProviderName::from_str("stripe"),
            Ok(ProviderName::Stripe)
        ));
        assert!(matches!(
            ProviderName::from_str("FedaPay"),
            Ok(ProviderName::Fedapay)
        ));
        assert!(ProviderName::from_str("unknown").is_err());
    }

    #[test]
    fn mobile_money_is_fulfilled_by_fedapay() {
        assert!(PaymentMethod::MobileMoney.matches(ProviderName::Fedapay));
        assert!(!PaymentMethod::MobileMoney.matches(ProviderName::Stripe));
        assert!(PaymentMethod::Paypal.matches(ProviderName::Paypal));
    }

    #[test]
    fn minor_unit_conversion_is_exact() {
        let money = Money::new("25.00", "EUR");
        assert_eq!(money.to_minor_units(2).unwrap(), 2500);

        let money = Money::new("19.99", "EUR");
        assert_eq!(money.to_minor_units(2).unwrap(), 1999);

        // XOF has no minor unit
        let money = Money::new("5000", "XOF");
        assert_eq!(money.to_minor_units(0).unwrap(), 5000);
    }

    #[test]
    fn minor_unit_conversion_rounds_half_up() {
        let money = Money::new("0.005", "EUR");
        assert_eq!(money.to_minor_units(2).unwrap(), 1);
    }

    #[test]
    fn negative_amount_rejected() {
        let money = Money::new("-10", "EUR");
        assert!(money.validate_positive("amount").is_err());
    }
}
