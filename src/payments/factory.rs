use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::{FedapayProvider, PaypalProvider, StripeProvider};
use crate::payments::types::{PaymentMethod, ProviderName};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub default_provider: ProviderName,
    pub enabled_providers: Vec<ProviderName>,
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let default_provider =
            std::env::var("DEFAULT_PAYMENT_PROVIDER").unwrap_or_else(|_| "stripe".to_string());
        let default_provider = ProviderName::from_str(&default_provider)?;

        let enabled_raw = std::env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "stripe,paypal,fedapay".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            enabled_providers.push(ProviderName::from_str(value)?);
        }

        if !enabled_providers.contains(&default_provider) {
            return Err(PaymentError::ValidationError {
                message: "default provider must be enabled".to_string(),
                field: Some("DEFAULT_PAYMENT_PROVIDER".to_string()),
            });
        }

        Ok(Self {
            default_provider,
            enabled_providers,
        })
    }
}

/// Owns which providers are enabled and the method↔provider match rule.
///
/// Every place that needs a checkout adapter goes through here; no handler
/// compares provider strings directly.
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
}

impl PaymentProviderFactory {
    pub fn from_env() -> PaymentResult<Self> {
        let config = PaymentFactoryConfig::from_env()?;
        Ok(Self { config })
    }

    pub fn with_config(config: PaymentFactoryConfig) -> Self {
        Self { config }
    }

    pub fn get_provider(&self, provider: ProviderName) -> PaymentResult<Box<dyn PaymentProvider>> {
        if !self.config.enabled_providers.contains(&provider) {
            return Err(PaymentError::ValidationError {
                message: format!("provider {} is disabled", provider),
                field: Some("provider".to_string()),
            });
        }

        match provider {
            ProviderName::Stripe => Ok(Box::new(StripeProvider::from_env()?)),
            ProviderName::Paypal => Ok(Box::new(PaypalProvider::from_env()?)),
            ProviderName::Fedapay => Ok(Box::new(FedapayProvider::from_env()?)),
        }
    }

    pub fn get_default_provider(&self) -> PaymentResult<Box<dyn PaymentProvider>> {
        self.get_provider(self.config.default_provider)
    }

    /// The adapter fulfilling a configured payment method.
    pub fn provider_for_method(
        &self,
        method: PaymentMethod,
    ) -> PaymentResult<Box<dyn PaymentProvider>> {
        self.get_provider(method.provider())
    }

    /// Does the requested provider fulfil this record's configured method?
    pub fn method_matches(&self, method: PaymentMethod, provider: ProviderName) -> bool {
        method.matches(provider)
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        self.config.enabled_providers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> PaymentProviderFactory {
        PaymentProviderFactory::with_config(PaymentFactoryConfig {
            default_provider: ProviderName::Stripe,
            enabled_providers: vec![ProviderName::Stripe, ProviderName::Paypal],
        })
    }

    #[test]
    fn disabled_provider_is_rejected() {
        let factory = factory();
        assert!(factory.get_provider(ProviderName::Fedapay).is_err());
    }

    #[test]
    fn list_available_providers_returns_enabled() {
        let providers = factory().list_available_providers();
        assert_eq!(
            providers,
            vec![ProviderName::Stripe, ProviderName::Paypal]
        );
    }

    #[test]
    fn method_match_rule_is_centralized() {
        let factory = factory();
        assert!(factory.method_matches(PaymentMethod::Stripe, ProviderName::Stripe));
        assert!(factory.method_matches(PaymentMethod::MobileMoney, ProviderName::Fedapay));
        assert!(!factory.method_matches(PaymentMethod::Paypal, ProviderName::Stripe));
    }
}
