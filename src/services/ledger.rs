//! Payment reconciliation ledger
//!
//! One entry per payment attempt and per provider event. The storage-level
//! unique index on (provider, provider_event_id) makes `record_webhook_event`
//! an at-most-once operation even under concurrent redelivery;
//! `has_processed` is the cheaper pre-check callers run first. Nothing is
//! ever deleted — the same rows back the admin audit listing.

use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::ledger_repository::{LedgerEntry, LedgerRepository, NewLedgerEntry};
use crate::error::AppResult;
use crate::payments::types::{CheckoutSession, Money, PaymentState, ProviderName, WebhookEvent};

pub struct ReconciliationLedger {
    repo: Arc<LedgerRepository>,
}

impl ReconciliationLedger {
    pub fn new(repo: Arc<LedgerRepository>) -> Self {
        Self { repo }
    }

    /// Has this provider event already been recorded?
    pub async fn has_processed(
        &self,
        provider: ProviderName,
        provider_event_id: &str,
    ) -> AppResult<bool> {
        Ok(self
            .repo
            .has_processed(provider.as_str(), provider_event_id)
            .await?)
    }

    /// Log an outbound checkout attempt (no event id; always inserts).
    pub async fn record_checkout_attempt(
        &self,
        related_id: Uuid,
        user_id: Option<Uuid>,
        session: &CheckoutSession,
        amount: &Money,
    ) -> AppResult<LedgerEntry> {
        let entry = NewLedgerEntry {
            related_id: Some(related_id),
            user_id,
            provider: session.provider.as_str(),
            kind: "payment",
            provider_event_id: None,
            provider_reference: Some(&session.provider_reference),
            status: "pending",
            amount: parse_amount(&amount.amount),
            currency: Some(&amount.currency),
            raw_payload: session.provider_data.clone().unwrap_or(serde_json::json!({})),
        };

        Ok(self.repo.record(entry).await?)
    }

    /// Log an inbound provider event.
    ///
    /// With an event id present this upserts on (provider, event id): the
    /// first delivery inserts, a replay updates the same row. The caller
    /// still sees exactly one ledger row per event.
    pub async fn record_webhook_event(
        &self,
        event: &WebhookEvent,
        related_id: Option<Uuid>,
    ) -> AppResult<LedgerEntry> {
        let kind = match event.status {
            Some(PaymentState::Refunded) => "refund",
            _ => "webhook",
        };
        let entry = NewLedgerEntry {
            related_id,
            user_id: None,
            provider: event.provider.as_str(),
            kind,
            provider_event_id: event.event_id.as_deref(),
            provider_reference: event.provider_reference.as_deref(),
            status: ledger_status(event.status),
            amount: event
                .amount
                .as_ref()
                .and_then(|money| parse_amount(&money.amount)),
            currency: event.amount.as_ref().map(|money| money.currency.as_str()),
            raw_payload: event.payload.clone(),
        };

        Ok(self.repo.record(entry).await?)
    }

    /// Audit listing, newest first
    pub async fn list_recent(&self, limit: i64) -> AppResult<Vec<LedgerEntry>> {
        Ok(self.repo.list_recent(limit).await?)
    }

    /// Full audit trail for one order or contribution
    pub async fn list_for_related(&self, related_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
        Ok(self.repo.list_for_related(related_id).await?)
    }
}

fn ledger_status(state: Option<PaymentState>) -> &'static str {
    match state {
        Some(PaymentState::Succeeded) | Some(PaymentState::Refunded) => "succeeded",
        Some(PaymentState::Failed) => "failed",
        _ => "pending",
    }
}

fn parse_amount(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_status_maps_provider_states() {
        assert_eq!(ledger_status(Some(PaymentState::Succeeded)), "succeeded");
        assert_eq!(ledger_status(Some(PaymentState::Refunded)), "succeeded");
        assert_eq!(ledger_status(Some(PaymentState::Failed)), "failed");
        assert_eq!(ledger_status(Some(PaymentState::Pending)), "pending");
        assert_eq!(ledger_status(None), "pending");
    }

    #[test]
    fn amounts_parse_or_drop() {
        assert_eq!(parse_amount("25.00"), Some(BigDecimal::from(25)));
        assert!(parse_amount("not-a-number").is_none());
    }
}
