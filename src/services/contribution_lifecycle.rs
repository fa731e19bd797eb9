//! Crowdfunding pledge state machine
//!
//! Mirrors the order lifecycle with `pending -> paid -> refunded` and
//! `pending` as the only client-mutable source state. A pledge is bound to
//! one campaign book; settlement additionally moves the campaign's running
//! funded total, which the aggregator's denormalized reads use.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::database::book_repository::BookRepository;
use crate::database::contribution_repository::{Contribution, ContributionRepository};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::types::{
    CheckoutRequest, CheckoutSession, Money, PaymentMethod, PaymentState, ProviderName,
    WebhookEvent,
};
use crate::services::ledger::ReconciliationLedger;
use crate::services::notification::NotificationService;
use crate::services::order_lifecycle::SettleOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContributionInput {
    pub book_id: Uuid,
    pub amount: String,
    #[serde(default)]
    pub contributor_name: Option<String>,
    #[serde(default)]
    pub reward: Option<String>,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
    pub payment_method: String,
}

fn default_is_public() -> bool {
    true
}

pub struct ContributionLifecycleService {
    contributions: Arc<ContributionRepository>,
    books: Arc<BookRepository>,
    ledger: Arc<ReconciliationLedger>,
    providers: Arc<PaymentProviderFactory>,
    checkout: CheckoutConfig,
    notifications: Arc<NotificationService>,
}

impl ContributionLifecycleService {
    pub fn new(
        contributions: Arc<ContributionRepository>,
        books: Arc<BookRepository>,
        ledger: Arc<ReconciliationLedger>,
        providers: Arc<PaymentProviderFactory>,
        checkout: CheckoutConfig,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            contributions,
            books,
            ledger,
            providers,
            checkout,
            notifications,
        }
    }

    /// Persist a pledge in `pending` against a crowdfunding-enabled book.
    ///
    /// Pledges may be anonymous: `contributor` is whatever session was
    /// presented, and the public name falls back to "Anonyme".
    pub async fn create(
        &self,
        contributor: Option<(Uuid, String)>,
        input: CreateContributionInput,
    ) -> AppResult<Contribution> {
        let amount = BigDecimal::from_str(&input.amount)
            .map_err(|_| AppError::validation("amount", "must be a decimal number"))?;
        if amount <= BigDecimal::from(0) {
            return Err(AppError::validation("amount", "must be greater than zero"));
        }
        let payment_method = PaymentMethod::from_str(&input.payment_method)?;

        let book = self
            .books
            .find_by_id(input.book_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::BookNotFound {
                    book_id: input.book_id.to_string(),
                }))
            })?;
        if !book.crowdfunding_enabled {
            return Err(AppError::validation(
                "book_id",
                "book is not a crowdfunding campaign",
            ));
        }

        let (contributor_id, session_name) = match contributor {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };
        let contributor_name = input
            .contributor_name
            .filter(|name| !name.trim().is_empty())
            .or(session_name)
            .unwrap_or_else(|| "Anonyme".to_string());

        let contribution = self
            .contributions
            .create_contribution(
                book.id,
                contributor_id,
                &contributor_name,
                amount,
                input.reward.as_deref(),
                input.is_public,
                payment_method.as_str(),
            )
            .await?;
        info!(
            contribution_id = %contribution.id,
            book_id = %book.id,
            amount = %contribution.amount,
            "contribution created"
        );

        Ok(contribution)
    }

    /// Open a provider checkout for a pending pledge. Same reference-first
    /// discipline as orders: the provider reference lands on the row before
    /// the redirect URL is handed back.
    pub async fn initiate_payment(
        &self,
        contribution_id: Uuid,
        user: Option<(Uuid, String)>,
        provider: ProviderName,
    ) -> AppResult<CheckoutSession> {
        let contribution = self.find(contribution_id).await?;
        self.ensure_ownership(&contribution, user.as_ref().map(|(id, _)| *id))?;
        self.ensure_pending(&contribution, "only pending contributions can be paid")?;

        let method = PaymentMethod::from_str(&contribution.payment_method)?;
        if !self.providers.method_matches(method, provider) {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::PaymentMethodMismatch {
                    configured: contribution.payment_method.clone(),
                    requested: provider.to_string(),
                },
            )));
        }

        let amount = Money::new(
            contribution.amount.to_string(),
            method.checkout_currency(),
        );
        amount.validate_positive("amount")?;

        let book_title = self
            .books
            .find_by_id(contribution.book_id)
            .await?
            .map(|book| book.title)
            .unwrap_or_else(|| "campagne".to_string());

        let adapter = self.providers.get_provider(provider)?;
        let session = adapter
            .create_checkout(CheckoutRequest {
                amount: amount.clone(),
                description: format!("Contribution — {}", book_title),
                reference: contribution.id.to_string(),
                success_url: self.checkout.success_url.clone(),
                cancel_url: self.checkout.cancel_url.clone(),
                customer_email: user.map(|(_, email)| email),
                metadata: None,
            })
            .await?;

        let stored = self
            .contributions
            .set_payment_reference(contribution.id, &session.provider_reference)
            .await?;
        if stored == 0 {
            return Err(AppError::invalid_state(
                "contribution",
                "only pending contributions can be paid",
            ));
        }

        self.ledger
            .record_checkout_attempt(
                contribution.id,
                contribution.contributor_id,
                &session,
                &amount,
            )
            .await?;
        info!(
            contribution_id = %contribution.id,
            provider = %provider,
            reference = %session.provider_reference,
            "contribution checkout created"
        );

        Ok(session)
    }

    /// Apply a provider event to the pledge it references.
    ///
    /// On settlement the campaign's funded total moves with the pledge; a
    /// refund moves it back. Returns `None` when no contribution matches.
    pub async fn settle_from_event(
        &self,
        event: &WebhookEvent,
    ) -> AppResult<Option<SettleOutcome>> {
        let reference = match &event.provider_reference {
            Some(reference) => reference,
            None => return Ok(None),
        };
        let contribution = match self
            .contributions
            .find_by_provider_reference(reference)
            .await?
        {
            Some(contribution) => contribution,
            None => return Ok(None),
        };

        if let Some(event_id) = &event.event_id {
            if self.ledger.has_processed(event.provider, event_id).await? {
                info!(
                    contribution_id = %contribution.id,
                    event_id = %event_id,
                    "duplicate provider event, no-op"
                );
                return Ok(Some(SettleOutcome::Duplicate));
            }
        }
        self.ledger
            .record_webhook_event(event, Some(contribution.id))
            .await?;

        let transaction_id = event
            .payload
            .get("provider_transaction_id")
            .and_then(|v| v.as_str());
        match event.status {
            Some(PaymentState::Succeeded) => {
                let updated = self
                    .contributions
                    .mark_paid(contribution.id, transaction_id)
                    .await?;
                if updated == 1 {
                    self.books
                        .increment_funding(contribution.book_id, &contribution.amount)
                        .await?;
                    info!(
                        contribution_id = %contribution.id,
                        book_id = %contribution.book_id,
                        "contribution settled"
                    );
                    self.notifications.contribution_paid(&contribution);
                    Ok(Some(SettleOutcome::Settled))
                } else {
                    info!(
                        contribution_id = %contribution.id,
                        status = %contribution.status,
                        "settle lost the transition race, no-op"
                    );
                    Ok(Some(SettleOutcome::Ignored))
                }
            }
            Some(PaymentState::Refunded) => {
                let updated = self.contributions.mark_refunded(contribution.id).await?;
                if updated == 1 {
                    self.books
                        .increment_funding(contribution.book_id, &(-&contribution.amount))
                        .await?;
                    self.notifications.contribution_refunded(&contribution);
                    Ok(Some(SettleOutcome::Refunded))
                } else {
                    Ok(Some(SettleOutcome::Ignored))
                }
            }
            Some(PaymentState::Failed) => {
                warn!(
                    contribution_id = %contribution.id,
                    event_type = %event.event_type,
                    "contribution payment failed at provider"
                );
                Ok(Some(SettleOutcome::Ignored))
            }
            _ => Ok(Some(SettleOutcome::Ignored)),
        }
    }

    pub async fn find(&self, contribution_id: Uuid) -> AppResult<Contribution> {
        self.contributions
            .find_by_id(contribution_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::ContributionNotFound {
                    contribution_id: contribution_id.to_string(),
                }))
            })
    }

    /// A claimed pledge can only be driven by its contributor; anonymous
    /// pledges are open.
    fn ensure_ownership(
        &self,
        contribution: &Contribution,
        user_id: Option<Uuid>,
    ) -> AppResult<()> {
        if let Some(owner) = contribution.contributor_id {
            if user_id != Some(owner) {
                return Err(AppError::forbidden(
                    "contribution belongs to another user",
                ));
            }
        }
        Ok(())
    }

    fn ensure_pending(&self, contribution: &Contribution, message: &str) -> AppResult<()> {
        if contribution.status != "pending" {
            return Err(AppError::invalid_state("contribution", message));
        }
        Ok(())
    }
}
