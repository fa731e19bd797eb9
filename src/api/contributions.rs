//! Contribution endpoints: create a pledge and open its checkout.
//!
//! Pledges are allowed without a session; whatever session is presented
//! just claims the pledge for that user.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::MaybeUser;
use crate::database::contribution_repository::Contribution;
use crate::error::AppResult;
use crate::middleware::rate_limit::client_key;
use crate::payments::types::{CheckoutSession, ProviderName};
use crate::services::contribution_lifecycle::CreateContributionInput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub contributor_name: String,
    pub amount: String,
    pub reward: Option<String>,
    pub is_public: bool,
    pub status: String,
    pub payment_method: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Contribution> for ContributionResponse {
    fn from(contribution: Contribution) -> Self {
        Self {
            id: contribution.id,
            book_id: contribution.book_id,
            contributor_name: contribution.contributor_name,
            amount: contribution.amount.to_string(),
            reward: contribution.reward,
            is_public: contribution.is_public,
            status: contribution.status,
            payment_method: contribution.payment_method,
            created_at: contribution.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionCheckoutResponse {
    pub provider: String,
    pub contribution_id: Uuid,
    pub redirect_url: String,
}

/// POST /api/contributions
pub async fn create_contribution(
    State(state): State<AppState>,
    user: MaybeUser,
    Json(payload): Json<CreateContributionInput>,
) -> AppResult<(StatusCode, Json<ContributionResponse>)> {
    let contributor = user
        .0
        .map(|claims| (claims.sub, claims.name));
    let contribution = state.contributions.create(contributor, payload).await?;
    Ok((StatusCode::CREATED, Json(contribution.into())))
}

/// POST /api/contributions/{id}/checkout/{provider}
pub async fn checkout_contribution(
    State(state): State<AppState>,
    user: MaybeUser,
    headers: axum::http::HeaderMap,
    Path((contribution_id, provider)): Path<(Uuid, String)>,
) -> AppResult<Json<ContributionCheckoutResponse>> {
    state
        .limiter
        .admit(
            "contributions:checkout",
            &client_key(&headers),
            state.rate_limits.payment_limit,
            Duration::from_secs(state.rate_limits.payment_window_secs),
        )
        .await?;

    let provider = ProviderName::from_str(&provider)?;
    let session: CheckoutSession = state
        .contributions
        .initiate_payment(
            contribution_id,
            user.0.map(|claims| (claims.sub, claims.email)),
            provider,
        )
        .await?;

    Ok(Json(ContributionCheckoutResponse {
        provider: session.provider.to_string(),
        contribution_id,
        redirect_url: session.redirect_url,
    }))
}
