//! Provider webhook intake.
//!
//! Order of operations per delivery: verify the provider signature on the
//! raw body, parse the event, let the lifecycle services dedupe against the
//! ledger and apply the transition. Duplicates, lost races and events that
//! match nothing all answer 200 — a non-2xx would put the provider into a
//! retry loop and amplify the race the conditional updates already decided.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::str::FromStr;
use tracing::{info, warn};

use crate::api::AppState;
use crate::payments::types::ProviderName;
use crate::services::SettleOutcome;

/// POST /api/webhooks/{provider}
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(provider = %provider, "received webhook");

    let provider = match ProviderName::from_str(&provider) {
        Ok(provider) => provider,
        Err(_) => {
            warn!(provider = %provider, "webhook for unknown provider");
            return (StatusCode::NOT_FOUND, "Unknown provider").into_response();
        }
    };

    let signature = signature_header(provider, &headers);
    let signature = match signature {
        Some(signature) => signature,
        None if provider == ProviderName::Paypal => String::new(),
        None => {
            warn!(provider = %provider, "missing webhook signature");
            return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
        }
    };

    let adapter = match state.providers.get_provider(provider) {
        Ok(adapter) => adapter,
        Err(e) => {
            warn!(provider = %provider, error = %e, "provider unavailable for webhook");
            return (StatusCode::SERVICE_UNAVAILABLE, "Provider unavailable").into_response();
        }
    };

    match adapter.verify_webhook(&body, &signature).await {
        Ok(verification) if verification.valid => {}
        Ok(verification) => {
            warn!(
                provider = %provider,
                reason = verification.reason.as_deref().unwrap_or("unknown"),
                "invalid webhook signature"
            );
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "webhook verification failed");
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
    }

    let event = match adapter.parse_webhook_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(provider = %provider, error = %e, "unparsable webhook payload");
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    // Try orders first, then contributions; the reference matches exactly
    // one of them.
    let outcome = match state.orders.settle_from_event(&event).await {
        Ok(Some(outcome)) => Some(outcome),
        Ok(None) => match state.contributions.settle_from_event(&event).await {
            Ok(outcome) => outcome,
            Err(e) => return e.into_response(),
        },
        Err(e) => return e.into_response(),
    };

    match outcome {
        Some(SettleOutcome::Settled) | Some(SettleOutcome::Refunded) => {
            info!(provider = %provider, event_type = %event.event_type, "webhook applied");
        }
        Some(SettleOutcome::Duplicate) => {
            info!(provider = %provider, event_type = %event.event_type, "duplicate webhook, no-op");
        }
        Some(SettleOutcome::Ignored) => {
            info!(provider = %provider, event_type = %event.event_type, "webhook recorded, no transition");
        }
        None => {
            // Keep the delivery for audit even when nothing matches.
            warn!(
                provider = %provider,
                event_type = %event.event_type,
                reference = event.provider_reference.as_deref().unwrap_or("-"),
                "webhook matches no order or contribution"
            );
            if let Err(e) = state.ledger.record_webhook_event(&event, None).await {
                return e.into_response();
            }
        }
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

fn signature_header(
    provider: ProviderName,
    headers: &axum::http::HeaderMap,
) -> Option<String> {
    let name = match provider {
        ProviderName::Stripe => "stripe-signature",
        ProviderName::Fedapay => "x-fedapay-signature",
        ProviderName::Paypal => "paypal-transmission-sig",
    };
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_header_lookup_is_per_provider() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("stripe-signature", "t=1,v1=abc".parse().unwrap());
        headers.insert("x-fedapay-signature", "t=1,s=def".parse().unwrap());

        assert_eq!(
            signature_header(ProviderName::Stripe, &headers).as_deref(),
            Some("t=1,v1=abc")
        );
        assert_eq!(
            signature_header(ProviderName::Fedapay, &headers).as_deref(),
            Some("t=1,s=def")
        );
        assert!(signature_header(ProviderName::Paypal, &headers).is_none());
    }
}
