//! Order endpoints: create, inspect, cancel, retry, checkout.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::database::order_repository::Order;
use crate::error::AppResult;
use crate::middleware::rate_limit::client_key;
use crate::payments::types::{CheckoutSession, ProviderName};
use crate::services::order_lifecycle::CreateOrderInput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub status: String,
    pub sale_type: String,
    pub payment_method: String,
    pub total: String,
    pub items: serde_json::Value,
    pub promo_code: Option<String>,
    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            invoice_number: order.invoice_number,
            status: order.status,
            sale_type: order.sale_type,
            payment_method: order.payment_method,
            total: order.total.to_string(),
            items: order.items,
            promo_code: order.promo_code,
            paid_at: order.paid_at,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub provider: String,
    pub order_id: Uuid,
    pub redirect_url: String,
}

impl CheckoutResponse {
    fn new(order_id: Uuid, session: CheckoutSession) -> Self {
        Self {
            provider: session.provider.to_string(),
            order_id,
            redirect_url: session.redirect_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderResponse>)> {
    let order = state.orders.create(user.claims.sub, payload).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<OrderResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let orders = state.orders.list_for_owner(user.claims.sub, limit).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderResponse>> {
    let order = state.orders.find(order_id).await?;
    if order.owner_id != user.claims.sub && !user.is_admin() {
        return Err(crate::error::AppError::forbidden(
            "order belongs to another user",
        ));
    }
    Ok(Json(order.into()))
}

/// POST /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderResponse>> {
    let order = state.orders.cancel(order_id, user.claims.sub).await?;
    Ok(Json(order.into()))
}

/// POST /api/orders/{id}/checkout/{provider}
pub async fn checkout_order(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: axum::http::HeaderMap,
    Path((order_id, provider)): Path<(Uuid, String)>,
) -> AppResult<Json<CheckoutResponse>> {
    state
        .limiter
        .admit(
            "orders:checkout",
            &client_key(&headers),
            state.rate_limits.payment_limit,
            Duration::from_secs(state.rate_limits.payment_window_secs),
        )
        .await?;

    let provider = ProviderName::from_str(&provider)?;
    let session = state
        .orders
        .initiate_payment(order_id, user.claims.sub, &user.claims.email, provider)
        .await?;
    Ok(Json(CheckoutResponse::new(order_id, session)))
}

/// POST /api/orders/{id}/retry-payment
pub async fn retry_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: axum::http::HeaderMap,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<CheckoutResponse>> {
    state
        .limiter
        .admit(
            "orders:checkout",
            &client_key(&headers),
            state.rate_limits.payment_limit,
            Duration::from_secs(state.rate_limits.payment_window_secs),
        )
        .await?;

    let session = state
        .orders
        .retry_payment(order_id, user.claims.sub, &user.claims.email)
        .await?;
    Ok(Json(CheckoutResponse::new(order_id, session)))
}
