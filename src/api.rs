//! HTTP surface over the engine services.
//!
//! Tenant and actor come from the `x-tenant-id` and `x-actor` headers;
//! authenticating them is the job of whatever sits in front of this service.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::context::{Actor, RequestContext};
use crate::domain::{OrderStatus, TenantId};
use crate::services::{Commerce, CreateOrder, NewDiscountCode, NewGoal, NewProduct, TrackCart, Window};
use crate::store::{OrderDetails, OrderFilter};
use crate::CommerceError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor";

#[derive(Clone)]
pub struct AppState {
    pub commerce: Commerce,
}

type ApiResult<T> = Result<T, CommerceError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront-commerce"})) }))
        .route("/api/v1/products", post(create_product))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/:id", get(get_order).patch(update_order_details).delete(delete_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/discounts", post(create_discount))
        .route("/api/v1/discounts/validate", post(validate_discount))
        .route("/api/v1/carts/abandoned", get(list_carts).post(track_cart))
        .route("/api/v1/carts/stats", get(cart_stats))
        .route("/api/v1/goals", post(create_goal))
        .route("/api/v1/analytics", get(analytics))
        .with_state(state)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        let tenant_id = header(TENANT_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(TenantId::new)
            .ok_or_else(|| CommerceError::Validation(format!("missing or malformed {TENANT_HEADER} header")))?;
        let actor = match header(ACTOR_HEADER).map(str::to_ascii_lowercase).as_deref() {
            None | Some("storefront") => Actor::Storefront,
            Some("seller") => Actor::Seller,
            Some(other) => return Err(CommerceError::Validation(format!("unknown actor: {other}"))),
        };
        Ok(RequestContext::new(tenant_id, actor))
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            CommerceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            CommerceError::Stock { .. } => (StatusCode::CONFLICT, "stock"),
            CommerceError::Discount(_) => (StatusCode::UNPROCESSABLE_ENTITY, "discount"),
            CommerceError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            CommerceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            CommerceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CommerceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            CommerceError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let reason = match &self {
            CommerceError::Discount(r) => Some(r.code()),
            _ => None,
        };
        (status, Json(json!({"error": self.to_string(), "kind": kind, "reason": reason, "retryable": self.is_retryable()}))).into_response()
    }
}

async fn create_product(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<NewProduct>) -> ApiResult<impl IntoResponse> {
    let product = s.commerce.catalog.add_product(&ctx, r).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn create_order(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<CreateOrder>) -> ApiResult<impl IntoResponse> {
    let order = s.commerce.ledger.create_order(&ctx, r).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_deleted: bool,
}

async fn list_orders(State(s): State<AppState>, ctx: RequestContext, Query(p): Query<ListParams>) -> ApiResult<impl IntoResponse> {
    let filter = OrderFilter { status: p.status, created_from: p.from, created_to: p.to, include_deleted: p.include_deleted };
    let orders = s.commerce.ledger.list_orders(&ctx, &filter).await?;
    Ok(Json(json!({"data": orders, "total": orders.len()})))
}

async fn get_order(State(s): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.ledger.get_order(&ctx, id).await?))
}

async fn update_order_details(State(s): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>, Json(r): Json<OrderDetails>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.ledger.update_order_details(&ctx, id, r).await?))
}

async fn delete_order(State(s): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.commerce.ledger.soft_delete_order(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest { pub status: OrderStatus }

async fn update_order_status(State(s): State<AppState>, ctx: RequestContext, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.ledger.update_order_status(&ctx, id, r.status).await?))
}

async fn create_discount(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<NewDiscountCode>) -> ApiResult<impl IntoResponse> {
    let code = s.commerce.discounts.add_code(&ctx, r).await?;
    Ok((StatusCode::CREATED, Json(code)))
}

#[derive(Debug, Deserialize)]
pub struct ValidateDiscountRequest { pub code: String, pub subtotal: Decimal }

async fn validate_discount(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<ValidateDiscountRequest>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.discounts.validate(&ctx, &r.code, r.subtotal).await?))
}

async fn track_cart(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<TrackCart>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.carts.track(&ctx, r).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CartParams {
    #[serde(default)]
    pub include_recovered: bool,
}

async fn list_carts(State(s): State<AppState>, ctx: RequestContext, Query(p): Query<CartParams>) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.carts.list(&ctx, p.include_recovered).await?))
}

async fn cart_stats(State(s): State<AppState>, ctx: RequestContext) -> ApiResult<impl IntoResponse> {
    Ok(Json(s.commerce.carts.stats(&ctx).await?))
}

async fn create_goal(State(s): State<AppState>, ctx: RequestContext, Json(r): Json<NewGoal>) -> ApiResult<impl IntoResponse> {
    let goal = s.commerce.analytics.add_goal(&ctx, r).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams { pub window: Option<Window> }

async fn analytics(State(s): State<AppState>, ctx: RequestContext, Query(p): Query<AnalyticsParams>) -> impl IntoResponse {
    Json(s.commerce.analytics.report(&ctx, p.window.unwrap_or_default()).await)
}
