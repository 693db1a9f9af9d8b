use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        order,
        order_item::{self, ItemStatus},
    },
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderListFilter, OrderListSummary},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub summary: OrderListSummary,
}

#[derive(Debug, Deserialize)]
pub struct PayForItemsRequest {
    pub item_ids: Vec<Uuid>,
    pub payment_method: order::PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct ManualPaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: order::OrderStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
}

async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let assembled = state
        .services
        .orders
        .create_order(user.user_id, payload)
        .await?;

    let status = if assembled.merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(ApiResponse::success(OrderView {
            order: assembled.order,
            items: assembled.items,
        })),
    ))
}

async fn list_orders(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = pagination.page.unwrap_or(1).max(1);
    let per_page = pagination.limit.unwrap_or(20).clamp(1, 100);

    let (orders, total, summary) = state
        .services
        .orders
        .list_orders(filter, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        OrderListResponse { orders, summary },
        total,
        page,
        per_page,
    ))))
}

async fn get_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(OrderView { order, items })))
}

async fn pay_for_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<PayForItemsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state
        .services
        .payments
        .pay_for_items(order_id, &payload.item_ids, user.user_id, payload.payment_method)
        .await?;
    Ok(Json(ApiResponse::success(OrderView { order, items })))
}

async fn manual_payment(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ManualPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .payments
        .record_manual_payment(order_id, payload.amount)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn complete_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.complete_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn update_order_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(order_id, payload.status, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn update_item_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateItemStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .orders
        .update_item_status(order_id, item_id, payload.status)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

async fn delete_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).delete(delete_order))
        .route("/:id/pay-for-items", post(pay_for_items))
        .route("/:id/manual-payment", post(manual_payment))
        .route("/:id/complete", post(complete_order))
        .route("/:id/status", patch(update_order_status))
        .route("/:id/items/:item_id/status", patch(update_item_status))
}
