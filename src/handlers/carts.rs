use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{cart, cart_item},
    errors::ServiceError,
    services::carts::AddCartItemInput,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveCartQuery {
    pub hotel_id: Option<Uuid>,
    pub table_number: Option<i32>,
}

async fn resolve_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ResolveCartQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let resolved = state
        .services
        .carts
        .resolve_cart(user.user_id, query.hotel_id, query.table_number)
        .await?;
    Ok(Json(ApiResponse::success(CartView {
        cart: resolved.cart,
        items: resolved.items,
    })))
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let resolved = state.services.carts.add_item(user.user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CartView {
            cart: resolved.cart,
            items: resolved.items,
        })),
    ))
}

async fn remove_item(
    State(state): State<AppState>,
    _user: AuthUser,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(cart_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/resolve", get(resolve_cart))
        .route("/items", post(add_item))
        .route("/:id/items/:item_id", delete(remove_item))
}
