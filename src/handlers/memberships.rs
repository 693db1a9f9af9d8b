use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        membership_history,
        user_membership::{self, MembershipStatus},
    },
    errors::ServiceError,
    services::memberships::{ConsumeMealsRequest, CreateMembershipRequest},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Serialize)]
pub struct MembershipView {
    #[serde(flatten)]
    pub membership: user_membership::Model,
    pub history: Vec<membership_history::Model>,
}

#[derive(Debug, Deserialize)]
pub struct MembershipListFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<MembershipStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusNote {
    pub note: Option<String>,
}

async fn create_membership(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<CreateMembershipRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let membership = state.services.memberships.create_membership(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(membership))))
}

async fn get_membership(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(membership_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (membership, history) = state
        .services
        .memberships
        .get_membership(membership_id)
        .await?;
    Ok(Json(ApiResponse::success(MembershipView {
        membership,
        history,
    })))
}

async fn list_memberships(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<MembershipListFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = pagination.page.unwrap_or(1).max(1);
    let per_page = pagination.limit.unwrap_or(20).clamp(1, 100);

    let (memberships, total) = state
        .services
        .memberships
        .list_memberships(filter.user_id, filter.status, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        memberships,
        total,
        page,
        per_page,
    ))))
}

async fn consume_meals(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(membership_id): Path<Uuid>,
    Json(payload): Json<ConsumeMealsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let membership = state
        .services
        .memberships
        .consume_meals(membership_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

async fn hold_membership(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(membership_id): Path<Uuid>,
    Json(payload): Json<StatusNote>,
) -> Result<impl IntoResponse, ServiceError> {
    let membership = state
        .services
        .memberships
        .hold(membership_id, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

async fn resume_membership(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(membership_id): Path<Uuid>,
    Json(payload): Json<StatusNote>,
) -> Result<impl IntoResponse, ServiceError> {
    let membership = state
        .services
        .memberships
        .resume(membership_id, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

async fn cancel_membership(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(membership_id): Path<Uuid>,
    Json(payload): Json<StatusNote>,
) -> Result<impl IntoResponse, ServiceError> {
    let membership = state
        .services
        .memberships
        .cancel(membership_id, payload.note)
        .await?;
    Ok(Json(ApiResponse::success(membership)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_membership).get(list_memberships))
        .route("/:id", get(get_membership))
        .route("/:id/consume", post(consume_meals))
        .route("/:id/hold", post(hold_membership))
        .route("/:id/resume", post(resume_membership))
        .route("/:id/cancel", post(cancel_membership))
}
