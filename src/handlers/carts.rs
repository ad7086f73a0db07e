use crate::errors::ServiceError;
use crate::middleware_helpers::Caller;
use crate::services::carts::CartWithItems;
use crate::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub course_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/carts/me", get(get_my_cart))
        .route("/carts/me/items", post(add_item).delete(clear_cart))
        .route("/carts/me/items/:course_id", delete(remove_item))
}

/// Returns the caller's active cart with items.
#[utoipa::path(
    get,
    path = "/api/v1/carts/me",
    responses(
        (status = 200, description = "The caller's cart, empty when none exists"),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn get_my_cart(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Option<CartWithItems>>>, ServiceError> {
    let cart = state.services.carts.get_cart(caller.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Adds a course to the caller's cart (price snapshot taken now).
#[utoipa::path(
    post,
    path = "/api/v1/carts/me/items",
    request_body = AddToCartRequest,
    responses(
        (status = 201, description = "Course added; cart returned"),
        (status = 404, description = "Course not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_item(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartWithItems>>), ServiceError> {
    let cart = state
        .services
        .carts
        .add_course(caller.user_id, request.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(cart))))
}

/// Removes a course from the caller's cart.
#[utoipa::path(
    delete,
    path = "/api/v1/carts/me/items/{course_id}",
    params(("course_id" = Uuid, Path, description = "Course to remove")),
    responses(
        (status = 200, description = "Course removed; cart returned"),
        (status = 404, description = "Course not in cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    caller: Caller,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartWithItems>>, ServiceError> {
    let cart = state
        .services
        .carts
        .remove_course(caller.user_id, course_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Empties the caller's cart; succeeds even when already empty.
#[utoipa::path(
    delete,
    path = "/api/v1/carts/me/items",
    responses((status = 200, description = "Cart cleared")),
    tag = "Carts"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.carts.clear_cart(caller.user_id).await?;
    Ok(Json(ApiResponse::message((), "cart cleared")))
}
