use crate::errors::ServiceError;
use crate::middleware_helpers::Caller;
use crate::services::checkout::CheckoutOutcome;
use crate::services::orders::{self, CancelOrderRequest, OrderListResponse, OrderResponse};
use crate::services::payments::AttemptResponse;
use crate::ApiResponse;
use crate::AppState;
use crate::ListQuery;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub attempts: Vec<AttemptResponse>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
}

/// Converts the caller's active cart into an order with a frozen snapshot.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<CheckoutOutcome>),
        (status = 400, description = "Cart empty", body = crate::errors::ErrorResponse),
        (status = 409, description = "All courses already owned", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutOutcome>>), ServiceError> {
    let outcome = state.services.checkout.checkout(caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

/// Lists the caller's orders.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Paginated order list")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders_for_student(caller.user_id, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Fetches one order with its payment attempts. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with attempts"),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetailResponse>>, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    caller.require_owner_or_admin(order.student_id)?;

    let attempts = state
        .services
        .payments
        .list_for_order(order_id)
        .await?
        .into_iter()
        .map(AttemptResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(OrderDetailResponse {
        order: orders::model_to_response(order)?,
        attempts,
    })))
}

/// Cancels an order that has not completed. Owner or admin only.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 409, description = "Order not cancellable", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    caller.require_owner_or_admin(order.student_id)?;

    let cancelled = state
        .services
        .orders
        .cancel_order(order_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(orders::model_to_response(
        cancelled,
    )?)))
}
