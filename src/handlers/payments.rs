use crate::entities::payment_audit::AuditAction;
use crate::errors::ServiceError;
use crate::middleware_helpers::Caller;
use crate::services::payments::{
    AttemptResponse, CreateAttemptRequest, ReceiptUpload, ReviewOutcome, ReviewRequest,
    UploadReceiptResponse,
};
use crate::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Json, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub reason: String,
}

/// One audit row enriched with the actor's display name from the user
/// directory.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditRowView {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    #[schema(value_type = Option<String>, example = "500000")]
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/:id/payments", post(create_attempt))
        .route("/payments/:id", get(get_attempt))
        .route("/payments/:id/receipt", post(upload_receipt))
        .route("/payments/:id/review", post(review_payment))
        .route("/payments/:id/refund", post(refund_payment))
        .route("/payments/:id/audit", get(audit_trail))
}

/// Creates a payment attempt against an order the caller owns.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CreateAttemptRequest,
    responses(
        (status = 201, description = "Attempt created", body = crate::ApiResponse<AttemptResponse>),
        (status = 409, description = "Order does not accept payments", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_attempt(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CreateAttemptRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AttemptResponse>>), ServiceError> {
    let attempt = state
        .services
        .payments
        .create_attempt(order_id, caller.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(attempt))))
}

/// Fetches one payment attempt. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Attempt id")),
    responses(
        (status = 200, description = "The attempt"),
        (status = 404, description = "Unknown attempt", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_attempt(
    State(state): State<AppState>,
    caller: Caller,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AttemptResponse>>, ServiceError> {
    let attempt = state.services.payments.get_attempt(attempt_id).await?;
    caller.require_owner_or_admin(attempt.student_id)?;
    Ok(Json(ApiResponse::success(attempt.into())))
}

/// Uploads a bank-transfer receipt (multipart field `file`) and moves the
/// attempt to admin review.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/receipt",
    params(("id" = Uuid, Path, description = "Attempt id")),
    responses(
        (status = 200, description = "Receipt stored", body = crate::ApiResponse<UploadReceiptResponse>),
        (status = 400, description = "File rejected", body = crate::errors::ErrorResponse),
        (status = 409, description = "Attempt not receipt-eligible", body = crate::errors::ErrorResponse),
        (status = 429, description = "Too many uploads", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn upload_receipt(
    State(state): State<AppState>,
    caller: Caller,
    Path(attempt_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadReceiptResponse>>, ServiceError> {
    state
        .rate_limiter
        .check(&format!("receipt-upload:{}", caller.user_id))?;

    let mut upload: Option<ReceiptUpload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::ValidationError(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::ValidationError("file name is required".to_string()))?;
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::ValidationError(format!("failed to read file: {}", e)))?;
        upload = Some(ReceiptUpload {
            filename,
            content_type,
            bytes,
        });
    }

    let upload = upload.ok_or_else(|| {
        ServiceError::ValidationError("multipart field 'file' is required".to_string())
    })?;

    let response = state
        .services
        .payments
        .upload_receipt(attempt_id, caller.user_id, upload)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Admin decision on an attempt awaiting approval. The idempotency key is
/// taken from the `Idempotency-Key` header, falling back to the request body.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/review",
    params(("id" = Uuid, Path, description = "Attempt id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Decision applied (or replayed)", body = crate::ApiResponse<ReviewOutcome>),
        (status = 400, description = "Missing rejection reason", body = crate::errors::ErrorResponse),
        (status = 409, description = "Attempt not reviewable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn review_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
    Json(mut request): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<ReviewOutcome>>, ServiceError> {
    caller.require_admin()?;

    if let Some(key) = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        request.idempotency_key = Some(key);
    }

    let outcome = state
        .services
        .payments
        .review_payment(attempt_id, caller.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Refunds a paid attempt; admin only, reason mandatory.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Attempt id")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Attempt refunded"),
        (status = 409, description = "Attempt not refundable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(attempt_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<ApiResponse<AttemptResponse>>, ServiceError> {
    caller.require_admin()?;
    let attempt = state
        .services
        .payments
        .refund_payment(attempt_id, caller.user_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(attempt)))
}

/// Full audit trail of an attempt; admin only.
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/audit",
    params(("id" = Uuid, Path, description = "Attempt id")),
    responses((status = 200, description = "Audit rows, oldest first")),
    tag = "Payments"
)]
pub async fn audit_trail(
    State(state): State<AppState>,
    caller: Caller,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AuditRowView>>>, ServiceError> {
    caller.require_admin()?;
    let trail = state.services.payments.audit_trail(attempt_id).await?;

    let mut rows = Vec::with_capacity(trail.len());
    for entry in trail {
        let actor_name = match entry.actor_id {
            Some(actor_id) => state
                .services
                .directory
                .profile(actor_id)
                .await
                .map(|profile| profile.display_name),
            None => None,
        };
        rows.push(AuditRowView {
            id: entry.id,
            action: entry.action,
            actor_id: entry.actor_id,
            actor_name,
            from_status: entry.from_status,
            to_status: entry.to_status,
            amount: entry.amount,
            reason: entry.reason,
            created_at: entry.created_at,
        });
    }
    Ok(Json(ApiResponse::success(rows)))
}
