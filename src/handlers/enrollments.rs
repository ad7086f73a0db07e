use crate::entities::{EnrollmentModel, InstallmentPaymentModel};
use crate::errors::ServiceError;
use crate::middleware_helpers::Caller;
use crate::services::enrollments::{CreateInstallmentPlanRequest, EnrollmentStatusView};
use crate::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FreeEnrollmentRequest {
    pub course_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelEnrollmentRequest {
    pub reason: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments/me", get(list_my_enrollments))
        .route("/enrollments/status/:course_id", get(enrollment_status))
        .route("/enrollments/free", post(enroll_free))
        .route("/enrollments/:id/installments", get(list_installments))
        .route(
            "/enrollments/:id/installment-plan",
            post(create_installment_plan),
        )
        .route("/enrollments/:id/cancel", post(cancel_enrollment))
        .route("/enrollments/:id/complete", post(complete_enrollment))
}

/// Lists the caller's enrollments.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments/me",
    responses((status = 200, description = "The caller's enrollments")),
    tag = "Enrollments"
)]
pub async fn list_my_enrollments(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<EnrollmentModel>>>, ServiceError> {
    let enrollments = state
        .services
        .enrollments
        .list_for_student(caller.user_id)
        .await?;
    Ok(Json(ApiResponse::success(enrollments)))
}

/// Reports whether the caller owns a course and the remaining balance.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments/status/{course_id}",
    params(("course_id" = Uuid, Path, description = "Course id")),
    responses((status = 200, description = "Enrollment standing", body = crate::ApiResponse<EnrollmentStatusView>)),
    tag = "Enrollments"
)]
pub async fn enrollment_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EnrollmentStatusView>>, ServiceError> {
    let status = state
        .services
        .enrollments
        .get_status(caller.user_id, course_id)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Direct enrollment into a zero-price course, bypassing checkout.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/free",
    request_body = FreeEnrollmentRequest,
    responses(
        (status = 201, description = "Enrollment created"),
        (status = 400, description = "Course is not free", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already enrolled", body = crate::errors::ErrorResponse)
    ),
    tag = "Enrollments"
)]
pub async fn enroll_free(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<FreeEnrollmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<EnrollmentModel>>), ServiceError> {
    let enrollment = state
        .services
        .enrollments
        .enroll_free(caller.user_id, request.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(enrollment))))
}

/// Lists an enrollment's installment schedule. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments/{id}/installments",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    responses((status = 200, description = "Installments in schedule order")),
    tag = "Enrollments"
)]
pub async fn list_installments(
    State(state): State<AppState>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<InstallmentPaymentModel>>>, ServiceError> {
    let enrollment = state
        .services
        .enrollments
        .get_enrollment(enrollment_id)
        .await?;
    caller.require_owner_or_admin(enrollment.student_id)?;

    let installments = state
        .services
        .enrollments
        .list_installments(enrollment_id)
        .await?;
    Ok(Json(ApiResponse::success(installments)))
}

/// Creates an installment plan for an enrollment the caller owns.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/installment-plan",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    request_body = CreateInstallmentPlanRequest,
    responses(
        (status = 201, description = "Plan created"),
        (status = 409, description = "Plan already exists or enrollment settled", body = crate::errors::ErrorResponse)
    ),
    tag = "Enrollments"
)]
pub async fn create_installment_plan(
    State(state): State<AppState>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
    Json(request): Json<CreateInstallmentPlanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<InstallmentPaymentModel>>>), ServiceError> {
    let enrollment = state
        .services
        .enrollments
        .get_enrollment(enrollment_id)
        .await?;
    caller.require_owner_or_admin(enrollment.student_id)?;

    let installments = state
        .services
        .enrollments
        .create_installment_plan(enrollment_id, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(installments)),
    ))
}

/// Cancels an enrollment; admin only, reason mandatory.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/cancel",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    request_body = CancelEnrollmentRequest,
    responses(
        (status = 200, description = "Enrollment cancelled"),
        (status = 400, description = "Missing reason", body = crate::errors::ErrorResponse)
    ),
    tag = "Enrollments"
)]
pub async fn cancel_enrollment(
    State(state): State<AppState>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
    Json(request): Json<CancelEnrollmentRequest>,
) -> Result<Json<ApiResponse<EnrollmentModel>>, ServiceError> {
    caller.require_admin()?;
    let enrollment = state
        .services
        .enrollments
        .cancel_enrollment(enrollment_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(enrollment)))
}

/// Marks an enrollment completed; admin only.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/complete",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    responses((status = 200, description = "Enrollment completed")),
    tag = "Enrollments"
)]
pub async fn complete_enrollment(
    State(state): State<AppState>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<EnrollmentModel>>, ServiceError> {
    caller.require_admin()?;
    let enrollment = state
        .services
        .enrollments
        .complete_enrollment(enrollment_id)
        .await?;
    Ok(Json(ApiResponse::success(enrollment)))
}
