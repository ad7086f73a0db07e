use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Academy API",
        version = "0.3.0",
        description = r#"
# Academy purchase & enrollment API

The purchase-and-enrollment pipeline of the Academy course marketplace:
shopping carts, checkout, payment attempts with manual bank-transfer review,
and course enrollments with installment tracking.

## Identity

Requests are authenticated by the platform gateway, which injects
`X-User-Id` and `X-User-Roles` headers. The `admin` role is required for
review, refund and audit endpoints.

## Idempotency

`POST /payments/{id}/review` honours an `Idempotency-Key` header: repeating
the call with the same key returns the stored outcome without re-crediting
the enrollment.
"#
    ),
    paths(
        crate::handlers::carts::get_my_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::payments::create_attempt,
        crate::handlers::payments::get_attempt,
        crate::handlers::payments::upload_receipt,
        crate::handlers::payments::review_payment,
        crate::handlers::payments::refund_payment,
        crate::handlers::payments::audit_trail,
        crate::handlers::enrollments::list_my_enrollments,
        crate::handlers::enrollments::enrollment_status,
        crate::handlers::enrollments::enroll_free,
        crate::handlers::enrollments::list_installments,
        crate::handlers::enrollments::create_installment_plan,
        crate::handlers::enrollments::cancel_enrollment,
        crate::handlers::enrollments::complete_enrollment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::checkout::CheckoutOutcome,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderListResponse,
        crate::services::orders::CancelOrderRequest,
        crate::handlers::payments::AuditRowView,
        crate::services::payments::CreateAttemptRequest,
        crate::services::payments::ReviewRequest,
        crate::services::payments::ReviewOutcome,
        crate::services::payments::AttemptResponse,
        crate::services::payments::UploadReceiptResponse,
        crate::services::enrollments::EnrollmentStatusView,
        crate::services::enrollments::CreateInstallmentPlanRequest,
        crate::handlers::carts::AddToCartRequest,
        crate::handlers::payments::RefundRequest,
        crate::handlers::enrollments::FreeEnrollmentRequest,
        crate::handlers::enrollments::CancelEnrollmentRequest,
    )),
    tags(
        (name = "Carts", description = "Pre-checkout shopping carts"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Payment attempts and manual review"),
        (name = "Enrollments", description = "Course entitlements and installment plans"),
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
