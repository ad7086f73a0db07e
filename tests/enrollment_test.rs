//! Enrollment accounting scenarios: free enrollment, installment plans and
//! their consistency invariant, and enrollment lifecycle transitions.

mod common;

use axum::http::Method;
use common::{response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn free_course_enrolls_immediately_without_payment() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(0), false);

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/enrollments/free",
            Some(json!({ "course_id": course })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total_amount"], "0");
    assert_eq!(body["data"]["paid_amount"], "0");
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["status"], "active");

    // Enrolling again is a duplicate.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/enrollments/free",
            Some(json!({ "course_id": course })),
        )
        .await;
    assert_eq!(response.status(), 409);

    // A paid course cannot use the free path.
    let paid = app.seed_course(dec!(100000), false);
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/enrollments/free",
            Some(json!({ "course_id": paid })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn status_endpoint_reports_remaining_balance() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(500000), false);

    // Before anything: not enrolled.
    let response = app
        .request_as(
            student,
            "",
            Method::GET,
            &format!("/api/v1/enrollments/status/{}", course),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["enrolled"], false);

    // Partially pay through the pipeline.
    app.request_as(
        student,
        "",
        Method::POST,
        "/api/v1/carts/me/items",
        Some(json!({ "course_id": course })),
    )
    .await;
    let response = app
        .request_as(student, "", Method::POST, "/api/v1/checkout", None)
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order"]["id"].as_str().expect("id").to_string();

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual", "amount": "200000" })),
        )
        .await;
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");
    app.upload_receipt(student, attempt_id, "r.jpg", "image/jpeg", b"jpeg")
        .await;
    let admin = Uuid::new_v4();
    app.request_as(
        admin,
        "admin",
        Method::POST,
        &format!("/api/v1/payments/{}/review", attempt_id),
        Some(json!({ "approve": true })),
    )
    .await;

    let response = app
        .request_as(
            student,
            "",
            Method::GET,
            &format!("/api/v1/enrollments/status/{}", course),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["enrolled"], true);
    assert_eq!(body["data"]["payment_status"], "partial");
    assert_eq!(body["data"]["remaining_amount"], "300000");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn installment_plan_divides_total_and_tracks_payments() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(900000), true);
    let admin = Uuid::new_v4();

    // Enroll with a partial payment of 300k out of 900k.
    app.request_as(
        student,
        "",
        Method::POST,
        "/api/v1/carts/me/items",
        Some(json!({ "course_id": course })),
    )
    .await;
    let response = app
        .request_as(student, "", Method::POST, "/api/v1/checkout", None)
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order"]["id"].as_str().expect("id").to_string();

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual", "amount": "300000" })),
        )
        .await;
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");
    app.upload_receipt(student, attempt_id, "r.jpg", "image/jpeg", b"jpeg")
        .await;
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    let body = response_json(response).await;
    let enrollment_id = body["data"]["enrollment_ids"][0]
        .as_str()
        .expect("enrollment id")
        .to_string();

    // Create a 3-part plan; the existing 300k seeds the first installment.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/enrollments/{}/installment-plan", enrollment_id),
            Some(json!({ "installments": 3, "interval_days": 30 })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let installments = body["data"].as_array().expect("installments");
    assert_eq!(installments.len(), 3);

    // Plan divides the full total and the already-paid amount waterfalled
    // onto the earliest installment.
    let amounts: Vec<Decimal> = installments
        .iter()
        .map(|i| Decimal::from_str(i["amount"].as_str().expect("amount")).expect("decimal"))
        .collect();
    assert_eq!(amounts.iter().sum::<Decimal>(), dec!(900000));
    assert_eq!(installments[0]["paid_amount"], "300000");
    assert_eq!(installments[0]["status"], "paid");
    assert_eq!(installments[1]["paid_amount"], "0");

    // Pay the rest; the waterfall must fill the remaining installments and
    // keep sum(installment.paid) == enrollment.paid.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual", "amount": "600000" })),
        )
        .await;
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");
    app.upload_receipt(student, attempt_id, "r2.jpg", "image/jpeg", b"jpeg")
        .await;
    app.request_as(
        admin,
        "admin",
        Method::POST,
        &format!("/api/v1/payments/{}/review", attempt_id),
        Some(json!({ "approve": true })),
    )
    .await;

    let response = app
        .request_as(
            student,
            "",
            Method::GET,
            &format!("/api/v1/enrollments/{}/installments", enrollment_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    let installments = body["data"].as_array().expect("installments");
    let paid_sum: Decimal = installments
        .iter()
        .map(|i| Decimal::from_str(i["paid_amount"].as_str().expect("paid")).expect("decimal"))
        .sum();
    assert_eq!(paid_sum, dec!(900000));
    assert!(installments
        .iter()
        .all(|i| i["status"] == "paid"));

    // A second plan on the same enrollment conflicts.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/enrollments/{}/installment-plan", enrollment_id),
            Some(json!({ "installments": 2, "interval_days": 30 })),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn installment_plan_requires_course_permission() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    // allow_installments = false for this course.
    let course = app.seed_course(dec!(500000), false);
    let admin = Uuid::new_v4();

    app.request_as(
        student,
        "",
        Method::POST,
        "/api/v1/carts/me/items",
        Some(json!({ "course_id": course })),
    )
    .await;
    let response = app
        .request_as(student, "", Method::POST, "/api/v1/checkout", None)
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["order"]["id"].as_str().expect("id").to_string();

    // Partial payment keeps the enrollment open so only the catalog gate can
    // reject the plan.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual", "amount": "200000" })),
        )
        .await;
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");
    app.upload_receipt(student, attempt_id, "r.jpg", "image/jpeg", b"jpeg")
        .await;
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    let body = response_json(response).await;
    let enrollment_id = body["data"]["enrollment_ids"][0]
        .as_str()
        .expect("enrollment id")
        .to_string();

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/enrollments/{}/installment-plan", enrollment_id),
            Some(json!({ "installments": 3, "interval_days": 30 })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn enrollment_cancellation_needs_reason_and_admin() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(0), false);

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/enrollments/free",
            Some(json!({ "course_id": course })),
        )
        .await;
    let body = response_json(response).await;
    let enrollment_id = body["data"]["id"].as_str().expect("id").to_string();

    // The student cannot cancel (admin gate).
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/enrollments/{}/cancel", enrollment_id),
            Some(json!({ "reason": "please" })),
        )
        .await;
    assert_eq!(response.status(), 403);

    let admin = Uuid::new_v4();
    // Blank reason is rejected.
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/enrollments/{}/cancel", enrollment_id),
            Some(json!({ "reason": "  " })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/enrollments/{}/cancel", enrollment_id),
            Some(json!({ "reason": "refund approved outside the platform" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // Cancelled enrollments free the (student, course) pair for re-enrollment.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/enrollments/free",
            Some(json!({ "course_id": course })),
        )
        .await;
    assert_eq!(response.status(), 201);
}
