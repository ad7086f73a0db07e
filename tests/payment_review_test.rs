//! The manual payment pipeline end to end: receipt upload and validation,
//! admin approval with its atomic side effects, rejection, double-review
//! protection, idempotent replay and refund.

mod common;

use axum::http::Method;
use common::{attempt_awaiting_approval, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn approval_credits_enrollment_and_completes_order() {
    let app = TestApp::new().await;
    let (student, order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;
    let admin = Uuid::new_v4();

    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["order_completed"], true);
    assert_eq!(body["data"]["replayed"], false);
    let enrollment_id = body["data"]["enrollment_ids"][0]
        .as_str()
        .expect("enrollment id")
        .to_string();

    // Order is completed.
    let response = app
        .request_as(
            student,
            "",
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "completed");

    // Enrollment is fully paid.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    let enrollment = &body["data"][0];
    assert_eq!(enrollment["id"], json!(enrollment_id));
    assert_eq!(enrollment["paid_amount"], "500000");
    assert_eq!(enrollment["payment_status"], "paid");
    assert_eq!(enrollment["status"], "active");

    // The audit trail records the whole journey, including the approval with
    // its amount.
    let response = app
        .request_as(
            admin,
            "admin",
            Method::GET,
            &format!("/api/v1/payments/{}/audit", attempt_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    let actions: Vec<&str> = body["data"]
        .as_array()
        .expect("audit rows")
        .iter()
        .map(|row| row["action"].as_str().expect("action"))
        .collect();
    assert_eq!(
        actions,
        vec![
            "attempt_created",
            "receipt_uploaded",
            "admin_approved",
            "enrollment_created",
            "order_completed",
        ]
    );
    let approved = &body["data"][2];
    assert_eq!(approved["amount"], "500000");
    assert_eq!(approved["to_status"], "paid");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn second_review_of_same_attempt_conflicts() {
    let app = TestApp::new().await;
    let (student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;
    let admin = Uuid::new_v4();

    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(response.status(), 200);

    // A different admin repeating the decision sees the terminal state, not a
    // second credit.
    let other_admin = Uuid::new_v4();
    let response = app
        .request_as(
            other_admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(response.status(), 409);

    // Exactly one credit happened.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["paid_amount"], "500000");
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn replaying_with_same_idempotency_key_returns_stored_outcome() {
    let app = TestApp::new().await;
    let (student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;
    let admin = Uuid::new_v4();

    let first = app
        .request_as_with_headers(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
            &[("idempotency-key", "review-key-1")],
        )
        .await;
    assert_eq!(first.status(), 200);
    let first_body = response_json(first).await;
    assert_eq!(first_body["data"]["replayed"], false);

    // Same admin, same key, same decision: the stored result comes back.
    let replay = app
        .request_as_with_headers(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
            &[("idempotency-key", "review-key-1")],
        )
        .await;
    assert_eq!(replay.status(), 200);
    let replay_body = response_json(replay).await;
    assert_eq!(replay_body["data"]["replayed"], true);
    assert_eq!(
        replay_body["data"]["enrollment_ids"],
        first_body["data"]["enrollment_ids"]
    );

    // Still exactly one credit and one approval audit row.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["paid_amount"], "500000");

    let response = app
        .request_as(
            admin,
            "admin",
            Method::GET,
            &format!("/api/v1/payments/{}/audit", attempt_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    let approvals = body["data"]
        .as_array()
        .expect("audit rows")
        .iter()
        .filter(|row| row["action"] == "admin_approved")
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn reusing_a_key_for_a_different_request_conflicts() {
    let app = TestApp::new().await;
    let (_, _, attempt_a) = attempt_awaiting_approval(&app, dec!(100000)).await;
    let (_, _, attempt_b) = attempt_awaiting_approval(&app, dec!(200000)).await;
    let admin = Uuid::new_v4();

    let response = app
        .request_as_with_headers(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_a),
            Some(json!({ "approve": true })),
            &[("idempotency-key", "shared-key")],
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request_as_with_headers(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_b),
            Some(json!({ "approve": true })),
            &[("idempotency-key", "shared-key")],
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn rejection_requires_a_reason_and_is_terminal() {
    let app = TestApp::new().await;
    let (student, order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;
    let admin = Uuid::new_v4();

    // Missing reason fails validation before anything happens.
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": false })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": false, "reason": "amount does not match the transfer" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "failed");

    // Rejecting an already-failed attempt conflicts.
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": false, "reason": "again" })),
        )
        .await;
    assert_eq!(response.status(), 409);

    // No enrollment was created.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().expect("list").len(), 0);

    // A new attempt can be made against the still-pending order.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual" })),
        )
        .await;
    assert_eq!(response.status(), 201);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn invalid_receipts_are_rejected_before_any_state_change() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(500000), false);

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
            Some(json!({ "method": "manual" })),
        )
        .await;
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");

    // 6 MB file: too large.
    let oversized = vec![0u8; 6 * 1024 * 1024];
    let response = app
        .upload_receipt(student, attempt_id, "receipt.jpg", "image/jpeg", &oversized)
        .await;
    assert_eq!(response.status(), 400);

    // Executable: wrong type.
    let response = app
        .upload_receipt(student, attempt_id, "receipt.exe", "image/jpeg", b"MZ")
        .await;
    assert_eq!(response.status(), 400);

    // The attempt never moved and no file was stored.
    let response = app
        .request_as(
            student,
            "",
            Method::GET,
            &format!("/api/v1/payments/{}", attempt_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "awaiting_receipt_upload");
    assert_eq!(app.blob_store.file_count(), 0);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn receipt_reupload_allowed_until_reviewed() {
    let app = TestApp::new().await;
    let (student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;

    // Still awaiting approval: overwrite is fine.
    let response = app
        .upload_receipt(student, attempt_id, "better.png", "image/png", b"png-bytes")
        .await;
    assert_eq!(response.status(), 200);

    // Approve, then try again: rejected.
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
        .upload_receipt(student, attempt_id, "late.jpg", "image/jpeg", b"jpeg")
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn only_admins_review_and_strangers_cannot_upload() {
    let app = TestApp::new().await;
    let (_student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;

    // Non-admin reviewer is forbidden.
    let response = app
        .request_as(
            Uuid::new_v4(),
            "student",
            Method::POST,
            &format!("/api/v1/payments/{}/review", attempt_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(response.status(), 403);

    // A stranger cannot upload a receipt to someone else's attempt.
    let response = app
        .upload_receipt(
            Uuid::new_v4(),
            attempt_id,
            "receipt.jpg",
            "image/jpeg",
            b"jpeg",
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn refund_debits_enrollment_and_is_audited() {
    let app = TestApp::new().await;
    let (student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;
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
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/refund", attempt_id),
            Some(json!({ "reason": "duplicate transfer" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "refunded");

    // Enrollment is back to unpaid.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["paid_amount"], "0");
    assert_eq!(body["data"][0]["payment_status"], "unpaid");

    // Refunding twice conflicts.
    let response = app
        .request_as(
            admin,
            "admin",
            Method::POST,
            &format!("/api/v1/payments/{}/refund", attempt_id),
            Some(json!({ "reason": "again" })),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn partial_attempts_settle_an_order_in_steps() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
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

    // First attempt covers 200k of 500k.
    for (amount, expect_completed) in [("200000", false), ("300000", true)] {
        let response = app
            .request_as(
                student,
                "",
                Method::POST,
                &format!("/api/v1/orders/{}/payments", order_id),
                Some(json!({ "method": "manual", "amount": amount })),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body = response_json(response).await;
        let attempt_id: Uuid = body["data"]["id"].as_str().expect("id").parse().expect("uuid");

        app.upload_receipt(student, attempt_id, "receipt.jpg", "image/jpeg", b"jpeg")
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
        assert_eq!(response.status(), 200);
        let body = response_json(response).await;
        assert_eq!(body["data"]["order_completed"], expect_completed);
    }

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
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["remaining_amount"], "0");

    // A settled order accepts no further attempts.
    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(json!({ "method": "manual" })),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn concurrent_reviews_yield_exactly_one_paid_transition() {
    use academy_api::errors::ServiceError;
    use academy_api::services::payments::ReviewRequest;

    let app = TestApp::new().await;
    let (student, _order_id, attempt_id) = attempt_awaiting_approval(&app, dec!(500000)).await;

    let payments = app.state.services.payments.clone();
    let admin_a = Uuid::new_v4();
    let admin_b = Uuid::new_v4();

    let review = |admin: Uuid| {
        let payments = payments.clone();
        async move {
            payments
                .review_payment(
                    attempt_id,
                    admin,
                    ReviewRequest {
                        approve: true,
                        reason: None,
                        idempotency_key: None,
                    },
                )
                .await
        }
    };

    let (first, second) = tokio::join!(review(admin_a), review(admin_b));

    let outcomes = [first, second];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::Conflict(_))))
        .count();
    assert_eq!(wins, 1, "exactly one review must win");
    assert_eq!(conflicts, 1, "the loser must observe a conflict");

    // The enrollment was credited exactly once.
    let response = app
        .request_as(student, "", Method::GET, "/api/v1/enrollments/me", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["paid_amount"], "500000");

    // And exactly one approval row exists in the audit log.
    let admin = Uuid::new_v4();
    let response = app
        .request_as(
            admin,
            "admin",
            Method::GET,
            &format!("/api/v1/payments/{}/audit", attempt_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    let approvals = body["data"]
        .as_array()
        .expect("audit rows")
        .iter()
        .filter(|row| row["action"] == "admin_approved")
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
#[ignore = "requires SQLite integration environment"]
async fn attempt_amount_must_fit_remaining_balance() {
    let app = TestApp::new().await;
    let student = Uuid::new_v4();
    let course = app.seed_course(dec!(500000), false);

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

    for bad_amount in ["600000", "0", "-1"] {
        let response = app
            .request_as(
                student,
                "",
                Method::POST,
                &format!("/api/v1/orders/{}/payments", order_id),
                Some(json!({ "method": "manual", "amount": bad_amount })),
            )
            .await;
        assert_eq!(response.status(), 400, "amount {} must be rejected", bad_amount);
    }
}
