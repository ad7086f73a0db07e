// Each test binary compiles this module independently and uses a different
// subset of the helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use academy_api::{
    collaborators::{CourseSnapshot, InMemoryBlobStore, InMemoryCatalog, InMemoryDirectory},
    config::AppConfig,
    db,
    events::{self, EventSender},
    middleware_helpers::caller::{USER_ID_HEADER, USER_ROLES_HEADER},
    rate_limiter::RateLimiter,
    services::AppServices,
    AppState,
};
use axum::{
    body::Body,
    http::{Method, Request},
    middleware,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Test harness: the real router over a fresh SQLite database, with
/// in-memory catalog/blob collaborators exposed for assertions.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub catalog: Arc<InMemoryCatalog>,
    pub blob_store: Arc<InMemoryBlobStore>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("academy_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let catalog = Arc::new(InMemoryCatalog::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            catalog.clone(),
            directory,
            blob_store.clone(),
            Arc::new(cfg.clone()),
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            event_sender,
            services,
            rate_limiter: RateLimiter::new(10_000, Duration::from_secs(60)),
        };

        let router = Router::new()
            .route("/health", get(academy_api::health::simple_health_check))
            .nest("/api/v1", academy_api::api_v1_routes())
            .layer(middleware::from_fn(
                academy_api::middleware_helpers::request_id::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            catalog,
            blob_store,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Seeds a course into the in-memory catalog.
    pub fn seed_course(&self, price: Decimal, allow_installments: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.insert(CourseSnapshot {
            id,
            title: format!("Course {}", &id.to_string()[..8]),
            thumbnail_url: None,
            instructor_name: Some("Test Instructor".to_string()),
            price,
            currency: "IRR".to_string(),
            allow_installments,
        });
        id
    }

    /// Sends a JSON request as the given user.
    pub async fn request_as(
        &self,
        user_id: Uuid,
        roles: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user_id.to_string());
        if !roles.is_empty() {
            builder = builder.header(USER_ROLES_HEADER, roles);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a JSON request with extra headers as the given user.
    pub async fn request_as_with_headers(
        &self,
        user_id: Uuid,
        roles: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user_id.to_string());
        if !roles.is_empty() {
            builder = builder.header(USER_ROLES_HEADER, roles);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Uploads a receipt file through the multipart endpoint.
    pub async fn upload_receipt(
        &self,
        user_id: Uuid,
        attempt_id: Uuid,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> axum::response::Response {
        const BOUNDARY: &str = "academy-test-boundary";

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/payments/{}/receipt", attempt_id))
            .header(USER_ID_HEADER, user_id.to_string())
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .expect("build multipart request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during upload")
    }
}

/// Decodes a response body into JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Walks the standard happy path up to an attempt awaiting admin approval:
/// seed course → add to cart → checkout → manual attempt → receipt upload.
/// Returns (student, order id, attempt id).
#[allow(dead_code)]
pub async fn attempt_awaiting_approval(app: &TestApp, price: Decimal) -> (Uuid, Uuid, Uuid) {
    let student = Uuid::new_v4();
    let course = app.seed_course(price, false);

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            "/api/v1/carts/me/items",
            Some(serde_json::json!({ "course_id": course })),
        )
        .await;
    assert_eq!(response.status(), 201, "add to cart");

    let response = app
        .request_as(student, "", Method::POST, "/api/v1/checkout", None)
        .await;
    assert_eq!(response.status(), 201, "checkout");
    let body = response_json(response).await;
    let order_id: Uuid = body["data"]["order"]["id"]
        .as_str()
        .expect("order id")
        .parse()
        .expect("order id uuid");

    let response = app
        .request_as(
            student,
            "",
            Method::POST,
            &format!("/api/v1/orders/{}/payments", order_id),
            Some(serde_json::json!({ "method": "manual" })),
        )
        .await;
    assert_eq!(response.status(), 201, "create manual attempt");
    let body = response_json(response).await;
    let attempt_id: Uuid = body["data"]["id"]
        .as_str()
        .expect("attempt id")
        .parse()
        .expect("attempt id uuid");
    assert_eq!(body["data"]["status"], "awaiting_receipt_upload");

    let response = app
        .upload_receipt(student, attempt_id, "receipt.jpg", "image/jpeg", b"jpeg-bytes")
        .await;
    assert_eq!(response.status(), 200, "upload receipt");

    (student, order_id, attempt_id)
}
