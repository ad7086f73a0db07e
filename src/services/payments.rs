use crate::{
    collaborators::BlobStore,
    config::AppConfig,
    entities::order::{self, OrderStatus},
    entities::payment_attempt::{self, PaymentAttemptStatus, PaymentMethod},
    entities::payment_audit::AuditAction,
    entities::{Order, OrderModel, PaymentAttempt, PaymentAttemptModel, PaymentAuditModel},
    errors::ServiceError,
    events::{outbox, Event, EventSender},
    services::accounting,
    services::audit::{self, AuditEntry},
    services::enrollments,
    services::idempotency::{self, Claim},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const RECEIPT_CATEGORY: &str = "payment-receipts";
const TRACKING_CODE_LEN: usize = 10;

/// File types accepted for manual payment receipts.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "pdf"];
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "application/pdf",
];

/// Service owning the payment attempt aggregate and the admin review
/// orchestration.
///
/// Every state transition runs as read → validate → write (with an optimistic
/// version check) → audit → idempotency inside one transaction; two
/// concurrent reviews of the same attempt therefore produce exactly one paid
/// transition and the loser observes a conflict.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    blob_store: Arc<dyn BlobStore>,
    config: Arc<AppConfig>,
}

/// Uploaded receipt file as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct ReceiptUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateAttemptRequest {
    pub method: PaymentMethod,
    /// Portion of the order balance this attempt settles; defaults to the
    /// full remaining balance
    #[schema(value_type = Option<String>, example = "500000")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReviewRequest {
    pub approve: bool,
    /// Mandatory when rejecting
    pub reason: Option<String>,
    /// Optional caller-supplied idempotency key; derived from the decision
    /// when absent
    pub idempotency_key: Option<String>,
}

/// Result of the review use case; serialized into the idempotency record so
/// replays return the identical payload.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ReviewOutcome {
    pub attempt_id: Uuid,
    pub status: PaymentAttemptStatus,
    pub enrollment_ids: Vec<Uuid>,
    pub order_completed: bool,
    /// True when this response was replayed from a previous identical call
    #[serde(default)]
    pub replayed: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadReceiptResponse {
    pub attempt_id: Uuid,
    pub status: PaymentAttemptStatus,
    pub uploaded_at: DateTime<Utc>,
    pub receipt_url: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AttemptResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    #[schema(value_type = String, example = "500000")]
    pub amount: Decimal,
    pub currency: String,
    pub tracking_code: String,
    pub status: PaymentAttemptStatus,
    pub receipt_filename: Option<String>,
    pub receipt_uploaded_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentAttemptModel> for AttemptResponse {
    fn from(model: PaymentAttemptModel) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            method: model.method,
            amount: model.amount,
            currency: model.currency,
            tracking_code: model.tracking_code,
            status: model.status,
            receipt_filename: model.receipt_filename,
            receipt_uploaded_at: model.receipt_uploaded_at,
            reviewed_at: model.reviewed_at,
            rejection_reason: model.rejection_reason,
            created_at: model.created_at,
        }
    }
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        blob_store: Arc<dyn BlobStore>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            blob_store,
            config,
        }
    }

    /// Creates a payment attempt against an order with a positive remaining
    /// balance. Manual attempts land directly in the receipt-upload state;
    /// cash attempts go straight to admin review; online/wallet attempts stay
    /// pending for the external gateway.
    #[instrument(skip(self))]
    pub async fn create_attempt(
        &self,
        order_id: Uuid,
        student_id: Uuid,
        request: CreateAttemptRequest,
    ) -> Result<AttemptResponse, ServiceError> {
        if request.method == PaymentMethod::Free {
            return Err(ServiceError::ValidationError(
                "free enrollment does not go through payment attempts".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.student_id != student_id {
            return Err(ServiceError::Forbidden(
                "caller does not own this order".to_string(),
            ));
        }
        if !matches!(
            order.status,
            OrderStatus::Draft | OrderStatus::PendingPayment
        ) {
            return Err(ServiceError::Conflict(format!(
                "order in status {} does not accept payments",
                order.status.as_str()
            )));
        }

        let remaining = remaining_balance(&txn, &order).await?;
        if remaining <= Decimal::ZERO {
            return Err(ServiceError::Conflict(
                "order balance is already settled".to_string(),
            ));
        }

        let amount = request.amount.unwrap_or(remaining);
        if amount <= Decimal::ZERO || amount > remaining {
            return Err(ServiceError::ValidationError(format!(
                "amount must be positive and at most the remaining balance of {}",
                remaining
            )));
        }

        let initial_status = match request.method {
            PaymentMethod::Manual => PaymentAttemptStatus::AwaitingReceiptUpload,
            PaymentMethod::Cash => PaymentAttemptStatus::AwaitingAdminApproval,
            PaymentMethod::Online | PaymentMethod::Wallet => PaymentAttemptStatus::PendingPayment,
            PaymentMethod::Free => unreachable!("rejected above"),
        };

        let now = Utc::now();
        let attempt_id = Uuid::new_v4();
        let attempt = payment_attempt::ActiveModel {
            id: Set(attempt_id),
            order_id: Set(order.id),
            student_id: Set(student_id),
            method: Set(request.method),
            amount: Set(amount),
            currency: Set(order.currency.clone()),
            tracking_code: Set(generate_tracking_code()),
            status: Set(initial_status),
            receipt_url: Set(None),
            receipt_filename: Set(None),
            receipt_uploaded_at: Set(None),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            rejection_reason: Set(None),
            // Attempts already waiting on a human never expire.
            expires_at: Set(initial_status.is_expirable().then(|| {
                now + Duration::hours(self.config.payment_attempt_ttl_hours)
            })),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };
        let attempt = attempt.insert(&txn).await?;

        // First attempt moves a draft order into pending payment.
        if order.status == OrderStatus::Draft {
            transition_order(&txn, &order, OrderStatus::PendingPayment).await?;
        }

        audit::append(
            &txn,
            AuditEntry::new(attempt_id, AuditAction::AttemptCreated)
                .order(order.id)
                .actor(student_id)
                .transition(
                    PaymentAttemptStatus::Draft.as_str(),
                    initial_status.as_str(),
                )
                .amount(amount),
        )
        .await?;

        outbox::enqueue(
            &txn,
            "payment_attempt",
            Some(attempt_id),
            &Event::PaymentAttemptCreated(attempt_id),
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentAttemptCreated(attempt_id))
            .await;

        info!(
            attempt_id = %attempt_id,
            order_id = %order_id,
            method = ?request.method,
            amount = %amount,
            "payment attempt created"
        );
        Ok(attempt.into())
    }

    /// Stores a receipt for a manual attempt and moves it to admin review.
    ///
    /// The file is validated before anything else happens; an invalid file or
    /// a storage failure leaves the attempt untouched. Re-upload is allowed
    /// while the attempt still awaits review (the new receipt replaces the
    /// old one); reviewed attempts reject uploads.
    #[instrument(skip(self, upload), fields(filename = %upload.filename, size = upload.bytes.len()))]
    pub async fn upload_receipt(
        &self,
        attempt_id: Uuid,
        caller_id: Uuid,
        upload: ReceiptUpload,
    ) -> Result<UploadReceiptResponse, ServiceError> {
        validate_receipt(&upload, self.config.receipt_max_bytes)?;

        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.student_id != caller_id {
            return Err(ServiceError::Forbidden(
                "caller does not own this payment attempt".to_string(),
            ));
        }
        if attempt.method != PaymentMethod::Manual {
            return Err(ServiceError::Conflict(
                "only manual payments carry receipts".to_string(),
            ));
        }
        if !attempt.status.accepts_receipt() {
            return Err(ServiceError::Conflict(format!(
                "attempt in status {} does not accept receipts",
                attempt.status.as_str()
            )));
        }

        // Storage failures surface as errors without any state change.
        let blob = self
            .blob_store
            .save_file(RECEIPT_CATEGORY, caller_id, &upload.filename, &upload.bytes)
            .await
            .map_err(ServiceError::StorageError)?;

        let txn = self.db.begin().await?;

        // Re-read inside the transaction; the state may have moved while the
        // file was being stored.
        let attempt = PaymentAttempt::find_by_id(attempt_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment attempt {} not found", attempt_id))
            })?;
        if !attempt.status.accepts_receipt() {
            return Err(ServiceError::Conflict(format!(
                "attempt in status {} does not accept receipts",
                attempt.status.as_str()
            )));
        }

        let now = Utc::now();
        let previous_receipt = attempt.receipt_url.clone();
        let from_status = attempt.status;

        let update = payment_attempt::ActiveModel {
            status: Set(PaymentAttemptStatus::AwaitingAdminApproval),
            receipt_url: Set(Some(blob.url.clone())),
            receipt_filename: Set(Some(upload.filename.clone())),
            receipt_uploaded_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            version: Set(attempt.version + 1),
            ..Default::default()
        };
        transition_attempt(&txn, &attempt, update).await?;

        audit::append(
            &txn,
            AuditEntry::new(attempt_id, AuditAction::ReceiptUploaded)
                .order(attempt.order_id)
                .actor(caller_id)
                .transition(
                    from_status.as_str(),
                    PaymentAttemptStatus::AwaitingAdminApproval.as_str(),
                )
                .amount(attempt.amount)
                .reason(upload.filename.clone()),
        )
        .await?;

        outbox::enqueue(
            &txn,
            "payment_attempt",
            Some(attempt_id),
            &Event::ReceiptUploaded { attempt_id },
        )
        .await?;

        txn.commit().await?;

        if previous_receipt.is_some() {
            info!(attempt_id = %attempt_id, "receipt replaced");
        }

        self.event_sender
            .send_or_log(Event::ReceiptUploaded { attempt_id })
            .await;

        Ok(UploadReceiptResponse {
            attempt_id,
            status: PaymentAttemptStatus::AwaitingAdminApproval,
            uploaded_at: now,
            receipt_url: blob.url,
        })
    }

    /// Admin review of a manual/cash attempt: approve or reject.
    ///
    /// One transaction covers the status transition, enrollment credit, audit
    /// rows, order completion and the idempotency record; any failure rolls
    /// the whole decision back so no partial credit can exist. A replay with
    /// the same idempotency key returns the stored outcome without
    /// re-crediting; reviewing an attempt not awaiting approval is a
    /// conflict, which is what the second of two racing reviewers sees.
    #[instrument(skip(self, request), fields(approve = request.approve))]
    pub async fn review_payment(
        &self,
        attempt_id: Uuid,
        admin_id: Uuid,
        request: ReviewRequest,
    ) -> Result<ReviewOutcome, ServiceError> {
        let reason = request.reason.as_deref().map(str::trim).unwrap_or("");
        if !request.approve && reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "a reason is required when rejecting a payment".to_string(),
            ));
        }

        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| idempotency::derived_review_key(attempt_id, admin_id, request.approve));
        let fingerprint = idempotency::request_fingerprint(&[
            &attempt_id.to_string(),
            &admin_id.to_string(),
            if request.approve { "approve" } else { "reject" },
            reason,
        ]);

        let txn = self.db.begin().await?;

        match idempotency::claim(
            &txn,
            &key,
            admin_id,
            idempotency::OP_PAYMENT_REVIEW,
            &fingerprint,
            self.config.idempotency_ttl_hours,
        )
        .await?
        {
            Claim::Replay(stored) => {
                let mut outcome: ReviewOutcome = serde_json::from_value(stored)?;
                outcome.replayed = true;
                info!(attempt_id = %attempt_id, "review replayed from idempotency record");
                return Ok(outcome);
            }
            Claim::New => {}
        }

        let attempt = PaymentAttempt::find_by_id(attempt_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment attempt {} not found", attempt_id))
            })?;

        if attempt.status != PaymentAttemptStatus::AwaitingAdminApproval {
            return Err(ServiceError::Conflict(format!(
                "attempt in status {} cannot be reviewed",
                attempt.status.as_str()
            )));
        }
        if attempt.method == PaymentMethod::Manual && attempt.receipt_url.is_none() {
            return Err(ServiceError::Conflict(
                "manual attempt has no receipt on file".to_string(),
            ));
        }

        let outcome = if request.approve {
            self.approve_within(&txn, &attempt, admin_id).await?
        } else {
            self.reject_within(&txn, &attempt, admin_id, reason).await?
        };

        idempotency::complete(
            &txn,
            &key,
            admin_id,
            idempotency::OP_PAYMENT_REVIEW,
            &serde_json::to_value(&outcome)?,
        )
        .await?;

        txn.commit().await?;

        if request.approve {
            self.event_sender
                .send_or_log(Event::PaymentApproved {
                    attempt_id,
                    order_id: attempt.order_id,
                    amount: attempt.amount,
                })
                .await;
        } else {
            self.event_sender
                .send_or_log(Event::PaymentRejected { attempt_id })
                .await;
        }

        info!(
            attempt_id = %attempt_id,
            admin_id = %admin_id,
            approved = request.approve,
            "payment reviewed"
        );
        Ok(outcome)
    }

    async fn approve_within(
        &self,
        txn: &impl ConnectionTrait,
        attempt: &PaymentAttemptModel,
        admin_id: Uuid,
    ) -> Result<ReviewOutcome, ServiceError> {
        let now = Utc::now();

        // Lock order: attempt first, then enrollments, then the order row.
        let update = payment_attempt::ActiveModel {
            status: Set(PaymentAttemptStatus::Paid),
            reviewed_by: Set(Some(admin_id)),
            reviewed_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            version: Set(attempt.version + 1),
            ..Default::default()
        };
        transition_attempt(txn, attempt, update).await?;

        audit::append(
            txn,
            AuditEntry::new(attempt.id, AuditAction::AdminApproved)
                .order(attempt.order_id)
                .actor(admin_id)
                .transition(
                    PaymentAttemptStatus::AwaitingAdminApproval.as_str(),
                    PaymentAttemptStatus::Paid.as_str(),
                )
                .amount(attempt.amount),
        )
        .await?;

        let order = Order::find_by_id(attempt.order_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "order {} missing for attempt {}",
                    attempt.order_id, attempt.id
                ))
            })?;

        // Credit each course in the frozen snapshot with its share of this
        // attempt, remainder on the last item so the sum is exact.
        let items = order.snapshot_items()?;
        let weights: Vec<Decimal> = items.iter().map(|item| item.unit_price).collect();
        let shares = accounting::allocate_across(attempt.amount, &weights);

        let mut enrollment_ids = Vec::with_capacity(items.len());
        for (item, share) in items.iter().zip(shares) {
            let (enrollment, created) =
                enrollments::get_or_create(txn, attempt.student_id, item.course_id, item.unit_price)
                    .await?;
            if created {
                audit::append(
                    txn,
                    AuditEntry::new(attempt.id, AuditAction::EnrollmentCreated)
                        .order(order.id)
                        .actor(admin_id)
                        .amount(item.unit_price),
                )
                .await?;
                outbox::enqueue(
                    txn,
                    "enrollment",
                    Some(enrollment.id),
                    &Event::EnrollmentCreated {
                        enrollment_id: enrollment.id,
                        student_id: attempt.student_id,
                        course_id: item.course_id,
                    },
                )
                .await?;
            }

            let (enrollment, credited) = enrollments::credit(txn, enrollment, share).await?;
            outbox::enqueue(
                txn,
                "enrollment",
                Some(enrollment.id),
                &Event::EnrollmentCredited {
                    enrollment_id: enrollment.id,
                    amount: credited,
                },
            )
            .await?;
            enrollment_ids.push(enrollment.id);
        }

        // Close the order once paid attempts cover its total.
        let paid_total = paid_total(txn, order.id).await?;
        let order_completed = paid_total >= order.total_amount
            && order.status == OrderStatus::PendingPayment;
        if order_completed {
            transition_order(txn, &order, OrderStatus::Completed).await?;
            audit::append(
                txn,
                AuditEntry::new(attempt.id, AuditAction::OrderCompleted)
                    .order(order.id)
                    .actor(admin_id)
                    .amount(paid_total),
            )
            .await?;
            outbox::enqueue(txn, "order", Some(order.id), &Event::OrderCompleted(order.id))
                .await?;
        }

        outbox::enqueue(
            txn,
            "payment_attempt",
            Some(attempt.id),
            &Event::PaymentApproved {
                attempt_id: attempt.id,
                order_id: order.id,
                amount: attempt.amount,
            },
        )
        .await?;

        Ok(ReviewOutcome {
            attempt_id: attempt.id,
            status: PaymentAttemptStatus::Paid,
            enrollment_ids,
            order_completed,
            replayed: false,
        })
    }

    async fn reject_within(
        &self,
        txn: &impl ConnectionTrait,
        attempt: &PaymentAttemptModel,
        admin_id: Uuid,
        reason: &str,
    ) -> Result<ReviewOutcome, ServiceError> {
        let now = Utc::now();
        let update = payment_attempt::ActiveModel {
            status: Set(PaymentAttemptStatus::Failed),
            reviewed_by: Set(Some(admin_id)),
            reviewed_at: Set(Some(now)),
            rejection_reason: Set(Some(reason.to_string())),
            updated_at: Set(Some(now)),
            version: Set(attempt.version + 1),
            ..Default::default()
        };
        transition_attempt(txn, attempt, update).await?;

        audit::append(
            txn,
            AuditEntry::new(attempt.id, AuditAction::AdminRejected)
                .order(attempt.order_id)
                .actor(admin_id)
                .transition(
                    PaymentAttemptStatus::AwaitingAdminApproval.as_str(),
                    PaymentAttemptStatus::Failed.as_str(),
                )
                .amount(attempt.amount)
                .reason(reason),
        )
        .await?;

        outbox::enqueue(
            txn,
            "payment_attempt",
            Some(attempt.id),
            &Event::PaymentRejected {
                attempt_id: attempt.id,
            },
        )
        .await?;

        Ok(ReviewOutcome {
            attempt_id: attempt.id,
            status: PaymentAttemptStatus::Failed,
            enrollment_ids: Vec::new(),
            order_completed: false,
            replayed: false,
        })
    }

    /// Refunds a paid attempt. A single audited admin operation: the attempt
    /// moves to refunded and the funded enrollments are debited by their
    /// shares of the attempt amount.
    #[instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        attempt_id: Uuid,
        admin_id: Uuid,
        reason: String,
    ) -> Result<AttemptResponse, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "a reason is required when refunding a payment".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let attempt = PaymentAttempt::find_by_id(attempt_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment attempt {} not found", attempt_id))
            })?;

        if attempt.status != PaymentAttemptStatus::Paid {
            return Err(ServiceError::Conflict(format!(
                "attempt in status {} cannot be refunded",
                attempt.status.as_str()
            )));
        }

        let now = Utc::now();
        let update = payment_attempt::ActiveModel {
            status: Set(PaymentAttemptStatus::Refunded),
            updated_at: Set(Some(now)),
            version: Set(attempt.version + 1),
            ..Default::default()
        };
        transition_attempt(&txn, &attempt, update).await?;

        let order = Order::find_by_id(attempt.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "order {} missing for attempt {}",
                    attempt.order_id, attempt.id
                ))
            })?;

        let items = order.snapshot_items()?;
        let weights: Vec<Decimal> = items.iter().map(|item| item.unit_price).collect();
        let shares = accounting::allocate_across(attempt.amount, &weights);

        for (item, share) in items.iter().zip(shares) {
            if let Some(enrollment) =
                enrollments::find_active(&txn, attempt.student_id, item.course_id).await?
            {
                enrollments::debit(&txn, enrollment, share).await?;
            }
        }

        audit::append(
            &txn,
            AuditEntry::new(attempt.id, AuditAction::PaymentRefunded)
                .order(order.id)
                .actor(admin_id)
                .transition(
                    PaymentAttemptStatus::Paid.as_str(),
                    PaymentAttemptStatus::Refunded.as_str(),
                )
                .amount(attempt.amount)
                .reason(reason.clone()),
        )
        .await?;

        outbox::enqueue(
            &txn,
            "payment_attempt",
            Some(attempt.id),
            &Event::PaymentRefunded(attempt.id),
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentRefunded(attempt_id))
            .await;
        info!(attempt_id = %attempt_id, admin_id = %admin_id, "payment refunded");

        Ok(self.get_attempt(attempt_id).await?.into())
    }

    /// Fetches one attempt.
    pub async fn get_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<PaymentAttemptModel, ServiceError> {
        PaymentAttempt::find_by_id(attempt_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment attempt {} not found", attempt_id))
            })
    }

    /// Attempts for one order, oldest first.
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<PaymentAttemptModel>, ServiceError> {
        Ok(PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .order_by_asc(payment_attempt::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Full audit trail of one attempt.
    pub async fn audit_trail(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<PaymentAuditModel>, ServiceError> {
        audit::list_for_attempt(&*self.db, attempt_id).await
    }

    /// Expires attempts left unresolved past their window. Attempts awaiting
    /// admin approval are untouched. Returns the number expired.
    pub async fn expire_stale(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let stale = PaymentAttempt::find()
            .filter(payment_attempt::Column::Status.is_in([
                PaymentAttemptStatus::Draft,
                PaymentAttemptStatus::PendingPayment,
                PaymentAttemptStatus::AwaitingReceiptUpload,
            ]))
            .filter(payment_attempt::Column::ExpiresAt.lt(now))
            .all(&*self.db)
            .await?;

        let mut expired = 0u64;
        for attempt in stale {
            let txn = self.db.begin().await?;
            match crate::services::orders::expire_attempt(&txn, &attempt).await {
                Ok(true) => {
                    txn.commit().await?;
                    self.event_sender
                        .send_or_log(Event::PaymentExpired(attempt.id))
                        .await;
                    expired += 1;
                }
                Ok(false) => {
                    // Lost the race to another transition; nothing to do.
                }
                Err(e) => {
                    warn!(attempt_id = %attempt.id, error = %e, "failed to expire attempt");
                }
            }
        }

        if expired > 0 {
            info!(count = expired, "expired stale payment attempts");
        }
        Ok(expired)
    }
}

/// Version-checked single-row transition. The filter on (id, version, status)
/// makes this the serialization point for concurrent writers: whoever updates
/// zero rows lost the race and gets a conflict.
async fn transition_attempt(
    conn: &impl ConnectionTrait,
    attempt: &PaymentAttemptModel,
    update: payment_attempt::ActiveModel,
) -> Result<(), ServiceError> {
    let result = PaymentAttempt::update_many()
        .set(update)
        .filter(payment_attempt::Column::Id.eq(attempt.id))
        .filter(payment_attempt::Column::Version.eq(attempt.version))
        .filter(payment_attempt::Column::Status.eq(attempt.status))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(ServiceError::Conflict(
            "payment attempt was modified concurrently".to_string(),
        ));
    }
    Ok(())
}

/// Version-checked order transition; also validates the transition table.
async fn transition_order(
    conn: &impl ConnectionTrait,
    order: &OrderModel,
    next: OrderStatus,
) -> Result<(), ServiceError> {
    if !order.status.can_transition_to(next) {
        return Err(ServiceError::Conflict(format!(
            "order cannot move from {} to {}",
            order.status.as_str(),
            next.as_str()
        )));
    }

    let update = order::ActiveModel {
        status: Set(next),
        updated_at: Set(Some(Utc::now())),
        version: Set(order.version + 1),
        ..Default::default()
    };
    let result = Order::update_many()
        .set(update)
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(ServiceError::Conflict(
            "order was modified concurrently".to_string(),
        ));
    }
    Ok(())
}

/// Sum of already-paid attempt amounts for an order.
async fn paid_total(
    conn: &impl ConnectionTrait,
    order_id: Uuid,
) -> Result<Decimal, ServiceError> {
    let paid = PaymentAttempt::find()
        .filter(payment_attempt::Column::OrderId.eq(order_id))
        .filter(payment_attempt::Column::Status.eq(PaymentAttemptStatus::Paid))
        .all(conn)
        .await?;
    Ok(paid.iter().map(|a| a.amount).sum())
}

/// Order balance still open to new attempts.
async fn remaining_balance(
    conn: &impl ConnectionTrait,
    order: &OrderModel,
) -> Result<Decimal, ServiceError> {
    Ok(order.total_amount - paid_total(conn, order.id).await?)
}

fn generate_tracking_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let code: String = (0..TRACKING_CODE_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("PAY-{}", code)
}

/// Validates a receipt upload before any state or storage is touched.
fn validate_receipt(upload: &ReceiptUpload, max_bytes: usize) -> Result<(), ServiceError> {
    if upload.bytes.is_empty() {
        return Err(ServiceError::ValidationError(
            "receipt file is empty".to_string(),
        ));
    }
    if upload.bytes.len() > max_bytes {
        return Err(ServiceError::ValidationError(format!(
            "receipt exceeds the maximum size of {} bytes",
            max_bytes
        )));
    }

    let extension = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ServiceError::ValidationError(format!(
            "file type .{} is not accepted; allowed: {}",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let content_type = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ServiceError::ValidationError(format!(
            "content type {} is not accepted",
            upload.content_type
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    const MAX: usize = 5 * 1024 * 1024;

    fn upload(filename: &str, content_type: &str, size: usize) -> ReceiptUpload {
        ReceiptUpload {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes::Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn valid_jpeg_receipt_passes() {
        assert!(validate_receipt(&upload("receipt.jpg", "image/jpeg", 1024), MAX).is_ok());
        assert!(validate_receipt(&upload("receipt.PDF", "application/pdf", 2048), MAX).is_ok());
    }

    #[test]
    fn oversized_receipt_rejected() {
        let six_mb = 6 * 1024 * 1024;
        let err = validate_receipt(&upload("receipt.jpg", "image/jpeg", six_mb), MAX)
            .expect_err("6 MB must be rejected");
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn executable_rejected_by_extension() {
        let err = validate_receipt(&upload("receipt.exe", "image/jpeg", 1024), MAX)
            .expect_err(".exe must be rejected");
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn mismatched_content_type_rejected() {
        let err = validate_receipt(&upload("receipt.jpg", "application/x-msdownload", 1024), MAX)
            .expect_err("binary content type must be rejected");
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn empty_file_rejected() {
        let err = validate_receipt(&upload("receipt.jpg", "image/jpeg", 0), MAX)
            .expect_err("empty file must be rejected");
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        assert!(
            validate_receipt(&upload("r.png", "image/png; charset=binary", 10), MAX).is_ok()
        );
    }

    #[test]
    fn tracking_codes_are_prefixed_and_unambiguous() {
        let code = generate_tracking_code();
        assert!(code.starts_with("PAY-"));
        assert_eq!(code.len(), 4 + TRACKING_CODE_LEN);
        // 0, 1, I and O are excluded from the alphabet.
        assert!(!code[4..].contains(['0', '1', 'I', 'O']));
    }

    #[test]
    fn share_allocation_credits_full_amount_on_single_course() {
        let shares = accounting::allocate_across(dec!(500000), &[dec!(500000)]);
        assert_eq!(shares, vec![dec!(500000)]);
    }

    #[test]
    fn partial_amount_splits_proportionally_across_courses() {
        let weights = [dec!(300000), dec!(200000)];
        let shares = accounting::allocate_across(dec!(250000), &weights);
        assert_eq!(shares.iter().sum::<Decimal>(), dec!(250000));
        assert_eq!(shares[0], dec!(150000));
        assert_eq!(shares[1], dec!(100000));
    }
}
