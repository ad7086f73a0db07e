use crate::{
    entities::order::{self, OrderStatus},
    entities::payment_attempt::{self, PaymentAttemptStatus},
    entities::{Order, OrderModel, PaymentAttempt, PaymentAttemptModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Read and lifecycle operations on checked-out orders. Order creation lives
/// in the checkout service; order completion is decided inside the payment
/// review transaction.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub student_id: Uuid,
    pub status: OrderStatus,
    #[schema(value_type = String, example = "500000")]
    pub total_amount: Decimal,
    pub currency: String,
    pub items: Vec<order::OrderItemSnapshot>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches one order.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Lists a student's orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_student(
        &self,
        student_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::StudentId.eq(student_id))
            .filter(order::Column::IsArchived.eq(false))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let orders = orders
            .into_iter()
            .map(model_to_response)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Cancels an order that has not completed. Outstanding attempts are
    /// expired with it; an attempt already under admin review blocks the
    /// cancellation so a decision in flight is never pulled out from under
    /// the reviewer.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::Conflict(format!(
                "order in status {} cannot be cancelled",
                order.status.as_str()
            )));
        }

        let attempts = PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        if attempts
            .iter()
            .any(|a| a.status == PaymentAttemptStatus::AwaitingAdminApproval)
        {
            return Err(ServiceError::Conflict(
                "a payment attempt is awaiting admin review".to_string(),
            ));
        }

        for attempt in attempts
            .into_iter()
            .filter(|a| a.status.is_expirable())
        {
            // A loss here means the attempt moved concurrently; the order
            // cancellation below still decides the outcome.
            let _ = expire_attempt(&txn, &attempt).await?;
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancelled_reason = Set(reason);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(order.version + 1);
        let cancelled = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        info!(order_id = %order_id, "order cancelled");
        Ok(cancelled)
    }

    /// Soft-deletes an order from listings.
    #[instrument(skip(self))]
    pub async fn archive_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let order = self.get_order(order_id).await?;

        let mut active: order::ActiveModel = order.clone().into();
        active.is_archived = Set(true);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(order.version + 1);
        Ok(active.update(&*self.db).await?)
    }

    /// Cancels pending-payment orders whose payment window elapsed with no
    /// live attempt. Invoked by the background sweeper.
    pub async fn cancel_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let stale = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::PendingPayment))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0u64;
        for order in stale {
            let live = PaymentAttempt::find()
                .filter(payment_attempt::Column::OrderId.eq(order.id))
                .filter(
                    payment_attempt::Column::Status.is_in([
                        PaymentAttemptStatus::Draft,
                        PaymentAttemptStatus::PendingPayment,
                        PaymentAttemptStatus::AwaitingReceiptUpload,
                        PaymentAttemptStatus::AwaitingAdminApproval,
                        PaymentAttemptStatus::Paid,
                    ]),
                )
                .count(&*self.db)
                .await?;

            if live > 0 {
                continue;
            }

            match self
                .cancel_order(order.id, Some("payment window elapsed".to_string()))
                .await
            {
                Ok(_) => cancelled += 1,
                Err(ServiceError::Conflict(_)) => continue,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "failed to cancel stale order");
                }
            }
        }

        Ok(cancelled)
    }
}

/// Expires one attempt with its audit row; shared with the sweeper path.
/// Returns false when another writer moved the attempt first (version check
/// matched zero rows).
pub(crate) async fn expire_attempt(
    conn: &impl ConnectionTrait,
    attempt: &PaymentAttemptModel,
) -> Result<bool, ServiceError> {
    use crate::entities::payment_audit::AuditAction;
    use crate::services::audit::{self, AuditEntry};

    let update = payment_attempt::ActiveModel {
        status: Set(PaymentAttemptStatus::Expired),
        updated_at: Set(Some(Utc::now())),
        version: Set(attempt.version + 1),
        ..Default::default()
    };
    let result = PaymentAttempt::update_many()
        .set(update)
        .filter(payment_attempt::Column::Id.eq(attempt.id))
        .filter(payment_attempt::Column::Version.eq(attempt.version))
        .filter(payment_attempt::Column::Status.eq(attempt.status))
        .exec(conn)
        .await?;
    if result.rows_affected != 1 {
        return Ok(false);
    }

    audit::append(
        conn,
        AuditEntry::new(attempt.id, AuditAction::AttemptExpired)
            .order(attempt.order_id)
            .transition(attempt.status.as_str(), PaymentAttemptStatus::Expired.as_str())
            .amount(attempt.amount),
    )
    .await?;

    Ok(true)
}

pub(crate) fn model_to_response(model: OrderModel) -> Result<OrderResponse, ServiceError> {
    let items = model.snapshot_items()?;
    Ok(OrderResponse {
        id: model.id,
        order_number: model.order_number,
        student_id: model.student_id,
        status: model.status,
        total_amount: model.total_amount,
        currency: model.currency,
        items,
        cancelled_reason: model.cancelled_reason,
        created_at: model.created_at,
    })
}

/// Human-readable order number, unique by construction from the order id.
pub(crate) fn generate_order_number(order_id: Uuid) -> String {
    format!(
        "ORD-{}",
        order_id.simple().to_string()[..8].to_uppercase()
    )
}
