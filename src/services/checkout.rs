use crate::{
    entities::cart::{self, CartStatus},
    entities::order::{self, OrderItemSnapshot, OrderStatus},
    entities::{Cart, CartItem},
    errors::ServiceError,
    events::{outbox, Event, EventSender},
    services::enrollments,
    services::orders::{self, OrderResponse},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Converts a student's active cart into an order.
///
/// The cart contents are frozen into the order's JSON snapshot at this point;
/// catalog price changes and later cart mutation never reach an existing
/// order. Courses the student already owns are filtered out before the
/// snapshot is taken, and a cart reduced to nothing is rejected.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Result of a checkout. When every surviving item was free the order
/// completes immediately and the enrollments are listed here.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CheckoutOutcome {
    pub order: OrderResponse,
    /// Courses dropped because the student already owns them
    pub skipped_courses: Vec<Uuid>,
    /// Enrollments granted directly (zero-total orders only)
    pub enrollment_ids: Vec<Uuid>,
}

impl CheckoutService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Checks out the student's active cart.
    #[instrument(skip(self))]
    pub async fn checkout(&self, student_id: Uuid) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::StudentId.eq(student_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .order_by_desc(cart::Column::CreatedAt)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let items = cart.find_related(CartItem).all(&txn).await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        // Drop courses the student already owns.
        let mut snapshot = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();
        for item in &items {
            if enrollments::find_active(&txn, student_id, item.course_id)
                .await?
                .is_some()
            {
                skipped.push(item.course_id);
            } else {
                snapshot.push(OrderItemSnapshot {
                    course_id: item.course_id,
                    title: item.title.clone(),
                    thumbnail_url: item.thumbnail_url.clone(),
                    instructor_name: item.instructor_name.clone(),
                    unit_price: item.unit_price,
                });
            }
        }

        if snapshot.is_empty() {
            return Err(ServiceError::Conflict(
                "all courses in the cart are already owned".to_string(),
            ));
        }

        let total: Decimal = snapshot.iter().map(|item| item.unit_price).sum();
        let is_free = total.is_zero();
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order_row = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(orders::generate_order_number(order_id)),
            student_id: Set(student_id),
            // A zero-total order has nothing left to pay.
            status: Set(if is_free {
                OrderStatus::Completed
            } else {
                OrderStatus::PendingPayment
            }),
            items_snapshot: Set(serde_json::to_value(&snapshot)?),
            total_amount: Set(total),
            currency: Set(cart.currency.clone()),
            cancelled_reason: Set(None),
            is_archived: Set(false),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };
        let order_model = order_row.insert(&txn).await?;

        // Zero-total orders grant their enrollments right away; paid orders
        // wait for the payment pipeline.
        let mut enrollment_ids = Vec::new();
        if is_free {
            for item in &snapshot {
                let (enrollment, created) =
                    enrollments::get_or_create(&txn, student_id, item.course_id, Decimal::ZERO)
                        .await?;
                if created {
                    outbox::enqueue(
                        &txn,
                        "enrollment",
                        Some(enrollment.id),
                        &Event::EnrollmentCreated {
                            enrollment_id: enrollment.id,
                            student_id,
                            course_id: item.course_id,
                        },
                    )
                    .await?;
                }
                enrollment_ids.push(enrollment.id);
            }
        }

        // The cart is consumed by checkout regardless of outcome shape.
        let mut cart_update: cart::ActiveModel = cart.clone().into();
        cart_update.status = Set(CartStatus::Converted);
        cart_update.updated_at = Set(now);
        cart_update.update(&txn).await?;

        outbox::enqueue(&txn, "order", Some(order_id), &Event::OrderCreated(order_id)).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id: cart.id,
                order_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(
            order_id = %order_id,
            cart_id = %cart.id,
            total = %total,
            skipped = skipped.len(),
            "checkout completed"
        );

        Ok(CheckoutOutcome {
            order: orders::model_to_response(order_model)?,
            skipped_courses: skipped,
            enrollment_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_total_is_sum_of_surviving_items() {
        let items = [
            OrderItemSnapshot {
                course_id: Uuid::new_v4(),
                title: "A".into(),
                thumbnail_url: None,
                instructor_name: None,
                unit_price: dec!(500000),
            },
            OrderItemSnapshot {
                course_id: Uuid::new_v4(),
                title: "B".into(),
                thumbnail_url: None,
                instructor_name: None,
                unit_price: dec!(250000),
            },
        ];
        let total: Decimal = items.iter().map(|i| i.unit_price).sum();
        assert_eq!(total, dec!(750000));
    }

    #[test]
    fn zero_total_means_immediate_completion() {
        let total = dec!(0);
        let status = if total.is_zero() {
            OrderStatus::Completed
        } else {
            OrderStatus::PendingPayment
        };
        assert_eq!(status, OrderStatus::Completed);
    }
}
