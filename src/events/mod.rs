use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod outbox;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// State changes are already committed by the time events fire, so a
    /// dropped notification must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("event dispatch failed for {:?}: {}", event, e);
        }
    }
}

/// Domain events emitted by the purchase-and-enrollment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, course_id: Uuid },
    CartItemRemoved { cart_id: Uuid, course_id: Uuid },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderCompleted(Uuid),
    OrderCancelled(Uuid),
    CheckoutCompleted { cart_id: Uuid, order_id: Uuid },

    // Payment events
    PaymentAttemptCreated(Uuid),
    ReceiptUploaded { attempt_id: Uuid },
    PaymentApproved {
        attempt_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    },
    PaymentRejected { attempt_id: Uuid },
    PaymentExpired(Uuid),
    PaymentRefunded(Uuid),

    // Enrollment events
    EnrollmentCreated {
        enrollment_id: Uuid,
        student_id: Uuid,
        course_id: Uuid,
    },
    EnrollmentCredited {
        enrollment_id: Uuid,
        amount: Decimal,
    },
    EnrollmentCancelled(Uuid),
    InstallmentPlanCreated {
        enrollment_id: Uuid,
        installments: u32,
    },
}

impl Event {
    /// Stable name used for outbox rows and log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::CartCreated(_) => "CartCreated",
            Event::CartItemAdded { .. } => "CartItemAdded",
            Event::CartItemRemoved { .. } => "CartItemRemoved",
            Event::CartCleared(_) => "CartCleared",
            Event::OrderCreated(_) => "OrderCreated",
            Event::OrderCompleted(_) => "OrderCompleted",
            Event::OrderCancelled(_) => "OrderCancelled",
            Event::CheckoutCompleted { .. } => "CheckoutCompleted",
            Event::PaymentAttemptCreated(_) => "PaymentAttemptCreated",
            Event::ReceiptUploaded { .. } => "ReceiptUploaded",
            Event::PaymentApproved { .. } => "PaymentApproved",
            Event::PaymentRejected { .. } => "PaymentRejected",
            Event::PaymentExpired(_) => "PaymentExpired",
            Event::PaymentRefunded(_) => "PaymentRefunded",
            Event::EnrollmentCreated { .. } => "EnrollmentCreated",
            Event::EnrollmentCredited { .. } => "EnrollmentCredited",
            Event::EnrollmentCancelled(_) => "EnrollmentCancelled",
            Event::InstallmentPlanCreated { .. } => "InstallmentPlanCreated",
        }
    }
}

/// In-process event loop. Downstream consumers (notifications, analytics,
/// cache invalidation) hang off this; the pipeline itself never depends on a
/// handler having run.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentApproved {
                attempt_id,
                order_id,
                amount,
            } => {
                info!(
                    attempt_id = %attempt_id,
                    order_id = %order_id,
                    amount = %amount,
                    "payment approved"
                );
            }
            Event::EnrollmentCreated {
                enrollment_id,
                student_id,
                course_id,
            } => {
                info!(
                    enrollment_id = %enrollment_id,
                    student_id = %student_id,
                    course_id = %course_id,
                    "enrollment created"
                );
            }
            other => {
                info!(event = other.type_name(), "event received");
            }
        }
    }

    info!("event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .expect("send should succeed");

        let received = rx.recv().await.expect("event expected");
        assert_eq!(received.type_name(), "OrderCreated");
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }

    #[test]
    fn type_names_are_stable() {
        let event = Event::PaymentApproved {
            attempt_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: Decimal::ONE,
        };
        assert_eq!(event.type_name(), "PaymentApproved");
        assert_eq!(
            Event::EnrollmentCancelled(Uuid::new_v4()).type_name(),
            "EnrollmentCancelled"
        );
    }
}
