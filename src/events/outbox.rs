use crate::entities::outbox_event::{self, OutboxStatus};
use crate::entities::OutboxEvent;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;
const POLL_INTERVAL_MS: u64 = 500;
const BATCH_SIZE: u64 = 50;

/// Enqueues a domain event into the outbox. Call inside the same transaction
/// as the state change that produced the event; the worker dispatches it
/// after commit.
pub async fn enqueue(
    conn: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    event: &Event,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let row = outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event.type_name().to_string()),
        payload: Set(serde_json::to_value(event)?),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        created_at: Set(now),
        updated_at: Set(None),
    };
    row.insert(conn).await?;
    Ok(())
}

/// Spawns the background worker that drains pending outbox rows into the
/// in-process event channel.
pub fn start_worker(db: Arc<DatabaseConnection>, sender: EventSender) {
    tokio::spawn(async move {
        info!("outbox worker started");
        loop {
            if let Err(e) = drain_once(&db, &sender, BATCH_SIZE).await {
                error!("outbox worker error: {}", e);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    });
}

/// Processes one batch of due pending events. Returns the number dispatched.
pub async fn drain_once(
    db: &DatabaseConnection,
    sender: &EventSender,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let due = OutboxEvent::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_event::Column::AvailableAt.lte(now))
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut dispatched = 0usize;
    for row in due {
        let event: Option<Event> = serde_json::from_value(row.payload.clone()).ok();
        let attempts = row.attempts + 1;

        let delivered = match event {
            Some(event) => sender.send(event).await.is_ok(),
            None => {
                warn!(outbox_id = %row.id, event_type = %row.event_type, "undecodable outbox payload");
                false
            }
        };

        let mut update: outbox_event::ActiveModel = row.into();
        update.attempts = Set(attempts);
        update.updated_at = Set(Some(Utc::now()));

        if delivered {
            update.status = Set(OutboxStatus::Delivered);
            dispatched += 1;
        } else if attempts < MAX_ATTEMPTS {
            // Exponential backoff before the next delivery attempt.
            let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
            update.available_at = Set(Utc::now() + ChronoDuration::seconds(backoff));
        } else {
            update.status = Set(OutboxStatus::Failed);
            warn!("outbox event exceeded max delivery attempts");
        }
        update.update(db).await?;
    }

    Ok(dispatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn backoff_grows_exponentially() {
        let delays: Vec<i64> = (1..=4)
            .map(|attempts: u32| BASE_BACKOFF_SECS.saturating_pow(attempts))
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16]);
    }

    #[test]
    fn event_payload_round_trips() {
        let event = Event::PaymentApproved {
            attempt_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: dec!(500000),
        };

        let payload = serde_json::to_value(&event).expect("serialize event");
        let decoded: Event = serde_json::from_value(payload).expect("decode event");
        match decoded {
            Event::PaymentApproved { amount, .. } => assert_eq!(amount, dec!(500000)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
