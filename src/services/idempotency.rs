//! Database-backed idempotency records.
//!
//! Each replay-sensitive operation writes one record keyed by
//! (idempotency_key, user_id, operation) inside the operation's own
//! transaction. A retry with the same key replays the stored response; a
//! different request under the same key is rejected. The unique index on the
//! key triple makes the second of two concurrent claims fail at insert time.

use crate::entities::idempotency_record::{self};
use crate::entities::IdempotencyRecord;
use crate::errors::ServiceError;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter, Set,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Operation tag for the admin review use case.
pub const OP_PAYMENT_REVIEW: &str = "payment_review";

/// Outcome of claiming an idempotency key.
#[derive(Debug)]
pub enum Claim {
    /// First time this key is seen; the caller should execute and then call
    /// [`complete`].
    New,
    /// The operation already ran; the stored response should be returned
    /// without re-executing.
    Replay(serde_json::Value),
}

/// Hashes the canonical request representation. Stored alongside the key so
/// a different request reusing the same key is detected.
pub fn request_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Key used when the admin client does not supply one: stable for the same
/// (attempt, admin, decision) triple so duplicate clicks coalesce.
pub fn derived_review_key(attempt_id: Uuid, admin_id: Uuid, approve: bool) -> String {
    request_fingerprint(&[
        &attempt_id.to_string(),
        &admin_id.to_string(),
        if approve { "approve" } else { "reject" },
    ])
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    text.contains("unique") || text.contains("duplicate")
}

/// Claims the key for this operation. Must run inside the operation's
/// transaction so an aborted operation releases its claim.
pub async fn claim(
    conn: &impl ConnectionTrait,
    key: &str,
    user_id: Uuid,
    operation: &str,
    request_hash: &str,
    ttl_hours: i64,
) -> Result<Claim, ServiceError> {
    let existing = IdempotencyRecord::find()
        .filter(idempotency_record::Column::IdempotencyKey.eq(key))
        .filter(idempotency_record::Column::UserId.eq(user_id))
        .filter(idempotency_record::Column::Operation.eq(operation))
        .one(conn)
        .await?;

    if let Some(record) = existing {
        if record.expires_at < Utc::now() {
            // Stale record; the key is free to be reused.
            record.delete(conn).await?;
        } else if record.request_hash != request_hash {
            return Err(ServiceError::Conflict(
                "idempotency key reused with a different request".to_string(),
            ));
        } else if record.completed {
            let response = record.response.clone().ok_or_else(|| {
                ServiceError::InternalError("completed idempotency record without response".into())
            })?;
            return Ok(Claim::Replay(response));
        } else {
            return Err(ServiceError::Conflict(
                "operation with this idempotency key is already in progress".to_string(),
            ));
        }
    }

    let row = idempotency_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        idempotency_key: Set(key.to_string()),
        user_id: Set(user_id),
        operation: Set(operation.to_string()),
        request_hash: Set(request_hash.to_string()),
        completed: Set(false),
        response: Set(None),
        expires_at: Set(Utc::now() + Duration::hours(ttl_hours)),
        created_at: Set(Utc::now()),
    };

    match row.insert(conn).await {
        Ok(_) => Ok(Claim::New),
        Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(
            "operation with this idempotency key is already in progress".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Marks the claimed operation complete and stores its response for replay.
pub async fn complete(
    conn: &impl ConnectionTrait,
    key: &str,
    user_id: Uuid,
    operation: &str,
    response: &serde_json::Value,
) -> Result<(), ServiceError> {
    let record = IdempotencyRecord::find()
        .filter(idempotency_record::Column::IdempotencyKey.eq(key))
        .filter(idempotency_record::Column::UserId.eq(user_id))
        .filter(idempotency_record::Column::Operation.eq(operation))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError("idempotency record vanished before completion".into())
        })?;

    let mut active: idempotency_record::ActiveModel = record.into();
    active.completed = Set(true);
    active.response = Set(Some(response.clone()));
    active.update(conn).await?;
    Ok(())
}

/// Removes expired records. Called by the background sweeper.
pub async fn purge_expired(
    conn: &impl ConnectionTrait,
    now: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let result = IdempotencyRecord::delete_many()
        .filter(idempotency_record::Column::ExpiresAt.lt(now))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
