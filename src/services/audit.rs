use crate::entities::payment_audit::{self, AuditAction};
use crate::entities::{PaymentAudit, PaymentAuditModel};
use crate::errors::ServiceError;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// One audit row to be appended. Rows are written inside the transaction of
/// the transition they describe; there is deliberately no update or delete
/// path in this module.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub payment_attempt_id: Uuid,
    pub order_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(payment_attempt_id: Uuid, action: AuditAction) -> Self {
        Self {
            payment_attempt_id,
            order_id: None,
            actor_id: None,
            action,
            from_status: None,
            to_status: None,
            amount: None,
            reason: None,
        }
    }

    pub fn order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn transition(mut self, from: &str, to: &str) -> Self {
        self.from_status = Some(from.to_string());
        self.to_status = Some(to.to_string());
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Appends an audit row. Must be called on the same connection/transaction as
/// the state change it records.
pub async fn append(
    conn: &impl ConnectionTrait,
    entry: AuditEntry,
) -> Result<PaymentAuditModel, ServiceError> {
    let row = payment_audit::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_attempt_id: Set(entry.payment_attempt_id),
        order_id: Set(entry.order_id),
        actor_id: Set(entry.actor_id),
        action: Set(entry.action),
        from_status: Set(entry.from_status),
        to_status: Set(entry.to_status),
        amount: Set(entry.amount),
        reason: Set(entry.reason),
        created_at: Set(Utc::now()),
    };
    Ok(row.insert(conn).await?)
}

/// All audit rows for an attempt, oldest first.
pub async fn list_for_attempt(
    conn: &impl ConnectionTrait,
    attempt_id: Uuid,
) -> Result<Vec<PaymentAuditModel>, ServiceError> {
    Ok(PaymentAudit::find()
        .filter(payment_audit::Column::PaymentAttemptId.eq(attempt_id))
        .order_by_asc(payment_audit::Column::CreatedAt)
        .all(conn)
        .await?)
}
