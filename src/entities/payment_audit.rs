use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a payment-state transition. Rows are inserted in the
/// same transaction as the transition they describe and are never updated or
/// deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payment_attempt_id: Uuid,
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    #[sea_orm(nullable)]
    pub from_status: Option<String>,
    #[sea_orm(nullable)]
    pub to_status: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment_attempt::Entity",
        from = "Column::PaymentAttemptId",
        to = "super::payment_attempt::Column::Id"
    )]
    PaymentAttempt,
}

impl Related<super::payment_attempt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentAttempt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// The set of auditable actions in the payment pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    #[sea_orm(string_value = "attempt_created")]
    AttemptCreated,
    #[sea_orm(string_value = "receipt_uploaded")]
    ReceiptUploaded,
    #[sea_orm(string_value = "admin_approved")]
    AdminApproved,
    #[sea_orm(string_value = "admin_rejected")]
    AdminRejected,
    #[sea_orm(string_value = "enrollment_created")]
    EnrollmentCreated,
    #[sea_orm(string_value = "enrollment_credit_failed")]
    EnrollmentCreditFailed,
    #[sea_orm(string_value = "order_completed")]
    OrderCompleted,
    #[sea_orm(string_value = "attempt_expired")]
    AttemptExpired,
    #[sea_orm(string_value = "payment_refunded")]
    PaymentRefunded,
}
