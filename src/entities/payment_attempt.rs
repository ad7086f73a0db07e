use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attempt to settle (part of) an order's balance through a specific
/// payment method. Manual attempts carry the receipt and admin review fields;
/// retries after failure are new attempts, never mutation of an old one.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub student_id: Uuid,
    pub method: PaymentMethod,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub currency: String,
    pub tracking_code: String,
    pub status: PaymentAttemptStatus,
    #[sea_orm(nullable)]
    pub receipt_url: Option<String>,
    #[sea_orm(nullable)]
    pub receipt_filename: Option<String>,
    #[sea_orm(nullable)]
    pub receipt_uploaded_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub reviewed_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub rejection_reason: Option<String>,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::payment_audit::Entity")]
    AuditEntries,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::payment_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment method enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "wallet")]
    Wallet,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "free")]
    Free,
}

/// Review state machine for a payment attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentAttemptStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    #[sea_orm(string_value = "awaiting_receipt_upload")]
    AwaitingReceiptUpload,
    #[sea_orm(string_value = "awaiting_admin_approval")]
    AwaitingAdminApproval,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl PaymentAttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentAttemptStatus::Paid
                | PaymentAttemptStatus::Failed
                | PaymentAttemptStatus::Expired
                | PaymentAttemptStatus::Refunded
        )
    }

    /// A receipt may be (re-)uploaded in these states; once reviewed, uploads
    /// are rejected.
    pub fn accepts_receipt(self) -> bool {
        matches!(
            self,
            PaymentAttemptStatus::AwaitingReceiptUpload
                | PaymentAttemptStatus::AwaitingAdminApproval
        )
    }

    /// Whether the time-based sweep may expire this attempt. Attempts under
    /// admin review wait indefinitely for a human decision.
    pub fn is_expirable(self) -> bool {
        matches!(
            self,
            PaymentAttemptStatus::Draft
                | PaymentAttemptStatus::PendingPayment
                | PaymentAttemptStatus::AwaitingReceiptUpload
        )
    }

    pub fn can_transition_to(self, next: PaymentAttemptStatus) -> bool {
        use PaymentAttemptStatus::*;
        match (self, next) {
            (Draft, PendingPayment) => true,
            (PendingPayment, AwaitingReceiptUpload) => true,
            (PendingPayment, AwaitingAdminApproval) => true,
            (AwaitingReceiptUpload, AwaitingAdminApproval) => true,
            (AwaitingAdminApproval, Paid) => true,
            (AwaitingAdminApproval, Failed) => true,
            (Paid, Refunded) => true,
            (from, Expired) => from.is_expirable(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentAttemptStatus::Draft => "draft",
            PaymentAttemptStatus::PendingPayment => "pending_payment",
            PaymentAttemptStatus::AwaitingReceiptUpload => "awaiting_receipt_upload",
            PaymentAttemptStatus::AwaitingAdminApproval => "awaiting_admin_approval",
            PaymentAttemptStatus::Paid => "paid",
            PaymentAttemptStatus::Failed => "failed",
            PaymentAttemptStatus::Expired => "expired",
            PaymentAttemptStatus::Refunded => "refunded",
        }
    }
}
