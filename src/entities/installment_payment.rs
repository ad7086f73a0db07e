use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scheduled obligation within an enrollment's installment plan.
///
/// Only `Unpaid`, `Partial` and `Paid` are ever stored; overdue is derived
/// from the due date at read time via [`Model::effective_state`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "installment_payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub installment_number: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub paid_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::enrollment::Entity",
        from = "Column::EnrollmentId",
        to = "super::enrollment::Column::Id"
    )]
    Enrollment,
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Persisted installment payment progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl InstallmentStatus {
    pub fn from_amounts(paid: Decimal, amount: Decimal) -> Self {
        if paid >= amount {
            InstallmentStatus::Paid
        } else if paid > Decimal::ZERO {
            InstallmentStatus::Partial
        } else {
            InstallmentStatus::Unpaid
        }
    }
}

/// Installment state as reported to callers, including the derived overdue
/// marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentState {
    Unpaid,
    Partial,
    Paid,
    Overdue,
}

impl Model {
    pub fn remaining_amount(&self) -> Decimal {
        (self.amount - self.paid_amount).max(Decimal::ZERO)
    }

    /// The state shown to callers: overdue when the due date has passed and
    /// the installment is not fully paid.
    pub fn effective_state(&self, now: DateTime<Utc>) -> InstallmentState {
        match self.status {
            InstallmentStatus::Paid => InstallmentState::Paid,
            InstallmentStatus::Partial if self.due_date < now => InstallmentState::Overdue,
            InstallmentStatus::Partial => InstallmentState::Partial,
            InstallmentStatus::Unpaid if self.due_date < now => InstallmentState::Overdue,
            InstallmentStatus::Unpaid => InstallmentState::Unpaid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn installment(paid: Decimal, amount: Decimal, due_in_days: i64) -> Model {
        Model {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            installment_number: 1,
            amount,
            paid_amount: paid,
            due_date: Utc::now() + Duration::days(due_in_days),
            status: InstallmentStatus::from_amounts(paid, amount),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn overdue_is_derived_not_stored() {
        let late = installment(dec!(0), dec!(100000), -3);
        assert_eq!(late.status, InstallmentStatus::Unpaid);
        assert_eq!(late.effective_state(Utc::now()), InstallmentState::Overdue);
    }

    #[test]
    fn partially_paid_past_due_reports_overdue() {
        let late = installment(dec!(40000), dec!(100000), -1);
        assert_eq!(late.status, InstallmentStatus::Partial);
        assert_eq!(late.effective_state(Utc::now()), InstallmentState::Overdue);
    }

    #[test]
    fn fully_paid_is_never_overdue() {
        let settled = installment(dec!(100000), dec!(100000), -30);
        assert_eq!(settled.effective_state(Utc::now()), InstallmentState::Paid);
    }

    #[test]
    fn future_due_date_keeps_plain_state() {
        let upcoming = installment(dec!(0), dec!(100000), 10);
        assert_eq!(upcoming.effective_state(Utc::now()), InstallmentState::Unpaid);

        let partial = installment(dec!(10000), dec!(100000), 10);
        assert_eq!(partial.effective_state(Utc::now()), InstallmentState::Partial);
    }
}
