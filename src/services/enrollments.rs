use crate::{
    collaborators::CourseCatalog,
    entities::enrollment::{self, EnrollmentPaymentStatus, EnrollmentStatus},
    entities::installment_payment::{self, InstallmentStatus},
    entities::{Enrollment, EnrollmentModel, InstallmentPayment, InstallmentPaymentModel},
    errors::ServiceError,
    events::{outbox, Event, EventSender},
    services::accounting,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Service owning the enrollment aggregate: entitlements, payment accounting
/// and installment plans.
///
/// Crediting and debiting are exposed as connection-scoped helpers
/// ([`find_active`], [`get_or_create`], [`credit`], [`debit`]) so the payment
/// review transaction can touch enrollments inside its own transaction
/// boundary; the service methods wrap those helpers for standalone use cases.
#[derive(Clone)]
pub struct EnrollmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn CourseCatalog>,
}

/// The student's standing for one course, as reported to callers.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrollmentStatusView {
    pub enrolled: bool,
    pub enrollment_id: Option<Uuid>,
    pub payment_status: Option<EnrollmentPaymentStatus>,
    pub status: Option<EnrollmentStatus>,
    #[schema(value_type = Option<String>, example = "250000")]
    pub remaining_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateInstallmentPlanRequest {
    /// Number of obligations the remaining balance is divided into
    #[validate(range(min = 2, max = 12, message = "Installment count must be between 2 and 12"))]
    pub installments: u32,
    /// Due date of the first installment; defaults to one interval from now
    pub first_due_date: Option<DateTime<Utc>>,
    /// Days between consecutive due dates
    #[validate(range(min = 7, max = 90, message = "Installment interval must be 7 to 90 days"))]
    pub interval_days: i64,
}

impl EnrollmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn CourseCatalog>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    /// Enrolls a student into a zero-price course directly, bypassing the
    /// order/payment pipeline. The enrollment is immediately fully paid.
    #[instrument(skip(self))]
    pub async fn enroll_free(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<EnrollmentModel, ServiceError> {
        let course = self
            .catalog
            .course(course_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("Course {} not found", course_id)))?;

        if course.price > Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "course is not free; checkout is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        if find_active(&txn, student_id, course_id).await?.is_some() {
            return Err(ServiceError::Conflict(
                "student is already enrolled in this course".to_string(),
            ));
        }

        let (model, _) = get_or_create(&txn, student_id, course_id, Decimal::ZERO).await?;
        outbox::enqueue(
            &txn,
            "enrollment",
            Some(model.id),
            &Event::EnrollmentCreated {
                enrollment_id: model.id,
                student_id,
                course_id,
            },
        )
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::EnrollmentCreated {
                enrollment_id: model.id,
                student_id,
                course_id,
            })
            .await;

        info!(enrollment_id = %model.id, student_id = %student_id, "free enrollment created");
        Ok(model)
    }

    /// Reports whether a student holds a course and how much is still owed.
    #[instrument(skip(self))]
    pub async fn get_status(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<EnrollmentStatusView, ServiceError> {
        match find_active(&*self.db, student_id, course_id).await? {
            Some(enrollment) => Ok(EnrollmentStatusView {
                enrolled: true,
                enrollment_id: Some(enrollment.id),
                payment_status: Some(enrollment.payment_status),
                status: Some(enrollment.status),
                remaining_amount: Some(enrollment.remaining_amount()),
            }),
            None => Ok(EnrollmentStatusView {
                enrolled: false,
                enrollment_id: None,
                payment_status: None,
                status: None,
                remaining_amount: None,
            }),
        }
    }

    /// All enrollments for a student, newest first.
    pub async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<EnrollmentModel>, ServiceError> {
        Ok(Enrollment::find()
            .filter(enrollment::Column::StudentId.eq(student_id))
            .order_by_desc(enrollment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Installments of an enrollment, ordered by schedule.
    pub async fn list_installments(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<InstallmentPaymentModel>, ServiceError> {
        Ok(InstallmentPayment::find()
            .filter(installment_payment::Column::EnrollmentId.eq(enrollment_id))
            .order_by_asc(installment_payment::Column::InstallmentNumber)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentModel, ServiceError> {
        Enrollment::find_by_id(enrollment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Enrollment {} not found", enrollment_id))
            })
    }

    /// Creates an installment plan dividing the total amount across N dated
    /// obligations. Any amount already paid is waterfalled over the earliest
    /// installments so the plan starts consistent.
    #[instrument(skip(self, request))]
    pub async fn create_installment_plan(
        &self,
        enrollment_id: Uuid,
        request: CreateInstallmentPlanRequest,
    ) -> Result<Vec<InstallmentPaymentModel>, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let enrollment = Enrollment::find_by_id(enrollment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Enrollment {} not found", enrollment_id))
            })?;

        if enrollment.has_installment_plan {
            return Err(ServiceError::Conflict(
                "enrollment already has an installment plan".to_string(),
            ));
        }
        if enrollment.status != EnrollmentStatus::Active {
            return Err(ServiceError::Conflict(
                "installment plans require an active enrollment".to_string(),
            ));
        }
        if enrollment.payment_status == EnrollmentPaymentStatus::Paid {
            return Err(ServiceError::Conflict(
                "enrollment is already fully paid".to_string(),
            ));
        }

        let course = self
            .catalog
            .course(enrollment.course_id)
            .await
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Course {} not found", enrollment.course_id))
            })?;
        if !course.allow_installments {
            return Err(ServiceError::ValidationError(
                "this course does not allow installment plans".to_string(),
            ));
        }

        let now = Utc::now();
        let interval = Duration::days(request.interval_days);
        let first_due = request.first_due_date.unwrap_or(now + interval);
        let amounts = accounting::split_even(enrollment.total_amount, request.installments);

        let mut created = Vec::with_capacity(amounts.len());
        for (index, amount) in amounts.iter().enumerate() {
            let row = installment_payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                enrollment_id: Set(enrollment.id),
                installment_number: Set(index as i32 + 1),
                amount: Set(*amount),
                paid_amount: Set(Decimal::ZERO),
                due_date: Set(first_due + interval * index as i32),
                status: Set(InstallmentStatus::Unpaid),
                created_at: Set(now),
                updated_at: Set(None),
            };
            created.push(row.insert(&txn).await?);
        }

        let mut active: enrollment::ActiveModel = enrollment.clone().into();
        active.has_installment_plan = Set(true);
        active.updated_at = Set(Some(now));
        active.version = Set(enrollment.version + 1);
        active.update(&txn).await?;

        // Seed the schedule with what was already paid, keeping the
        // sum-of-installments invariant from the first moment.
        if enrollment.paid_amount > Decimal::ZERO {
            apply_to_installments(&txn, enrollment.id, enrollment.paid_amount).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::InstallmentPlanCreated {
                enrollment_id,
                installments: request.installments,
            })
            .await;

        info!(
            enrollment_id = %enrollment_id,
            installments = request.installments,
            "installment plan created"
        );
        self.list_installments(enrollment_id).await
    }

    /// Marks an enrollment completed (course finished).
    #[instrument(skip(self))]
    pub async fn complete_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentModel, ServiceError> {
        self.transition(enrollment_id, EnrollmentStatus::Completed, None)
            .await
    }

    /// Cancels an enrollment; a reason is mandatory.
    #[instrument(skip(self))]
    pub async fn cancel_enrollment(
        &self,
        enrollment_id: Uuid,
        reason: String,
    ) -> Result<EnrollmentModel, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "cancellation reason is required".to_string(),
            ));
        }

        let model = self
            .transition(enrollment_id, EnrollmentStatus::Cancelled, Some(reason))
            .await?;

        self.event_sender
            .send_or_log(Event::EnrollmentCancelled(enrollment_id))
            .await;
        Ok(model)
    }

    /// Suspends an active enrollment.
    pub async fn suspend_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentModel, ServiceError> {
        self.transition(enrollment_id, EnrollmentStatus::Suspended, None)
            .await
    }

    /// Re-activates a suspended enrollment.
    pub async fn resume_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentModel, ServiceError> {
        self.transition(enrollment_id, EnrollmentStatus::Active, None)
            .await
    }

    async fn transition(
        &self,
        enrollment_id: Uuid,
        next: EnrollmentStatus,
        reason: Option<String>,
    ) -> Result<EnrollmentModel, ServiceError> {
        let txn = self.db.begin().await?;

        let enrollment = Enrollment::find_by_id(enrollment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Enrollment {} not found", enrollment_id))
            })?;

        if !enrollment.status.can_transition_to(next) {
            return Err(ServiceError::Conflict(format!(
                "enrollment cannot move from {:?} to {:?}",
                enrollment.status, next
            )));
        }

        let mut active: enrollment::ActiveModel = enrollment.clone().into();
        active.status = Set(next);
        if reason.is_some() {
            active.cancelled_reason = Set(reason);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(enrollment.version + 1);
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Connection-scoped helpers shared with the payment review transaction.
// ---------------------------------------------------------------------------

/// Finds the non-cancelled enrollment for (student, course), if any.
pub(crate) async fn find_active(
    conn: &impl ConnectionTrait,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<Option<EnrollmentModel>, ServiceError> {
    Ok(Enrollment::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::Status.ne(EnrollmentStatus::Cancelled))
        .one(conn)
        .await?)
}

/// Locates the enrollment for (student, course) or creates one with the given
/// total. Returns the model and whether it was created.
pub(crate) async fn get_or_create(
    conn: &impl ConnectionTrait,
    student_id: Uuid,
    course_id: Uuid,
    total_amount: Decimal,
) -> Result<(EnrollmentModel, bool), ServiceError> {
    if let Some(existing) = find_active(conn, student_id, course_id).await? {
        return Ok((existing, false));
    }

    let now = Utc::now();
    let row = enrollment::ActiveModel {
        id: Set(Uuid::new_v4()),
        student_id: Set(student_id),
        course_id: Set(course_id),
        total_amount: Set(total_amount),
        paid_amount: Set(Decimal::ZERO),
        payment_status: Set(EnrollmentPaymentStatus::from_amounts(
            Decimal::ZERO,
            total_amount,
        )),
        status: Set(EnrollmentStatus::Active),
        cancelled_reason: Set(None),
        has_installment_plan: Set(false),
        created_at: Set(now),
        updated_at: Set(None),
        version: Set(1),
    };
    Ok((row.insert(conn).await?, true))
}

/// Credits a payment against an enrollment. The credit clamps to the
/// remaining balance; payment status is recomputed and, when an installment
/// plan exists, the credit waterfalls across unpaid installments in due-date
/// order so `sum(installment.paid_amount) == enrollment.paid_amount` holds.
/// Returns the updated model and the amount actually credited.
pub(crate) async fn credit(
    conn: &impl ConnectionTrait,
    enrollment: EnrollmentModel,
    amount: Decimal,
) -> Result<(EnrollmentModel, Decimal), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "credit amount cannot be negative".to_string(),
        ));
    }

    let credited = amount.min(enrollment.remaining_amount());
    let new_paid = enrollment.paid_amount + credited;

    let mut active: enrollment::ActiveModel = enrollment.clone().into();
    active.paid_amount = Set(new_paid);
    active.payment_status = Set(EnrollmentPaymentStatus::from_amounts(
        new_paid,
        enrollment.total_amount,
    ));
    active.updated_at = Set(Some(Utc::now()));
    active.version = Set(enrollment.version + 1);
    let updated = active.update(conn).await?;

    if updated.has_installment_plan && credited > Decimal::ZERO {
        apply_to_installments(conn, updated.id, credited).await?;
    }

    Ok((updated, credited))
}

/// Debits a refunded amount from an enrollment, clamping at zero and
/// unwinding installments newest-first to preserve the plan invariant.
pub(crate) async fn debit(
    conn: &impl ConnectionTrait,
    enrollment: EnrollmentModel,
    amount: Decimal,
) -> Result<(EnrollmentModel, Decimal), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "debit amount cannot be negative".to_string(),
        ));
    }

    let debited = amount.min(enrollment.paid_amount);
    let new_paid = enrollment.paid_amount - debited;

    let mut active: enrollment::ActiveModel = enrollment.clone().into();
    active.paid_amount = Set(new_paid);
    active.payment_status = Set(EnrollmentPaymentStatus::from_amounts(
        new_paid,
        enrollment.total_amount,
    ));
    active.updated_at = Set(Some(Utc::now()));
    active.version = Set(enrollment.version + 1);
    let updated = active.update(conn).await?;

    if updated.has_installment_plan && debited > Decimal::ZERO {
        debit_installments(conn, updated.id, debited).await?;
    }

    Ok((updated, debited))
}

/// Waterfalls `amount` across unpaid installments in due-date order.
async fn apply_to_installments(
    conn: &impl ConnectionTrait,
    enrollment_id: Uuid,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let installments = InstallmentPayment::find()
        .filter(installment_payment::Column::EnrollmentId.eq(enrollment_id))
        .order_by_asc(installment_payment::Column::DueDate)
        .order_by_asc(installment_payment::Column::InstallmentNumber)
        .all(conn)
        .await?;

    let mut remaining = amount;
    for installment in installments {
        if remaining <= Decimal::ZERO {
            break;
        }
        let open = installment.remaining_amount();
        if open.is_zero() {
            continue;
        }

        let applied = remaining.min(open);
        let new_paid = installment.paid_amount + applied;

        let mut active: installment_payment::ActiveModel = installment.clone().into();
        active.paid_amount = Set(new_paid);
        active.status = Set(InstallmentStatus::from_amounts(new_paid, installment.amount));
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;

        remaining -= applied;
    }

    Ok(())
}

/// Reverses `amount` across installments in reverse schedule order.
async fn debit_installments(
    conn: &impl ConnectionTrait,
    enrollment_id: Uuid,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let installments = InstallmentPayment::find()
        .filter(installment_payment::Column::EnrollmentId.eq(enrollment_id))
        .order_by_desc(installment_payment::Column::DueDate)
        .order_by_desc(installment_payment::Column::InstallmentNumber)
        .all(conn)
        .await?;

    let mut remaining = amount;
    for installment in installments {
        if remaining <= Decimal::ZERO {
            break;
        }
        if installment.paid_amount.is_zero() {
            continue;
        }

        let reversed = remaining.min(installment.paid_amount);
        let new_paid = installment.paid_amount - reversed;

        let mut active: installment_payment::ActiveModel = installment.clone().into();
        active.paid_amount = Set(new_paid);
        active.status = Set(InstallmentStatus::from_amounts(new_paid, installment.amount));
        active.updated_at = Set(Some(Utc::now()));
        active.update(conn).await?;

        remaining -= reversed;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credit_clamps_at_total() {
        // Pure check of the clamp arithmetic used by `credit`.
        let total = dec!(500000);
        let paid = dec!(400000);
        let remaining = (total - paid).max(Decimal::ZERO);
        let credited = dec!(200000).min(remaining);
        assert_eq!(credited, dec!(100000));
        assert_eq!(
            EnrollmentPaymentStatus::from_amounts(paid + credited, total),
            EnrollmentPaymentStatus::Paid
        );
    }

    #[test]
    fn installment_plan_request_bounds() {
        let ok = CreateInstallmentPlanRequest {
            installments: 4,
            first_due_date: None,
            interval_days: 30,
        };
        assert!(ok.validate().is_ok());

        let too_many = CreateInstallmentPlanRequest {
            installments: 24,
            first_due_date: None,
            interval_days: 30,
        };
        assert!(too_many.validate().is_err());

        let too_short = CreateInstallmentPlanRequest {
            installments: 3,
            first_due_date: None,
            interval_days: 1,
        };
        assert!(too_short.validate().is_err());
    }

    #[test]
    fn waterfall_order_fills_earliest_first() {
        // Mirror of the waterfall arithmetic: three 100k installments, a
        // 250k credit fills the first two and half the third.
        let amounts = [dec!(100000), dec!(100000), dec!(100000)];
        let mut remaining = dec!(250000);
        let mut paid = Vec::new();
        for amount in amounts {
            let applied = remaining.min(amount);
            paid.push(applied);
            remaining -= applied;
        }
        assert_eq!(paid, vec![dec!(100000), dec!(100000), dec!(50000)]);
        assert_eq!(remaining, Decimal::ZERO);
    }
}
