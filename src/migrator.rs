use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_carts_tables::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_payment_attempts_table::Migration),
            Box::new(m20240301_000004_create_enrollments_tables::Migration),
            Box::new(m20240301_000005_create_payment_audit_log_table::Migration),
            Box::new(m20240301_000006_create_idempotency_records_table::Migration),
            Box::new(m20240301_000007_create_outbox_events_table::Migration),
        ]
    }
}

mod m20240301_000001_create_carts_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_carts_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Carts::StudentId).uuid().not_null())
                        .col(ColumnDef::new(Carts::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Carts::Total).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Carts::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Carts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_student_status")
                        .table(Carts::Table)
                        .col(Carts::StudentId)
                        .col(Carts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::CourseId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Title).string().not_null())
                        .col(ColumnDef::new(CartItems::ThumbnailUrl).string().null())
                        .col(ColumnDef::new(CartItems::InstructorName).string().null())
                        .col(
                            ColumnDef::new(CartItems::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // A course appears at most once per cart.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_items_cart_course")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::CourseId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        StudentId,
        Currency,
        Total,
        Status,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        CourseId,
        Title,
        ThumbnailUrl,
        InstructorName,
        UnitPrice,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string_len(50).not_null())
                        .col(ColumnDef::new(Orders::StudentId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::ItemsSnapshot).json().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::CancelledReason).string().null())
                        .col(
                            ColumnDef::new(Orders::IsArchived)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_student_id")
                        .table(Orders::Table)
                        .col(Orders::StudentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        StudentId,
        Status,
        ItemsSnapshot,
        TotalAmount,
        Currency,
        CancelledReason,
        IsArchived,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240301_000003_create_payment_attempts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_payment_attempts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentAttempts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentAttempts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentAttempts::OrderId).uuid().not_null())
                        .col(ColumnDef::new(PaymentAttempts::StudentId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentAttempts::Method)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::Currency)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::TrackingCode)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentAttempts::ReceiptUrl).string().null())
                        .col(
                            ColumnDef::new(PaymentAttempts::ReceiptFilename)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::ReceiptUploadedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentAttempts::ReviewedBy).uuid().null())
                        .col(
                            ColumnDef::new(PaymentAttempts::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::RejectionReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAttempts::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_attempts_order")
                                .from(PaymentAttempts::Table, PaymentAttempts::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_attempts_order_id")
                        .table(PaymentAttempts::Table)
                        .col(PaymentAttempts::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_attempts_status_expires")
                        .table(PaymentAttempts::Table)
                        .col(PaymentAttempts::Status)
                        .col(PaymentAttempts::ExpiresAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_payment_attempts_tracking_code")
                        .table(PaymentAttempts::Table)
                        .col(PaymentAttempts::TrackingCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentAttempts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentAttempts {
        Table,
        Id,
        OrderId,
        StudentId,
        Method,
        Amount,
        Currency,
        TrackingCode,
        Status,
        ReceiptUrl,
        ReceiptFilename,
        ReceiptUploadedAt,
        ReviewedBy,
        ReviewedAt,
        RejectionReason,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
    }
}

mod m20240301_000004_create_enrollments_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_enrollments_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CourseEnrollments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CourseEnrollments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::StudentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::CourseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::PaidAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::CancelledReason)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::HasInstallmentPlan)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CourseEnrollments::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_enrollments_student_course")
                        .table(CourseEnrollments::Table)
                        .col(CourseEnrollments::StudentId)
                        .col(CourseEnrollments::CourseId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InstallmentPayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InstallmentPayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::EnrollmentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::InstallmentNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::PaidAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::DueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InstallmentPayments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_installments_enrollment")
                                .from(
                                    InstallmentPayments::Table,
                                    InstallmentPayments::EnrollmentId,
                                )
                                .to(CourseEnrollments::Table, CourseEnrollments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_installments_enrollment_number")
                        .table(InstallmentPayments::Table)
                        .col(InstallmentPayments::EnrollmentId)
                        .col(InstallmentPayments::InstallmentNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InstallmentPayments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CourseEnrollments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CourseEnrollments {
        Table,
        Id,
        StudentId,
        CourseId,
        TotalAmount,
        PaidAmount,
        PaymentStatus,
        Status,
        CancelledReason,
        HasInstallmentPlan,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum InstallmentPayments {
        Table,
        Id,
        EnrollmentId,
        InstallmentNumber,
        Amount,
        PaidAmount,
        DueDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_payment_audit_log_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_payment_audit_log_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentAuditLog::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentAuditLog::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAuditLog::PaymentAttemptId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentAuditLog::OrderId).uuid().null())
                        .col(ColumnDef::new(PaymentAuditLog::ActorId).uuid().null())
                        .col(
                            ColumnDef::new(PaymentAuditLog::Action)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentAuditLog::FromStatus).string().null())
                        .col(ColumnDef::new(PaymentAuditLog::ToStatus).string().null())
                        .col(
                            ColumnDef::new(PaymentAuditLog::Amount)
                                .decimal_len(19, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentAuditLog::Reason).string().null())
                        .col(
                            ColumnDef::new(PaymentAuditLog::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_audit_attempt_id")
                        .table(PaymentAuditLog::Table)
                        .col(PaymentAuditLog::PaymentAttemptId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentAuditLog::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentAuditLog {
        Table,
        Id,
        PaymentAttemptId,
        OrderId,
        ActorId,
        Action,
        FromStatus,
        ToStatus,
        Amount,
        Reason,
        CreatedAt,
    }
}

mod m20240301_000006_create_idempotency_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_idempotency_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IdempotencyRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IdempotencyRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::IdempotencyKey)
                                .string_len(128)
                                .not_null(),
                        )
                        .col(ColumnDef::new(IdempotencyRecords::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(IdempotencyRecords::Operation)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::RequestHash)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::Completed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(IdempotencyRecords::Response).json().null())
                        .col(
                            ColumnDef::new(IdempotencyRecords::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The second writer of the same logical operation must fail here.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_idempotency_key_user_operation")
                        .table(IdempotencyRecords::Table)
                        .col(IdempotencyRecords::IdempotencyKey)
                        .col(IdempotencyRecords::UserId)
                        .col(IdempotencyRecords::Operation)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IdempotencyRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum IdempotencyRecords {
        Table,
        Id,
        IdempotencyKey,
        UserId,
        Operation,
        RequestHash,
        Completed,
        Response,
        ExpiresAt,
        CreatedAt,
    }
}

mod m20240301_000007_create_outbox_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_outbox_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OutboxEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OutboxEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::AggregateType)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OutboxEvents::AggregateId).uuid().null())
                        .col(
                            ColumnDef::new(OutboxEvents::EventType)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OutboxEvents::Payload).json().not_null())
                        .col(
                            ColumnDef::new(OutboxEvents::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::AvailableAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_outbox_status_available")
                        .table(OutboxEvents::Table)
                        .col(OutboxEvents::Status)
                        .col(OutboxEvents::AvailableAt)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OutboxEvents {
        Table,
        Id,
        AggregateType,
        AggregateId,
        EventType,
        Payload,
        Status,
        Attempts,
        AvailableAt,
        CreatedAt,
        UpdatedAt,
    }
}
