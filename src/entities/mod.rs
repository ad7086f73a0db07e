pub mod cart;
pub mod cart_item;
pub mod enrollment;
pub mod idempotency_record;
pub mod installment_payment;
pub mod order;
pub mod outbox_event;
pub mod payment_attempt;
pub mod payment_audit;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use enrollment::Entity as Enrollment;
pub use idempotency_record::Entity as IdempotencyRecord;
pub use installment_payment::Entity as InstallmentPayment;
pub use order::Entity as Order;
pub use outbox_event::Entity as OutboxEvent;
pub use payment_attempt::Entity as PaymentAttempt;
pub use payment_audit::Entity as PaymentAudit;

pub use cart::Model as CartModel;
pub use cart_item::Model as CartItemModel;
pub use enrollment::Model as EnrollmentModel;
pub use installment_payment::Model as InstallmentPaymentModel;
pub use order::Model as OrderModel;
pub use payment_attempt::Model as PaymentAttemptModel;
pub use payment_audit::Model as PaymentAuditModel;
