pub mod accounting;
pub mod audit;
pub mod carts;
pub mod checkout;
pub mod enrollments;
pub mod idempotency;
pub mod orders;
pub mod payments;
pub mod sweeper;

use crate::{
    collaborators::{BlobStore, CourseCatalog, UserDirectory},
    config::AppConfig,
    events::EventSender,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The service set shared by HTTP handlers through application state.
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<carts::CartService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub orders: Arc<orders::OrderService>,
    pub payments: Arc<payments::PaymentService>,
    pub enrollments: Arc<enrollments::EnrollmentService>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn CourseCatalog>,
        directory: Arc<dyn UserDirectory>,
        blob_store: Arc<dyn BlobStore>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            carts: Arc::new(carts::CartService::new(
                db.clone(),
                event_sender.clone(),
                catalog.clone(),
                config.clone(),
            )),
            checkout: Arc::new(checkout::CheckoutService::new(
                db.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(orders::OrderService::new(db.clone(), event_sender.clone())),
            payments: Arc::new(payments::PaymentService::new(
                db.clone(),
                event_sender.clone(),
                blob_store,
                config,
            )),
            enrollments: Arc::new(enrollments::EnrollmentService::new(
                db,
                event_sender,
                catalog,
            )),
            directory,
        }
    }
}
