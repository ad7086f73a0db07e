use crate::{
    config::AppConfig,
    rate_limiter::CounterStore,
    services::{carts::CartService, idempotency, orders::OrderService, payments::PaymentService},
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Periodic maintenance loop: expires stale carts and payment attempts,
/// cancels orders whose payment window elapsed, purges spent idempotency
/// records and trims the rate-limit counter store. Each pass is independent
/// and low-risk; a failing step is logged and retried on the next tick.
pub struct Sweeper {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    carts: Arc<CartService>,
    orders: Arc<OrderService>,
    payments: Arc<PaymentService>,
    counters: CounterStore,
}

impl Sweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        carts: Arc<CartService>,
        orders: Arc<OrderService>,
        payments: Arc<PaymentService>,
        counters: CounterStore,
    ) -> Self {
        Self {
            db,
            config,
            carts,
            orders,
            payments,
            counters,
        }
    }

    /// Spawns the background loop.
    pub fn start(self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// One maintenance pass. Public so tests can drive it directly.
    pub async fn sweep_once(&self) {
        if let Err(e) = self.carts.expire_stale().await {
            error!("cart sweep failed: {}", e);
        }

        if let Err(e) = self.payments.expire_stale().await {
            error!("payment attempt sweep failed: {}", e);
        }

        let order_cutoff = Utc::now() - ChronoDuration::days(self.config.stale_order_ttl_days);
        if let Err(e) = self.orders.cancel_stale(order_cutoff).await {
            error!("stale order sweep failed: {}", e);
        }

        match idempotency::purge_expired(&*self.db, Utc::now()).await {
            Ok(purged) if purged > 0 => debug!(purged = purged, "purged idempotency records"),
            Ok(_) => {}
            Err(e) => error!("idempotency purge failed: {}", e),
        }

        self.counters.cleanup(Duration::from_secs(
            self.config.rate_limit_window_seconds.max(1),
        ));
    }
}
