pub mod carts;
pub mod enrollments;
pub mod orders;
pub mod payments;

use crate::AppState;
use axum::Router;

/// Assembles the `/api/v1` route tree.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(carts::routes())
        .merge(orders::routes())
        .merge(payments::routes())
        .merge(enrollments::routes())
}
