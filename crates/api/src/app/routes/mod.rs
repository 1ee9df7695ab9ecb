use axum::{Router, routing::get};

pub mod inventory;
pub mod orders;
pub mod products;
pub mod reconciliation;
pub mod system;

/// Router for every endpoint. Services are injected by the caller as an `Extension`.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/reconciliation", get(reconciliation::list_gaps))
        .nest("/orders", orders::router())
        .nest("/inventory", inventory::router())
        .nest("/products", products::router())
}
