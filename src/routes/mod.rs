use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod categories;
pub mod doc;
pub mod fulfillment;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod reports;
pub mod stores;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/stores", stores::router())
        .nest("/orders", orders::router())
        .nest("/fulfillment", fulfillment::router())
        .nest("/payments", payments::router())
        .nest("/reports", reports::router())
        .nest("/admin", admin::router())
}
