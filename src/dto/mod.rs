pub mod auth;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod shipments;
pub mod stores;
