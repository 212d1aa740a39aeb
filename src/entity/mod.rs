pub mod admin_actions;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod shipments;
pub mod stores;
pub mod sub_orders;
pub mod users;

pub use admin_actions::Entity as AdminActions;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use products::Entity as Products;
pub use reports::Entity as Reports;
pub use shipments::Entity as Shipments;
pub use stores::Entity as Stores;
pub use sub_orders::Entity as SubOrders;
pub use users::Entity as Users;
