// Storage traits and the Postgres implementation.
pub mod pg;
pub mod pg_cart;
pub mod pg_orders;
pub mod store;

pub use pg::*;
pub use store::*;
