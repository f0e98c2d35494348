//! Domain model: aggregates, value objects and events
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use value_objects::{CustomerKey, DiscountCodeValue, StockLevel, TenantId};
