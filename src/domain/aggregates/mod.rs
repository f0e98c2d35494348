//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod discount;
pub mod goal;

pub use product::Product;
pub use order::{Customer, Order, OrderItem, OrderStatus, TransitionError};
pub use cart::{AbandonedCart, CartContact, CartLine};
pub use discount::{DiscountCode, DiscountKind, DiscountRejection};
pub use goal::{GoalPeriod, SalesGoal};
