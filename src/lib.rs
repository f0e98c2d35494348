//! Storefront Commerce Engine
//!
//! Order lifecycle, inventory consistency and commerce analytics for
//! multi-tenant reseller storefronts.
//!
//! ## Features
//! - Order creation with atomic, idempotent stock reservation
//! - Order status state machine and a scheduled reaper for stale orders
//! - Discount code validation and redemption
//! - Abandoned cart tracking and recovery
//! - Revenue, profit, product, customer and channel analytics

pub mod api;
pub mod config;
pub mod context;
pub mod domain;
pub mod services;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

pub use config::Config;
pub use context::{Actor, Clock, FixedClock, RequestContext, SystemClock};
pub use domain::aggregates::{DiscountRejection, OrderStatus};
pub use services::Commerce;
pub use store::{StockPolicy, Store, StoreError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Stock { product_id: Uuid, requested: u32, available: u32 },

    #[error("discount rejected: {0}")]
    Discount(DiscountRejection),

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store call timed out: {0}")]
    Timeout(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl CommerceError {
    /// Whether the failed call may be retried as-is.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Timeout(_) | Self::Unavailable(_)) }
}

impl From<StoreError> for CommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for CommerceError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = e.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        Self::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
