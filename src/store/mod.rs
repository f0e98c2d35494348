//! Persistence port.
//!
//! The engine talks to storage only through [`Store`] and the
//! [`UnitOfWork`] it opens. Counters (stock, discount usage) and status
//! changes are exposed as atomic conditional updates; nothing here offers a
//! read-then-write path for them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    AbandonedCart, CustomerKey, DiscountCode, DiscountCodeValue, Order, OrderItem, OrderStatus, Product,
    SalesGoal, StockLevel, TenantId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Conflict(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What to do when tracked stock cannot cover a line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockPolicy {
    /// Sell anyway and clamp stock at zero.
    #[default]
    Clamp,
    /// Refuse the order.
    Reject,
}

impl std::str::FromStr for StockPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown stock policy: {other}")),
        }
    }
}

/// One stock reservation; `(order_id, product_id)` is its idempotency key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockReservation {
    pub tenant_id: TenantId,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub policy: StockPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationOutcome {
    Applied { remaining: StockLevel },
    AlreadyApplied,
    Insufficient { available: u32 },
    ProductMissing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionOutcome {
    Redeemed { times_used: u32 },
    AlreadyRedeemed,
    Exhausted,
    CodeMissing,
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        (self.include_deleted || !order.is_deleted())
            && self.status.map_or(true, |s| order.status == s)
            && self.created_from.map_or(true, |from| order.created_at >= from)
            && self.created_to.map_or(true, |to| order.created_at < to)
    }
}

/// Editable free-form fields of an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub tags: Vec<String>,
}

/// Consistent read of everything analytics need for one tenant.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Non-deleted orders with their items, oldest first.
    pub orders: Vec<Order>,
    pub products: Vec<Product>,
    pub goals: Vec<SalesGoal>,
    pub carts: Vec<AbandonedCart>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn products_by_ids(&self, tenant_id: TenantId, ids: &[Uuid]) -> StoreResult<Vec<Product>>;

    async fn find_order(&self, tenant_id: TenantId, id: Uuid) -> StoreResult<Option<Order>>;
    async fn list_orders(&self, tenant_id: TenantId, filter: &OrderFilter) -> StoreResult<Vec<Order>>;
    /// Compare-and-set on the stored status. Returns false when the stored
    /// status is no longer `expected` or the order is missing or deleted.
    async fn set_order_status(&self, tenant_id: TenantId, id: Uuid, expected: OrderStatus, next: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn update_order_details(&self, tenant_id: TenantId, id: Uuid, details: &OrderDetails, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn soft_delete_order(&self, tenant_id: TenantId, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    /// Pending, non-deleted orders created at or before `cutoff`, across tenants.
    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<(TenantId, Uuid)>>;

    async fn insert_discount_code(&self, code: &DiscountCode) -> StoreResult<()>;
    /// Active code with exactly this normalized value.
    async fn find_discount_code(&self, tenant_id: TenantId, code: &DiscountCodeValue) -> StoreResult<Option<DiscountCode>>;

    /// Merge into the open record for `(tenant, customer_key)` or insert. Returns the stored record.
    async fn upsert_abandoned_cart(&self, cart: &AbandonedCart) -> StoreResult<AbandonedCart>;
    async fn list_abandoned_carts(&self, tenant_id: TenantId, include_recovered: bool) -> StoreResult<Vec<AbandonedCart>>;

    async fn insert_goal(&self, goal: &SalesGoal) -> StoreResult<()>;

    async fn snapshot(&self, tenant_id: TenantId) -> StoreResult<Snapshot>;
}

/// Writes staged here become visible together on `commit`, or not at all.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Returns false if an order with this id already exists.
    async fn insert_order(&mut self, order: &Order) -> StoreResult<bool>;
    async fn insert_order_items(&mut self, items: &[OrderItem]) -> StoreResult<()>;
    async fn reserve_stock(&mut self, reservation: StockReservation) -> StoreResult<ReservationOutcome>;
    /// Codes belonging to another tenant are reported as missing.
    async fn redeem_discount(&mut self, tenant_id: TenantId, code_id: Uuid, order_id: Uuid) -> StoreResult<RedemptionOutcome>;
    async fn recover_abandoned_cart(&mut self, tenant_id: TenantId, customer_key: &CustomerKey, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
