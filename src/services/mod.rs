//! Engine services.
//!
//! Each service holds a cheap clone of [`Deps`]; [`Commerce`] bundles them
//! for request handlers.

pub mod analytics;
pub mod carts;
pub mod catalog;
pub mod discounts;
pub mod ledger;
pub mod reaper;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::context::{Clock, SystemClock};
use crate::domain::events::{DomainEvent, EventSink, NoopSink};
use crate::store::{StockPolicy, Store, StoreResult};
use crate::{CommerceError, Result};

pub use analytics::{Analytics, NewGoal, Report, Window};
pub use carts::{CartStats, CartTracker, TrackCart};
pub use catalog::{Catalog, NewProduct};
pub use discounts::{DiscountQuote, DiscountValidation, DiscountValidator, NewDiscountCode};
pub use ledger::{CreateOrder, OrderLedger, OrderLineInput};
pub use reaper::{ReaperSettings, StatusReaper, SweepReport};

/// Money columns are NUMERIC(14, 2): non-negative, below 10^12, two decimal places.
pub(crate) fn check_amount(field: &str, value: Decimal) -> Result<()> {
    let limit = Decimal::new(1_000_000_000_000, 0);
    if value < Decimal::ZERO || value >= limit || value.normalize().scale() > 2 {
        return Err(CommerceError::Validation(format!(
            "{field} must be between 0 and {limit} (exclusive) with at most 2 decimal places"
        )));
    }
    Ok(())
}

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct Deps {
    pub store: Arc<dyn Store>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    /// Upper bound for any single store call.
    pub timeout: Duration,
}

impl Deps {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, events: Arc::new(NoopSink), clock: Arc::new(SystemClock), timeout: Duration::from_secs(5) }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self { self.events = events; self }
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self { self.clock = clock; self }
    pub fn with_timeout(mut self, timeout: Duration) -> Self { self.timeout = timeout; self }

    pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

    /// Run one store call under the configured timeout.
    pub(crate) async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(op, error = %e, "store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store call timed out");
                Err(CommerceError::Timeout(op))
            }
        }
    }

    pub(crate) async fn emit(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.events.publish(event).await;
        }
    }
}

#[derive(Clone)]
pub struct Commerce {
    pub catalog: Catalog,
    pub ledger: OrderLedger,
    pub discounts: DiscountValidator,
    pub carts: CartTracker,
    pub analytics: Analytics,
}

impl Commerce {
    pub fn new(deps: Deps, stock_policy: StockPolicy) -> Self {
        let discounts = DiscountValidator::new(deps.clone());
        Self {
            catalog: Catalog::new(deps.clone()),
            ledger: OrderLedger::new(deps.clone(), discounts.clone(), stock_policy),
            discounts,
            carts: CartTracker::new(deps.clone()),
            analytics: Analytics::new(deps),
        }
    }

    pub fn reaper(&self, settings: ReaperSettings) -> StatusReaper {
        StatusReaper::new(self.ledger.clone(), settings)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the service tests.

    use super::*;
    use crate::context::FixedClock;
    use crate::domain::{Customer, Order, OrderItem, OrderStatus, Product, TenantId};
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap() }

    pub fn deps(store: &MemoryStore) -> Deps {
        Deps::new(Arc::new(store.clone())).with_clock(Arc::new(FixedClock(now())))
    }

    pub fn money(units: i64) -> Decimal { Decimal::new(units, 0) }

    pub async fn seed_product(store: &MemoryStore, tenant: TenantId, price: i64, stock: Option<u32>) -> Product {
        let mut product = Product::create(tenant, format!("Product {price}"), money(price));
        if let Some(qty) = stock { product = product.with_stock(qty); }
        store.insert_product(&product).await.unwrap();
        product
    }

    /// Write an order directly, bypassing checkout, for lifecycle and analytics tests.
    pub async fn seed_order(
        store: &MemoryStore,
        tenant: TenantId,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        lines: &[(&Product, u32)],
    ) -> Order {
        let id = Uuid::now_v7();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|(p, qty)| OrderItem { id: Uuid::now_v7(), order_id: id, product_id: p.id, product_name: p.name.clone(), unit_price: p.price, quantity: *qty })
            .collect();
        let total: Decimal = items.iter().map(OrderItem::line_total).sum();
        let order = Order {
            id, tenant_id: tenant,
            customer: Customer { name: "Ada".into(), phone: "0800".into(), email: Some("ada@example.com".into()), address: None },
            status, subtotal: total, discount_code: None, discount_amount: Decimal::ZERO, shipping_fee: Decimal::ZERO,
            total_amount: total, channel: None, notes: None, internal_notes: None, tags: vec![], deleted_at: None,
            created_at, updated_at: created_at, items: items.clone(),
        };
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_order(&order).await.unwrap());
        tx.insert_order_items(&items).await.unwrap();
        tx.commit().await.unwrap();
        order
    }
}
