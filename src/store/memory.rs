//! In-memory store.
//!
//! A unit of work holds the state lock for its whole lifetime and stages
//! writes on a private copy, so concurrent checkouts are serialized and a
//! dropped or rolled-back unit leaves no trace. Used when no database is
//! configured and throughout the test suite.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    OrderDetails, OrderFilter, RedemptionOutcome, ReservationOutcome, Snapshot, StockPolicy, StockReservation, Store,
    StoreError, StoreResult, UnitOfWork,
};
use crate::domain::{
    AbandonedCart, CustomerKey, DiscountCode, DiscountCodeValue, Order, OrderItem, OrderStatus, Product, SalesGoal,
    StockLevel, TenantId,
};

#[derive(Clone, Default)]
struct State {
    products: HashMap<Uuid, Product>,
    orders: BTreeMap<Uuid, Order>,
    reservations: HashSet<(Uuid, Uuid)>,
    discount_codes: HashMap<Uuid, DiscountCode>,
    redemptions: HashSet<(Uuid, Uuid)>,
    carts: Vec<AbandonedCart>,
    goals: Vec<SalesGoal>,
}

impl State {
    fn open_cart_mut(&mut self, tenant_id: TenantId, key: &CustomerKey) -> Option<&mut AbandonedCart> {
        self.carts.iter_mut().find(|c| c.tenant_id == tenant_id && !c.recovered && &c.customer_key == key)
    }

    fn live_order_mut(&mut self, tenant_id: TenantId, id: Uuid) -> Option<&mut Order> {
        self.orders.get_mut(&id).filter(|o| o.tenant_id == tenant_id && !o.is_deleted())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Delay every call by `latency`, to exercise timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self { self.latency = Some(latency); self }

    async fn lock(&self) -> OwnedMutexGuard<State> {
        if let Some(d) = self.latency { tokio::time::sleep(d).await; }
        self.state.clone().lock_owned().await
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.lock().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnit { guard, staged, latency: self.latency }))
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn products_by_ids(&self, tenant_id: TenantId, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let state = self.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id)).filter(|p| p.tenant_id == tenant_id).cloned().collect())
    }

    async fn find_order(&self, tenant_id: TenantId, id: Uuid) -> StoreResult<Option<Order>> {
        let state = self.lock().await;
        Ok(state.orders.get(&id).filter(|o| o.tenant_id == tenant_id).cloned())
    }

    async fn list_orders(&self, tenant_id: TenantId, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.lock().await;
        let mut orders: Vec<Order> =
            state.orders.values().filter(|o| o.tenant_id == tenant_id && filter.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn set_order_status(&self, tenant_id: TenantId, id: Uuid, expected: OrderStatus, next: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.lock().await;
        match state.live_order_mut(tenant_id, id) {
            Some(order) if order.status == expected => {
                order.status = next;
                order.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_order_details(&self, tenant_id: TenantId, id: Uuid, details: &OrderDetails, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.lock().await;
        let Some(order) = state.live_order_mut(tenant_id, id) else { return Ok(false) };
        order.notes = details.notes.clone();
        order.internal_notes = details.internal_notes.clone();
        order.tags = details.tags.clone();
        order.updated_at = at;
        Ok(true)
    }

    async fn soft_delete_order(&self, tenant_id: TenantId, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.lock().await;
        let Some(order) = state.live_order_mut(tenant_id, id) else { return Ok(false) };
        order.deleted_at = Some(at);
        order.updated_at = at;
        Ok(true)
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<(TenantId, Uuid)>> {
        let state = self.lock().await;
        let mut stale: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && !o.is_deleted() && o.created_at <= cutoff)
            .collect();
        stale.sort_by_key(|o| (o.created_at, o.id));
        Ok(stale.into_iter().take(limit).map(|o| (o.tenant_id, o.id)).collect())
    }

    async fn insert_discount_code(&self, code: &DiscountCode) -> StoreResult<()> {
        let mut state = self.lock().await;
        let duplicate = state.discount_codes.values().any(|c| c.tenant_id == code.tenant_id && c.code == code.code && c.id != code.id);
        if duplicate {
            return Err(StoreError::Conflict(format!("discount code {} already exists", code.code)));
        }
        state.discount_codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn find_discount_code(&self, tenant_id: TenantId, code: &DiscountCodeValue) -> StoreResult<Option<DiscountCode>> {
        let state = self.lock().await;
        Ok(state.discount_codes.values().find(|c| c.tenant_id == tenant_id && &c.code == code && c.active).cloned())
    }

    async fn upsert_abandoned_cart(&self, cart: &AbandonedCart) -> StoreResult<AbandonedCart> {
        let mut state = self.lock().await;
        if let Some(open) = state.open_cart_mut(cart.tenant_id, &cart.customer_key) {
            open.refresh(cart);
            return Ok(open.clone());
        }
        state.carts.push(cart.clone());
        Ok(cart.clone())
    }

    async fn list_abandoned_carts(&self, tenant_id: TenantId, include_recovered: bool) -> StoreResult<Vec<AbandonedCart>> {
        let state = self.lock().await;
        let mut carts: Vec<AbandonedCart> = state
            .carts
            .iter()
            .filter(|c| c.tenant_id == tenant_id && (include_recovered || !c.recovered))
            .cloned()
            .collect();
        carts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(carts)
    }

    async fn insert_goal(&self, goal: &SalesGoal) -> StoreResult<()> {
        self.lock().await.goals.push(goal.clone());
        Ok(())
    }

    async fn snapshot(&self, tenant_id: TenantId) -> StoreResult<Snapshot> {
        let state = self.lock().await;
        let mut orders: Vec<Order> =
            state.orders.values().filter(|o| o.tenant_id == tenant_id && !o.is_deleted()).cloned().collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        let mut products: Vec<Product> = state.products.values().filter(|p| p.tenant_id == tenant_id).cloned().collect();
        products.sort_by_key(|p| p.id);
        let goals = state.goals.iter().filter(|g| g.tenant_id == tenant_id && g.active).cloned().collect();
        let carts = state.carts.iter().filter(|c| c.tenant_id == tenant_id).cloned().collect();
        Ok(Snapshot { orders, products, goals, carts })
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<State>,
    staged: State,
    latency: Option<Duration>,
}

impl MemoryUnit {
    async fn pause(&self) {
        if let Some(d) = self.latency { tokio::time::sleep(d).await; }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn insert_order(&mut self, order: &Order) -> StoreResult<bool> {
        self.pause().await;
        if self.staged.orders.contains_key(&order.id) { return Ok(false); }
        let mut row = order.clone();
        row.items.clear();
        self.staged.orders.insert(order.id, row);
        Ok(true)
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> StoreResult<()> {
        self.pause().await;
        for item in items {
            let order = self
                .staged
                .orders
                .get_mut(&item.order_id)
                .ok_or_else(|| StoreError::Corrupt(format!("order item {} references unknown order {}", item.id, item.order_id)))?;
            order.items.push(item.clone());
        }
        Ok(())
    }

    async fn reserve_stock(&mut self, r: StockReservation) -> StoreResult<ReservationOutcome> {
        self.pause().await;
        if self.staged.reservations.contains(&(r.order_id, r.product_id)) {
            return Ok(ReservationOutcome::AlreadyApplied);
        }
        let Some(product) = self.staged.products.get_mut(&r.product_id).filter(|p| p.tenant_id == r.tenant_id) else {
            return Ok(ReservationOutcome::ProductMissing);
        };
        if let StockLevel::Tracked(available) = product.stock {
            if available < r.quantity && r.policy == StockPolicy::Reject {
                return Ok(ReservationOutcome::Insufficient { available });
            }
        }
        product.stock = product.stock.after_sale(r.quantity);
        let remaining = product.stock;
        self.staged.reservations.insert((r.order_id, r.product_id));
        Ok(ReservationOutcome::Applied { remaining })
    }

    async fn redeem_discount(&mut self, tenant_id: TenantId, code_id: Uuid, order_id: Uuid) -> StoreResult<RedemptionOutcome> {
        self.pause().await;
        let Some(code) = self.staged.discount_codes.get_mut(&code_id).filter(|c| c.tenant_id == tenant_id) else {
            return Ok(RedemptionOutcome::CodeMissing);
        };
        if self.staged.redemptions.contains(&(code_id, order_id)) {
            return Ok(RedemptionOutcome::AlreadyRedeemed);
        }
        if !code.has_remaining_uses() { return Ok(RedemptionOutcome::Exhausted); }
        code.times_used += 1;
        let times_used = code.times_used;
        self.staged.redemptions.insert((code_id, order_id));
        Ok(RedemptionOutcome::Redeemed { times_used })
    }

    async fn recover_abandoned_cart(&mut self, tenant_id: TenantId, customer_key: &CustomerKey, at: DateTime<Utc>) -> StoreResult<bool> {
        self.pause().await;
        match self.staged.open_cart_mut(tenant_id, customer_key) {
            Some(cart) => { cart.recover(at); Ok(true) }
            None => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnit { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> { Ok(()) }
}
