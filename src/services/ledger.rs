//! Order ledger: checkout, status lifecycle and order maintenance.
//!
//! Checkout writes (order row, items, stock reservations, discount
//! redemption, abandoned cart recovery) go through a single unit of work.
//! Either all of them become visible or none do.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::discounts::{DiscountQuote, DiscountValidator};
use super::{check_amount, Deps};
use crate::context::{Actor, RequestContext};
use crate::domain::events::{ChangeSource, DomainEvent};
use crate::domain::{
    Customer, CustomerKey, DiscountRejection, Order, OrderItem, OrderStatus, Product, StockLevel, TransitionError,
};
use crate::store::{OrderDetails, OrderFilter, RedemptionOutcome, ReservationOutcome, StockPolicy, StockReservation, UnitOfWork};
use crate::{CommerceError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateOrder {
    /// Client-chosen id. Replaying a request with the same id returns the
    /// stored order without applying anything twice.
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(length(min = 3, max = 40))]
    pub customer_phone: String,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 500))]
    pub customer_address: Option<String>,
    pub discount_code: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub items: Vec<OrderLineInput>,
    #[validate(length(max = 64))]
    pub channel: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub shipping_fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
    /// Seller-entered price; the catalog price is used when absent.
    pub unit_price: Option<Decimal>,
}

impl CreateOrder {
    fn check(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CommerceError::Validation("order has no items".into()));
        }
        if self.customer_name.trim().is_empty() || self.customer_phone.trim().is_empty() {
            return Err(CommerceError::Validation("customer name and phone are required".into()));
        }
        self.validate()?;
        for line in &self.items {
            line.validate()?;
            if let Some(price) = line.unit_price {
                check_amount("unit price", price)?;
            }
        }
        check_amount("shipping fee", self.shipping_fee)
    }

    fn customer(&self) -> Customer {
        Customer {
            name: self.customer_name.trim().to_string(),
            phone: self.customer_phone.trim().to_string(),
            email: non_blank(self.customer_email.as_deref()),
            address: non_blank(self.customer_address.as_deref()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Trim, drop blanks and duplicates, keep first-seen order.
fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) { out.push(tag.to_string()); }
    }
    out
}

fn transition_error(from: OrderStatus, to: OrderStatus, e: TransitionError) -> CommerceError {
    match e {
        TransitionError::NoOp(s) => CommerceError::Conflict(format!("order is already {s}")),
        TransitionError::Terminal(_) | TransitionError::Illegal { .. } => CommerceError::InvalidTransition { from, to },
    }
}

enum WriteOutcome {
    Created { recovered_cart: Option<CustomerKey> },
    Replayed,
}

#[derive(Clone)]
pub struct OrderLedger {
    deps: Deps,
    discounts: DiscountValidator,
    stock_policy: StockPolicy,
}

impl OrderLedger {
    pub fn new(deps: Deps, discounts: DiscountValidator, stock_policy: StockPolicy) -> Self {
        Self { deps, discounts, stock_policy }
    }

    pub(crate) fn deps(&self) -> &Deps { &self.deps }

    #[tracing::instrument(skip(self, input), fields(tenant_id = %ctx.tenant_id, actor = ?ctx.actor))]
    pub async fn create_order(&self, ctx: &RequestContext, input: CreateOrder) -> Result<Order> {
        input.check()?;
        let order_id = input.order_id.unwrap_or_else(Uuid::now_v7);

        if input.order_id.is_some() {
            if let Some(existing) = self.deps.call("find_order", self.deps.store.find_order(ctx.tenant_id, order_id)).await? {
                tracing::info!(order_id = %order_id, "checkout replayed, returning stored order");
                return Ok(existing);
            }
        }

        let mut ids: Vec<Uuid> = input.items.iter().map(|l| l.product_id).collect();
        ids.sort();
        ids.dedup();
        let catalog: HashMap<Uuid, Product> = self
            .deps
            .call("products_by_ids", self.deps.store.products_by_ids(ctx.tenant_id, &ids))
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut items = Vec::with_capacity(input.items.len());
        let mut reserve: BTreeMap<Uuid, u32> = BTreeMap::new();
        for line in &input.items {
            let product = catalog
                .get(&line.product_id)
                .filter(|p| p.active)
                .ok_or_else(|| CommerceError::Validation(format!("product {} is not available", line.product_id)))?;
            items.push(OrderItem {
                id: Uuid::now_v7(),
                order_id,
                product_id: product.id,
                product_name: product.name.clone(),
                unit_price: line.unit_price.unwrap_or(product.price),
                quantity: line.quantity,
            });
            *reserve.entry(product.id).or_default() += line.quantity;
        }
        if self.stock_policy == StockPolicy::Reject {
            for (product_id, qty) in &reserve {
                if let Some(StockLevel::Tracked(available)) = catalog.get(product_id).map(|p| p.stock) {
                    if available < *qty {
                        return Err(CommerceError::Stock { product_id: *product_id, requested: *qty, available });
                    }
                }
            }
        }
        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, i| i.unit_price.checked_mul(Decimal::from(i.quantity)).and_then(|line| acc.checked_add(line)))
            .ok_or_else(|| CommerceError::Validation("order subtotal is out of range".into()))?;
        check_amount("order subtotal", subtotal)?;

        let quote = match non_blank(input.discount_code.as_deref()) {
            Some(code) => Some(self.discounts.quote(ctx, &code, subtotal).await?),
            None => None,
        };
        let discount_amount = quote.as_ref().map_or(Decimal::ZERO, |q| q.amount);
        let shipping_fee = if quote.as_ref().is_some_and(|q| q.free_shipping) { Decimal::ZERO } else { input.shipping_fee };
        let total_amount = subtotal
            .checked_sub(discount_amount)
            .and_then(|t| t.checked_add(shipping_fee))
            .ok_or_else(|| CommerceError::Validation("order total is out of range".into()))?
            .max(Decimal::ZERO);
        check_amount("order total", total_amount)?;

        let now = self.deps.now();
        let order = Order {
            id: order_id,
            tenant_id: ctx.tenant_id,
            customer: input.customer(),
            status: match ctx.actor { Actor::Seller => OrderStatus::Confirmed, Actor::Storefront | Actor::System => OrderStatus::Pending },
            subtotal,
            discount_code: quote.as_ref().map(|q| q.code.clone()),
            discount_amount,
            shipping_fee,
            total_amount,
            channel: non_blank(input.channel.as_deref()).map(|c| c.to_lowercase()),
            notes: non_blank(input.notes.as_deref()),
            internal_notes: None,
            tags: clean_tags(&input.tags),
            deleted_at: None,
            created_at: now,
            updated_at: now,
            items,
        };

        let mut tx = self.deps.call("begin", self.deps.store.begin()).await?;
        match self.write_order(tx.as_mut(), &order, &reserve, quote.as_ref()).await {
            Ok(WriteOutcome::Created { recovered_cart }) => {
                self.deps.call("commit", tx.commit()).await?;
                tracing::info!(order_id = %order.id, status = %order.status, total = %order.total_amount, "order created");
                let mut events = vec![DomainEvent::OrderCreated { tenant_id: ctx.tenant_id, order_id: order.id, status: order.status, total: order.total_amount }];
                if let Some(q) = &quote {
                    events.push(DomainEvent::DiscountRedeemed { tenant_id: ctx.tenant_id, code_id: q.code_id, order_id: order.id });
                }
                if let Some(customer_key) = recovered_cart {
                    events.push(DomainEvent::CartRecovered { tenant_id: ctx.tenant_id, customer_key, order_id: order.id });
                }
                self.deps.emit(events).await;
                Ok(order)
            }
            Ok(WriteOutcome::Replayed) => {
                if let Err(e) = tx.rollback().await { tracing::warn!(error = %e, "rollback failed"); }
                // the id is taken; it only counts as a replay if the order is ours
                let stored = self.deps.call("find_order", self.deps.store.find_order(ctx.tenant_id, order.id)).await?;
                match stored {
                    Some(existing) => {
                        tracing::info!(order_id = %order.id, "concurrent checkout with the same id, returning stored order");
                        Ok(existing)
                    }
                    None => Err(CommerceError::Conflict(format!("order id {} already in use", order.id))),
                }
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await { tracing::warn!(error = %rb, "rollback failed"); }
                tracing::warn!(order_id = %order.id, error = %e, "checkout rolled back");
                Err(e)
            }
        }
    }

    async fn write_order(
        &self,
        tx: &mut dyn UnitOfWork,
        order: &Order,
        reserve: &BTreeMap<Uuid, u32>,
        quote: Option<&DiscountQuote>,
    ) -> Result<WriteOutcome> {
        if !self.deps.call("insert_order", tx.insert_order(order)).await? {
            return Ok(WriteOutcome::Replayed);
        }
        self.deps.call("insert_order_items", tx.insert_order_items(&order.items)).await?;

        for (&product_id, &quantity) in reserve {
            let reservation = StockReservation { tenant_id: order.tenant_id, order_id: order.id, product_id, quantity, policy: self.stock_policy };
            match self.deps.call("reserve_stock", tx.reserve_stock(reservation)).await? {
                ReservationOutcome::Applied { remaining } => {
                    if remaining == StockLevel::Tracked(0) {
                        tracing::info!(product_id = %product_id, "product sold out");
                    }
                }
                ReservationOutcome::AlreadyApplied => {
                    tracing::debug!(product_id = %product_id, "stock already reserved for this order");
                }
                ReservationOutcome::Insufficient { available } => {
                    return Err(CommerceError::Stock { product_id, requested: quantity, available });
                }
                ReservationOutcome::ProductMissing => {
                    return Err(CommerceError::Validation(format!("product {product_id} is not available")));
                }
            }
        }

        if let Some(q) = quote {
            match self.deps.call("redeem_discount", tx.redeem_discount(order.tenant_id, q.code_id, order.id)).await? {
                RedemptionOutcome::Redeemed { .. } | RedemptionOutcome::AlreadyRedeemed => {}
                RedemptionOutcome::Exhausted => return Err(CommerceError::Discount(DiscountRejection::UsageLimitReached)),
                RedemptionOutcome::CodeMissing => return Err(CommerceError::Discount(DiscountRejection::NotFound)),
            }
        }

        let mut recovered_cart = None;
        if let Some(key) = order.customer_key() {
            if self.deps.call("recover_abandoned_cart", tx.recover_abandoned_cart(order.tenant_id, &key, order.created_at)).await? {
                recovered_cart = Some(key);
            }
        }
        Ok(WriteOutcome::Created { recovered_cart })
    }

    pub async fn get_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order> {
        self.deps
            .call("find_order", self.deps.store.find_order(ctx.tenant_id, order_id))
            .await?
            .filter(|o| !o.is_deleted())
            .ok_or_else(|| CommerceError::NotFound(format!("order {order_id}")))
    }

    pub async fn list_orders(&self, ctx: &RequestContext, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.deps.call("list_orders", self.deps.store.list_orders(ctx.tenant_id, filter)).await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %ctx.tenant_id))]
    pub async fn update_order_status(&self, ctx: &RequestContext, order_id: Uuid, next: OrderStatus) -> Result<Order> {
        self.transition(ctx, order_id, next, ChangeSource::Manual).await
    }

    /// Move an order to `next`. Legality is checked against the stored
    /// status and the write only lands if that status is still current.
    pub(crate) async fn transition(&self, ctx: &RequestContext, order_id: Uuid, next: OrderStatus, source: ChangeSource) -> Result<Order> {
        let order = self.get_order(ctx, order_id).await?;
        let from = order.status;
        from.check_transition(next).map_err(|e| transition_error(from, next, e))?;

        let now = self.deps.now();
        let swapped = self
            .deps
            .call("set_order_status", self.deps.store.set_order_status(ctx.tenant_id, order_id, from, next, now))
            .await?;
        if !swapped {
            let latest = self.get_order(ctx, order_id).await?;
            return Err(match latest.status.check_transition(next) {
                Ok(()) => CommerceError::Conflict(format!("order {order_id} changed while updating")),
                Err(e) => transition_error(latest.status, next, e),
            });
        }

        tracing::info!(order_id = %order_id, %from, to = %next, ?source, "order status changed");
        self.deps
            .emit([DomainEvent::OrderStatusChanged { tenant_id: ctx.tenant_id, order_id, from, to: next, source }])
            .await;
        Ok(Order { status: next, updated_at: now, ..order })
    }

    pub async fn update_order_details(&self, ctx: &RequestContext, order_id: Uuid, details: OrderDetails) -> Result<Order> {
        let details = OrderDetails {
            notes: non_blank(details.notes.as_deref()),
            internal_notes: non_blank(details.internal_notes.as_deref()),
            tags: clean_tags(&details.tags),
        };
        let now = self.deps.now();
        let updated = self
            .deps
            .call("update_order_details", self.deps.store.update_order_details(ctx.tenant_id, order_id, &details, now))
            .await?;
        if !updated {
            return Err(CommerceError::NotFound(format!("order {order_id}")));
        }
        self.get_order(ctx, order_id).await
    }

    pub async fn soft_delete_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<DateTime<Utc>> {
        let now = self.deps.now();
        let deleted = self.deps.call("soft_delete_order", self.deps.store.soft_delete_order(ctx.tenant_id, order_id, now)).await?;
        if !deleted {
            return Err(CommerceError::NotFound(format!("order {order_id}")));
        }
        tracing::info!(tenant_id = %ctx.tenant_id, order_id = %order_id, "order soft-deleted");
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::RecordingSink;
    use crate::domain::{AbandonedCart, CartContact, DiscountCode, DiscountCodeValue, DiscountKind, TenantId};
    use crate::services::testing::{self, money, seed_order, seed_product};
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    fn ledger(store: &MemoryStore, policy: StockPolicy) -> OrderLedger {
        let deps = testing::deps(store);
        OrderLedger::new(deps.clone(), DiscountValidator::new(deps), policy)
    }

    fn request(lines: Vec<(Uuid, u32, Option<i64>)>) -> CreateOrder {
        CreateOrder {
            customer_name: "Ada Obi".into(),
            customer_phone: "08031234567".into(),
            customer_email: Some("ada@example.com".into()),
            items: lines
                .into_iter()
                .map(|(product_id, quantity, price)| OrderLineInput { product_id, quantity, unit_price: price.map(money) })
                .collect(),
            ..Default::default()
        }
    }

    async fn stock_of(store: &MemoryStore, tenant: TenantId, id: Uuid) -> StockLevel {
        store.products_by_ids(tenant, &[id]).await.unwrap()[0].stock
    }

    #[tokio::test]
    async fn test_total_from_submitted_prices() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let a = seed_product(&store, tenant, 12, Some(10)).await;
        let b = seed_product(&store, tenant, 7, None).await;
        let ledger = ledger(&store, StockPolicy::Clamp);

        let order = ledger.create_order(&RequestContext::storefront(tenant), request(vec![(a.id, 2, Some(10)), (b.id, 1, Some(5))])).await.unwrap();

        assert_eq!(order.total_amount, Decimal::new(2500, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert_eq!(stock_of(&store, tenant, a.id).await, StockLevel::Tracked(8));
        assert_eq!(stock_of(&store, tenant, b.id).await, StockLevel::Unlimited);
        let stored = ledger.get_order(&RequestContext::seller(tenant), order.id).await.unwrap();
        assert_eq!(stored.items.len(), 2);
    }

    #[tokio::test]
    async fn test_seller_orders_start_confirmed() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, None).await;
        let order = ledger(&store, StockPolicy::Clamp).create_order(&RequestContext::seller(tenant), request(vec![(p.id, 1, None)])).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total_amount, money(10));
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let inactive = Product::create(tenant, "Old", money(3)).archive();
        store.insert_product(&inactive).await.unwrap();
        let foreign = seed_product(&store, TenantId::generate(), 3, None).await;
        let ledger = ledger(&store, StockPolicy::Clamp);
        let ctx = RequestContext::storefront(tenant);

        let empty = ledger.create_order(&ctx, request(vec![])).await;
        assert!(matches!(empty, Err(CommerceError::Validation(_))));
        let mut no_phone = request(vec![(inactive.id, 1, None)]);
        no_phone.customer_phone = "   ".into();
        assert!(matches!(ledger.create_order(&ctx, no_phone).await, Err(CommerceError::Validation(_))));
        let mut bad_email = request(vec![(foreign.id, 1, None)]);
        bad_email.customer_email = Some("not-an-email".into());
        assert!(matches!(ledger.create_order(&ctx, bad_email).await, Err(CommerceError::Validation(_))));
        assert!(matches!(ledger.create_order(&ctx, request(vec![(inactive.id, 1, None)])).await, Err(CommerceError::Validation(_))));
        assert!(matches!(ledger.create_order(&ctx, request(vec![(foreign.id, 1, None)])).await, Err(CommerceError::Validation(_))));
        assert!(ledger.list_orders(&ctx, &OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_rejected_before_writing() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(5)).await;
        let ledger = ledger(&store, StockPolicy::Clamp);
        let ctx = RequestContext::seller(tenant);

        let mut huge_price = request(vec![(p.id, 2, None)]);
        huge_price.items[0].unit_price = Some(Decimal::MAX);
        let mut huge_fee = request(vec![(p.id, 1, None)]);
        huge_fee.shipping_fee = Decimal::MAX;
        let mut fractional_fee = request(vec![(p.id, 1, None)]);
        fractional_fee.shipping_fee = Decimal::new(1005, 3);
        let mut huge_subtotal = request(vec![(p.id, 10_000, None)]);
        huge_subtotal.items[0].unit_price = Some(Decimal::new(99_999_999_999, 0));

        for req in [huge_price, huge_fee, fractional_fee, huge_subtotal] {
            let result = ledger.create_order(&ctx, req).await;
            assert!(matches!(result, Err(CommerceError::Validation(_))), "{result:?}");
        }
        assert!(ledger.list_orders(&ctx, &OrderFilter::default()).await.unwrap().is_empty());
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(5));
    }

    #[tokio::test]
    async fn test_clamp_policy_sells_past_stock() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(2)).await;
        let order = ledger(&store, StockPolicy::Clamp).create_order(&RequestContext::storefront(tenant), request(vec![(p.id, 5, None)])).await.unwrap();
        assert_eq!(order.items[0].quantity, 5);
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(0));
    }

    #[tokio::test]
    async fn test_reject_policy_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let plenty = seed_product(&store, tenant, 10, Some(50)).await;
        let scarce = seed_product(&store, tenant, 10, Some(1)).await;
        let ledger = ledger(&store, StockPolicy::Reject);
        let ctx = RequestContext::storefront(tenant);

        let result = ledger.create_order(&ctx, request(vec![(plenty.id, 3, None), (scarce.id, 2, None)])).await;

        assert!(matches!(result, Err(CommerceError::Stock { requested: 2, available: 1, .. })));
        assert_eq!(stock_of(&store, tenant, plenty.id).await, StockLevel::Tracked(50));
        assert!(ledger.list_orders(&ctx, &OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_lines_reserve_combined_quantity() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 4, Some(10)).await;
        ledger(&store, StockPolicy::Clamp)
            .create_order(&RequestContext::storefront(tenant), request(vec![(p.id, 2, None), (p.id, 3, Some(3))]))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(5));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(20)).await;
        let ledger = ledger(&store, StockPolicy::Clamp);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let req = request(vec![(p.id, 3, None)]);
            handles.push(tokio::spawn(async move { ledger.create_order(&RequestContext::storefront(tenant), req).await }));
        }
        for h in handles { h.await.unwrap().unwrap(); }

        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(0));
        let orders = ledger.list_orders(&RequestContext::seller(tenant), &OrderFilter::default()).await.unwrap();
        assert_eq!(orders.len(), 8);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_decrement_exactly() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(100)).await;
        let ledger = ledger(&store, StockPolicy::Reject);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let req = request(vec![(p.id, 4, None)]);
            handles.push(tokio::spawn(async move { ledger.create_order(&RequestContext::storefront(tenant), req).await }));
        }
        for h in handles { h.await.unwrap().unwrap(); }
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(60));
    }

    #[tokio::test]
    async fn test_replay_with_same_id_applies_once() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(10)).await;
        let code = DiscountCode::create(tenant, DiscountCodeValue::new("TEN").unwrap(), DiscountKind::Percentage, money(10));
        store.insert_discount_code(&code).await.unwrap();
        let ledger = ledger(&store, StockPolicy::Clamp);
        let ctx = RequestContext::storefront(tenant);

        let mut req = request(vec![(p.id, 2, None)]);
        req.order_id = Some(Uuid::now_v7());
        req.discount_code = Some("ten".into());
        let first = ledger.create_order(&ctx, req.clone()).await.unwrap();
        let second = ledger.create_order(&ctx, req).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.discount_amount, Decimal::new(200, 2));
        assert_eq!(first.total_amount, Decimal::new(1800, 2));
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(8));
        let stored = store.find_discount_code(tenant, &code.code).await.unwrap().unwrap();
        assert_eq!(stored.times_used, 1);
    }

    #[tokio::test]
    async fn test_order_id_owned_by_another_tenant_conflicts() {
        let store = MemoryStore::new();
        let (first, second) = (TenantId::generate(), TenantId::generate());
        let mine = seed_product(&store, first, 10, None).await;
        let theirs = seed_product(&store, second, 10, Some(3)).await;
        let ledger = ledger(&store, StockPolicy::Clamp);
        let id = Uuid::now_v7();

        let mut req = request(vec![(mine.id, 1, None)]);
        req.order_id = Some(id);
        ledger.create_order(&RequestContext::storefront(first), req).await.unwrap();

        let mut reused = request(vec![(theirs.id, 1, None)]);
        reused.order_id = Some(id);
        let result = ledger.create_order(&RequestContext::storefront(second), reused).await;
        assert!(matches!(result, Err(CommerceError::Conflict(_))), "{result:?}");
        assert_eq!(stock_of(&store, second, theirs.id).await, StockLevel::Tracked(3));
        assert_eq!(ledger.get_order(&RequestContext::seller(first), id).await.unwrap().tenant_id, first);
    }

    #[tokio::test]
    async fn test_discount_errors_propagate() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(10)).await;
        let mut code = DiscountCode::create(tenant, DiscountCodeValue::new("USED").unwrap(), DiscountKind::Fixed, money(5)).with_max_uses(1);
        code.times_used = 1;
        store.insert_discount_code(&code).await.unwrap();
        let mut req = request(vec![(p.id, 1, None)]);
        req.discount_code = Some("USED".into());

        let result = ledger(&store, StockPolicy::Clamp).create_order(&RequestContext::storefront(tenant), req).await;
        assert!(matches!(result, Err(CommerceError::Discount(DiscountRejection::UsageLimitReached))));
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(10));
    }

    #[tokio::test]
    async fn test_free_shipping_waives_fee() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 40, None).await;
        let code = DiscountCode::create(tenant, DiscountCodeValue::new("SHIPFREE").unwrap(), DiscountKind::FreeShipping, Decimal::ZERO);
        store.insert_discount_code(&code).await.unwrap();
        let mut req = request(vec![(p.id, 1, None)]);
        req.shipping_fee = money(6);
        req.discount_code = Some("shipfree".into());

        let order = ledger(&store, StockPolicy::Clamp).create_order(&RequestContext::storefront(tenant), req).await.unwrap();
        assert_eq!(order.shipping_fee, Decimal::ZERO);
        assert_eq!(order.total_amount, money(40));
        assert_eq!(order.discount_code.as_deref(), Some("SHIPFREE"));
    }

    #[tokio::test]
    async fn test_checkout_recovers_abandoned_cart_and_emits_events() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, None).await;
        let contact = CartContact { email: Some("ADA@example.com".into()), ..Default::default() };
        let cart = AbandonedCart::open(tenant, contact.key().unwrap(), contact, vec![], money(10), testing::now());
        store.upsert_abandoned_cart(&cart).await.unwrap();
        let sink = Arc::new(RecordingSink::default());
        let deps = testing::deps(&store).with_events(sink.clone());
        let ledger = OrderLedger::new(deps.clone(), DiscountValidator::new(deps), StockPolicy::Clamp);

        ledger.create_order(&RequestContext::storefront(tenant), request(vec![(p.id, 1, None)])).await.unwrap();

        let carts = store.list_abandoned_carts(tenant, true).await.unwrap();
        assert!(carts[0].recovered);
        let events = sink.events.lock().await;
        assert!(matches!(events[0], DomainEvent::OrderCreated { .. }));
        assert!(matches!(events[1], DomainEvent::CartRecovered { .. }));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let ledger = ledger(&store, StockPolicy::Clamp);
        let ctx = RequestContext::seller(tenant);
        let order = seed_order(&store, tenant, OrderStatus::Pending, testing::now(), &[]).await;

        let confirmed = ledger.update_order_status(&ctx, order.id, OrderStatus::Confirmed).await.unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert!(matches!(ledger.update_order_status(&ctx, order.id, OrderStatus::Confirmed).await, Err(CommerceError::Conflict(_))));
        assert!(matches!(
            ledger.update_order_status(&ctx, order.id, OrderStatus::Delivered).await,
            Err(CommerceError::InvalidTransition { from: OrderStatus::Confirmed, to: OrderStatus::Delivered })
        ));
        ledger.update_order_status(&ctx, order.id, OrderStatus::Shipped).await.unwrap();
        ledger.update_order_status(&ctx, order.id, OrderStatus::Delivered).await.unwrap();
        for next in [OrderStatus::Pending, OrderStatus::Cancelled, OrderStatus::Shipped] {
            assert!(matches!(ledger.update_order_status(&ctx, order.id, next).await, Err(CommerceError::InvalidTransition { .. })));
        }
    }

    #[tokio::test]
    async fn test_cancelled_is_terminal_and_does_not_restock() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let p = seed_product(&store, tenant, 10, Some(5)).await;
        let ledger = ledger(&store, StockPolicy::Clamp);
        let order = ledger.create_order(&RequestContext::storefront(tenant), request(vec![(p.id, 2, None)])).await.unwrap();
        let ctx = RequestContext::seller(tenant);

        ledger.update_order_status(&ctx, order.id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(stock_of(&store, tenant, p.id).await, StockLevel::Tracked(3));
        assert!(matches!(
            ledger.update_order_status(&ctx, order.id, OrderStatus::Confirmed).await,
            Err(CommerceError::InvalidTransition { from: OrderStatus::Cancelled, .. })
        ));
    }

    #[tokio::test]
    async fn test_status_write_rechecks_stored_state() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let order = seed_order(&store, tenant, OrderStatus::Pending, testing::now(), &[]).await;
        // another writer cancels between our read and our write
        assert!(store.set_order_status(tenant, order.id, OrderStatus::Pending, OrderStatus::Cancelled, testing::now()).await.unwrap());
        let stale_write = store.set_order_status(tenant, order.id, OrderStatus::Pending, OrderStatus::Confirmed, testing::now()).await.unwrap();
        assert!(!stale_write);
        let result = ledger(&store, StockPolicy::Clamp).update_order_status(&RequestContext::seller(tenant), order.id, OrderStatus::Confirmed).await;
        assert!(matches!(result, Err(CommerceError::InvalidTransition { from: OrderStatus::Cancelled, .. })));
    }

    #[tokio::test]
    async fn test_details_and_soft_delete() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let ledger = ledger(&store, StockPolicy::Clamp);
        let ctx = RequestContext::seller(tenant);
        let order = seed_order(&store, tenant, OrderStatus::Pending, testing::now(), &[]).await;

        let details = OrderDetails { notes: Some(" gift wrap ".into()), internal_notes: None, tags: vec!["vip".into(), " vip".into(), "".into(), "wholesale".into()] };
        let updated = ledger.update_order_details(&ctx, order.id, details).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("gift wrap"));
        assert_eq!(updated.tags, vec!["vip".to_string(), "wholesale".to_string()]);

        ledger.soft_delete_order(&ctx, order.id).await.unwrap();
        assert!(matches!(ledger.get_order(&ctx, order.id).await, Err(CommerceError::NotFound(_))));
        assert!(ledger.list_orders(&ctx, &OrderFilter::default()).await.unwrap().is_empty());
        let all = ledger.list_orders(&ctx, &OrderFilter { include_deleted: true, ..Default::default() }).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(ledger.soft_delete_order(&ctx, order.id).await, Err(CommerceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(200));
        let tenant = TenantId::generate();
        let deps = testing::deps(&store).with_timeout(Duration::from_millis(20));
        let ledger = OrderLedger::new(deps.clone(), DiscountValidator::new(deps), StockPolicy::Clamp);
        let result = ledger.create_order(&RequestContext::storefront(tenant), request(vec![(Uuid::now_v7(), 1, None)])).await;
        assert!(matches!(result, Err(CommerceError::Timeout("products_by_ids"))));
        assert!(result.unwrap_err().is_retryable());
    }
}
