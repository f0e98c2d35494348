//! PostgreSQL store backed by sqlx.
//!
//! Checkout writes run in one database transaction. Stock and usage
//! counters are changed with single conditional `UPDATE ... RETURNING`
//! statements, and dedup tables keyed by order id make replays no-ops.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

use super::{
    OrderDetails, OrderFilter, RedemptionOutcome, ReservationOutcome, Snapshot, StockPolicy, StockReservation, Store,
    StoreError, StoreResult, UnitOfWork,
};
use crate::domain::{
    AbandonedCart, CartContact, CartLine, Customer, CustomerKey, DiscountCode, DiscountCodeValue, Order, OrderItem,
    OrderStatus, Product, SalesGoal, StockLevel, TenantId,
};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range: {value}")))
}

fn to_u32(value: i32, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {what}: {value}")))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, tenant_id: Uuid, name: String, price: Decimal, cost: Option<Decimal>, stock_quantity: i32,
    low_stock_threshold: i32, active: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        Ok(Product {
            id: r.id, tenant_id: TenantId::new(r.tenant_id), name: r.name, price: r.price, cost: r.cost.unwrap_or_default(),
            stock: StockLevel::from_raw(r.stock_quantity), low_stock_threshold: to_u32(r.low_stock_threshold, "low stock threshold")?,
            active: r.active, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, tenant_id: Uuid, customer_name: String, customer_phone: String, customer_email: Option<String>,
    customer_address: Option<String>, status: String, subtotal: Decimal, discount_code: Option<String>,
    discount_amount: Decimal, shipping_fee: Decimal, total_amount: Decimal, channel: Option<String>,
    notes: Option<String>, internal_notes: Option<String>, tags: Json<Vec<String>>, deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            id: r.id, tenant_id: TenantId::new(r.tenant_id),
            customer: Customer { name: r.customer_name, phone: r.customer_phone, email: r.customer_email, address: r.customer_address },
            status: r.status.parse().map_err(StoreError::Corrupt)?,
            subtotal: r.subtotal, discount_code: r.discount_code, discount_amount: r.discount_amount,
            shipping_fee: r.shipping_fee, total_amount: r.total_amount, channel: r.channel, notes: r.notes,
            internal_notes: r.internal_notes, tags: r.tags.0, deleted_at: r.deleted_at, created_at: r.created_at,
            updated_at: r.updated_at, items: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { id: Uuid, order_id: Uuid, product_id: Uuid, product_name: String, unit_price: Decimal, quantity: i32 }

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> StoreResult<Self> {
        Ok(OrderItem {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name,
            unit_price: r.unit_price, quantity: to_u32(r.quantity, "quantity")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRow {
    id: Uuid, tenant_id: Uuid, code: String, kind: String, value: Decimal, min_order_amount: Option<Decimal>,
    max_uses: Option<i32>, times_used: i32, starts_at: Option<DateTime<Utc>>, expires_at: Option<DateTime<Utc>>,
    active: bool, created_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = StoreError;
    fn try_from(r: DiscountRow) -> StoreResult<Self> {
        Ok(DiscountCode {
            id: r.id, tenant_id: TenantId::new(r.tenant_id),
            code: DiscountCodeValue::new(r.code).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            kind: r.kind.parse().map_err(StoreError::Corrupt)?, value: r.value, min_order_amount: r.min_order_amount,
            max_uses: r.max_uses.map(|m| to_u32(m, "max uses")).transpose()?, times_used: to_u32(r.times_used, "times used")?,
            starts_at: r.starts_at, expires_at: r.expires_at, active: r.active, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid, tenant_id: Uuid, customer_key: String, customer_name: Option<String>, customer_email: Option<String>,
    customer_phone: Option<String>, items: Json<Vec<CartLine>>, total: Decimal, recovered: bool,
    recovered_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for AbandonedCart {
    type Error = StoreError;
    fn try_from(r: CartRow) -> StoreResult<Self> {
        let contact = CartContact { name: r.customer_name, email: r.customer_email, phone: r.customer_phone };
        let customer_key = CustomerKey::from_contact(Some(&r.customer_key), None)
            .ok_or_else(|| StoreError::Corrupt(format!("abandoned cart {} has no customer key", r.id)))?;
        Ok(AbandonedCart {
            id: r.id, tenant_id: TenantId::new(r.tenant_id), customer_key, contact, items: r.items.0, total: r.total,
            recovered: r.recovered, recovered_at: r.recovered_at, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GoalRow { id: Uuid, tenant_id: Uuid, period: String, target_amount: Decimal, start_date: NaiveDate, active: bool }

impl TryFrom<GoalRow> for SalesGoal {
    type Error = StoreError;
    fn try_from(r: GoalRow) -> StoreResult<Self> {
        Ok(SalesGoal {
            id: r.id, tenant_id: TenantId::new(r.tenant_id), period: r.period.parse().map_err(StoreError::Corrupt)?,
            target_amount: r.target_amount, start_date: r.start_date, active: r.active,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn attach_items(orders: Vec<OrderRow>, items: Vec<OrderItemRow>) -> StoreResult<Vec<Order>> {
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        let item = OrderItem::try_from(item)?;
        by_order.entry(item.order_id).or_default().push(item);
    }
    orders
        .into_iter()
        .map(|row| {
            let mut order = Order::try_from(row)?;
            order.items = by_order.remove(&order.id).unwrap_or_default();
            Ok(order)
        })
        .collect()
}

async fn items_for(conn: &mut PgConnection, order_ids: &[Uuid]) -> StoreResult<Vec<OrderItemRow>> {
    let rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, id")
        .bind(order_ids)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, tenant_id, name, price, cost, stock_quantity, low_stock_threshold, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(p.id).bind(p.tenant_id).bind(&p.name).bind(p.price).bind(p.cost).bind(p.stock.to_raw())
            .bind(to_i32(p.low_stock_threshold, "low stock threshold")?).bind(p.active).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn products_by_ids(&self, tenant_id: TenantId, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id).bind(ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn find_order(&self, tenant_id: TenantId, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let Some(row) = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id).bind(id).fetch_optional(&mut *conn).await?
        else {
            return Ok(None);
        };
        let items = items_for(&mut conn, &[id]).await?;
        Ok(attach_items(vec![row], items)?.pop())
    }

    async fn list_orders(&self, tenant_id: TenantId, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE tenant_id = $1 \
             AND ($2::text IS NULL OR status = $2) \
             AND ($3::timestamptz IS NULL OR created_at >= $3) \
             AND ($4::timestamptz IS NULL OR created_at < $4) \
             AND ($5 OR deleted_at IS NULL) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(tenant_id).bind(filter.status.map(|s| s.as_str())).bind(filter.created_from).bind(filter.created_to)
        .bind(filter.include_deleted)
        .fetch_all(&mut *conn).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = items_for(&mut conn, &ids).await?;
        attach_items(rows, items)
    }

    async fn set_order_status(&self, tenant_id: TenantId, id: Uuid, expected: OrderStatus, next: OrderStatus, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE orders SET status = $4, updated_at = $5 WHERE tenant_id = $1 AND id = $2 AND status = $3 AND deleted_at IS NULL")
            .bind(tenant_id).bind(id).bind(expected.as_str()).bind(next.as_str()).bind(at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_order_details(&self, tenant_id: TenantId, id: Uuid, details: &OrderDetails, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE orders SET notes = $3, internal_notes = $4, tags = $5, updated_at = $6 WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL")
            .bind(tenant_id).bind(id).bind(&details.notes).bind(&details.internal_notes).bind(Json(&details.tags)).bind(at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete_order(&self, tenant_id: TenantId, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE orders SET deleted_at = $3, updated_at = $3 WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL")
            .bind(tenant_id).bind(id).bind(at).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<Vec<(TenantId, Uuid)>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT tenant_id, id FROM orders WHERE status = 'pending' AND deleted_at IS NULL AND created_at <= $1 ORDER BY created_at, id LIMIT $2",
        )
        .bind(cutoff).bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(tenant, id)| (TenantId::new(tenant), id)).collect())
    }

    async fn insert_discount_code(&self, c: &DiscountCode) -> StoreResult<()> {
        let max_uses = c.max_uses.map(|m| to_i32(m, "max uses")).transpose()?;
        let result = sqlx::query("INSERT INTO discount_codes (id, tenant_id, code, kind, value, min_order_amount, max_uses, times_used, starts_at, expires_at, active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) ON CONFLICT (tenant_id, code) DO NOTHING")
            .bind(c.id).bind(c.tenant_id).bind(c.code.as_str()).bind(c.kind.as_str()).bind(c.value).bind(c.min_order_amount)
            .bind(max_uses).bind(to_i32(c.times_used, "times used")?).bind(c.starts_at).bind(c.expires_at).bind(c.active).bind(c.created_at)
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("discount code {} already exists", c.code)));
        }
        Ok(())
    }

    async fn find_discount_code(&self, tenant_id: TenantId, code: &DiscountCodeValue) -> StoreResult<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountRow>("SELECT * FROM discount_codes WHERE tenant_id = $1 AND code = $2 AND active")
            .bind(tenant_id).bind(code.as_str()).fetch_optional(&self.pool).await?;
        row.map(DiscountCode::try_from).transpose()
    }

    async fn upsert_abandoned_cart(&self, cart: &AbandonedCart) -> StoreResult<AbandonedCart> {
        let row = sqlx::query_as::<_, CartRow>(
            "INSERT INTO abandoned_carts (id, tenant_id, customer_key, customer_name, customer_email, customer_phone, items, total, recovered, recovered_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, NULL, $9, $10) \
             ON CONFLICT (tenant_id, customer_key) WHERE NOT recovered DO UPDATE SET \
                items = EXCLUDED.items, total = EXCLUDED.total, \
                customer_name = COALESCE(EXCLUDED.customer_name, abandoned_carts.customer_name), \
                customer_email = COALESCE(EXCLUDED.customer_email, abandoned_carts.customer_email), \
                customer_phone = COALESCE(EXCLUDED.customer_phone, abandoned_carts.customer_phone), \
                updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(cart.id).bind(cart.tenant_id).bind(cart.customer_key.as_str()).bind(&cart.contact.name)
        .bind(&cart.contact.email).bind(&cart.contact.phone).bind(Json(&cart.items)).bind(cart.total)
        .bind(cart.created_at).bind(cart.updated_at)
        .fetch_one(&self.pool).await?;
        AbandonedCart::try_from(row)
    }

    async fn list_abandoned_carts(&self, tenant_id: TenantId, include_recovered: bool) -> StoreResult<Vec<AbandonedCart>> {
        let rows = sqlx::query_as::<_, CartRow>("SELECT * FROM abandoned_carts WHERE tenant_id = $1 AND ($2 OR NOT recovered) ORDER BY updated_at DESC, id")
            .bind(tenant_id).bind(include_recovered).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn insert_goal(&self, g: &SalesGoal) -> StoreResult<()> {
        sqlx::query("INSERT INTO sales_goals (id, tenant_id, period, target_amount, start_date, active) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(g.id).bind(g.tenant_id).bind(g.period.as_str()).bind(g.target_amount).bind(g.start_date).bind(g.active)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn snapshot(&self, tenant_id: TenantId) -> StoreResult<Snapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY").execute(&mut *tx).await?;

        let orders = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY created_at, id")
            .bind(tenant_id).fetch_all(&mut *tx).await?;
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT oi.* FROM order_items oi JOIN orders o ON o.id = oi.order_id WHERE o.tenant_id = $1 AND o.deleted_at IS NULL ORDER BY oi.order_id, oi.id",
        )
        .bind(tenant_id).fetch_all(&mut *tx).await?;
        let products = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE tenant_id = $1 ORDER BY id")
            .bind(tenant_id).fetch_all(&mut *tx).await?;
        let goals = sqlx::query_as::<_, GoalRow>("SELECT * FROM sales_goals WHERE tenant_id = $1 AND active ORDER BY id")
            .bind(tenant_id).fetch_all(&mut *tx).await?;
        let carts = sqlx::query_as::<_, CartRow>("SELECT * FROM abandoned_carts WHERE tenant_id = $1 ORDER BY id")
            .bind(tenant_id).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        Ok(Snapshot { orders: attach_items(orders, items)?, products: collect(products)?, goals: collect(goals)?, carts: collect(carts)? })
    }
}

// =============================================================================
// Unit of work
// =============================================================================

struct PgUnit { tx: Transaction<'static, Postgres> }

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn insert_order(&mut self, o: &Order) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO orders (id, tenant_id, customer_name, customer_phone, customer_email, customer_address, status, subtotal, discount_code, discount_amount, shipping_fee, total_amount, channel, notes, internal_notes, tags, deleted_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NULL, $17, $18) ON CONFLICT (id) DO NOTHING",
        )
        .bind(o.id).bind(o.tenant_id).bind(&o.customer.name).bind(&o.customer.phone).bind(&o.customer.email)
        .bind(&o.customer.address).bind(o.status.as_str()).bind(o.subtotal).bind(&o.discount_code).bind(o.discount_amount)
        .bind(o.shipping_fee).bind(o.total_amount).bind(&o.channel).bind(&o.notes).bind(&o.internal_notes)
        .bind(Json(&o.tags)).bind(o.created_at).bind(o.updated_at)
        .execute(&mut *self.tx).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> StoreResult<()> {
        for item in items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, product_name, unit_price, quantity) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.product_name).bind(item.unit_price)
                .bind(to_i32(item.quantity, "quantity")?)
                .execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn reserve_stock(&mut self, r: StockReservation) -> StoreResult<ReservationOutcome> {
        let quantity = to_i32(r.quantity, "quantity")?;
        let claimed = sqlx::query("INSERT INTO stock_reservations (order_id, product_id, quantity) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING")
            .bind(r.order_id).bind(r.product_id).bind(quantity)
            .execute(&mut *self.tx).await?;
        if claimed.rows_affected() == 0 {
            return Ok(ReservationOutcome::AlreadyApplied);
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            "UPDATE products SET \
                stock_quantity = CASE WHEN stock_quantity < 0 THEN stock_quantity ELSE GREATEST(stock_quantity - $3, 0) END, \
                updated_at = NOW() \
             WHERE id = $1 AND tenant_id = $2 AND (stock_quantity < 0 OR stock_quantity >= $3 OR $4) \
             RETURNING stock_quantity",
        )
        .bind(r.product_id).bind(r.tenant_id).bind(quantity).bind(r.policy == StockPolicy::Clamp)
        .fetch_optional(&mut *self.tx).await?;
        if let Some(raw) = remaining {
            return Ok(ReservationOutcome::Applied { remaining: StockLevel::from_raw(raw) });
        }

        // the claim row above is discarded with the rollback that follows a failed reservation
        let current: Option<i32> = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1 AND tenant_id = $2")
            .bind(r.product_id).bind(r.tenant_id).fetch_optional(&mut *self.tx).await?;
        Ok(match current {
            Some(raw) => ReservationOutcome::Insufficient { available: raw.max(0) as u32 },
            None => ReservationOutcome::ProductMissing,
        })
    }

    async fn redeem_discount(&mut self, tenant_id: TenantId, code_id: Uuid, order_id: Uuid) -> StoreResult<RedemptionOutcome> {
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM discount_codes WHERE id = $1 AND tenant_id = $2")
            .bind(code_id).bind(tenant_id).fetch_optional(&mut *self.tx).await?;
        if exists.is_none() {
            return Ok(RedemptionOutcome::CodeMissing);
        }
        let claimed = sqlx::query("INSERT INTO discount_redemptions (code_id, order_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(code_id).bind(order_id).execute(&mut *self.tx).await?;
        if claimed.rows_affected() == 0 {
            return Ok(RedemptionOutcome::AlreadyRedeemed);
        }
        let times_used: Option<i32> = sqlx::query_scalar(
            "UPDATE discount_codes SET times_used = times_used + 1 WHERE id = $1 AND tenant_id = $2 AND (max_uses IS NULL OR times_used < max_uses) RETURNING times_used",
        )
        .bind(code_id).bind(tenant_id).fetch_optional(&mut *self.tx).await?;
        Ok(match times_used {
            Some(n) => RedemptionOutcome::Redeemed { times_used: to_u32(n, "times used")? },
            None => RedemptionOutcome::Exhausted,
        })
    }

    async fn recover_abandoned_cart(&mut self, tenant_id: TenantId, customer_key: &CustomerKey, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE abandoned_carts SET recovered = TRUE, recovered_at = $3, updated_at = $3 WHERE tenant_id = $1 AND customer_key = $2 AND NOT recovered")
            .bind(tenant_id).bind(customer_key.as_str()).bind(at)
            .execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
