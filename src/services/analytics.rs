//! Analytics aggregator
//!
//! Everything here is computed from a single [`Snapshot`] by pure
//! functions. Grouping goes through ordered maps and every sort has a
//! tie-breaker, so two runs over the same snapshot serialize identically.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::carts::{cart_stats, CartStats};
use super::{check_amount, Deps};
use crate::context::RequestContext;
use crate::domain::{CustomerKey, GoalPeriod, Order, OrderStatus, Product, SalesGoal, StockLevel};
use crate::store::Snapshot;
use crate::{CommerceError, Result};

const DAILY_SERIES_DAYS: usize = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    #[default]
    All,
    Week,
    Month,
    Year,
}

impl Window {
    /// Earliest `created_at` included in the window, or `None` for all time.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::All => None,
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Year => now.checked_sub_months(Months::new(12)),
        }
    }
}

impl FromStr for Window {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All), "week" => Ok(Self::Week), "month" => Ok(Self::Month), "year" => Ok(Self::Year),
            other => Err(format!("unknown window: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u64,
    pub revenue: Decimal,
    pub last_sold_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerStats {
    pub key: CustomerKey,
    pub name: String,
    pub order_count: usize,
    pub total_spent: Decimal,
    pub last_order_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelStats {
    pub channel: String,
    pub order_count: usize,
    pub revenue: Decimal,
    pub customers: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub order_count: usize,
    pub revenue: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GoalProgress {
    /// Percent of target reached, capped at 100.
    pub progress: Decimal,
    pub remaining: Decimal,
    pub achieved: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalReport {
    pub goal_id: Uuid,
    pub period: GoalPeriod,
    pub target_amount: Decimal,
    pub period_start: DateTime<Utc>,
    pub revenue: Decimal,
    #[serde(flatten)]
    pub progress: GoalProgress,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LowStockAlert {
    pub product_id: Uuid,
    pub name: String,
    pub stock: u32,
    pub threshold: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub order_count: usize,
    pub pending_count: usize,
    pub paid_count: usize,
    pub average_order_value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub window: Window,
    pub generated_at: DateTime<Utc>,
    pub revenue: Decimal,
    pub profit: Decimal,
    pub summary: Summary,
    pub products: Vec<ProductSales>,
    pub customers: Vec<CustomerStats>,
    pub channels: Vec<ChannelStats>,
    pub daily: Vec<DailyPoint>,
    pub goals: Vec<GoalReport>,
    pub low_stock: Vec<LowStockAlert>,
    pub carts: CartStats,
    /// Set when the report could not be computed; all figures are then zero.
    pub error: Option<String>,
}

impl Report {
    pub fn empty(window: Window, generated_at: DateTime<Utc>, error: Option<String>) -> Self {
        Self {
            window,
            generated_at,
            revenue: Decimal::ZERO,
            profit: Decimal::ZERO,
            summary: Summary::default(),
            products: Vec::new(),
            customers: Vec::new(),
            channels: Vec::new(),
            daily: Vec::new(),
            goals: Vec::new(),
            low_stock: Vec::new(),
            carts: CartStats::default(),
            error,
        }
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn in_window(order: &Order, start: Option<DateTime<Utc>>) -> bool {
    start.map_or(true, |s| order.created_at >= s)
}

/// Orders in the window, deleted ones dropped.
pub fn windowed(orders: &[Order], start: Option<DateTime<Utc>>) -> Vec<&Order> {
    orders.iter().filter(|o| !o.is_deleted() && in_window(o, start)).collect()
}

pub fn revenue<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Decimal {
    orders.into_iter().filter(|o| o.status.counts_as_revenue()).fold(Decimal::ZERO, |acc, o| acc.saturating_add(o.total_amount))
}

/// Revenue minus the current cost of every unit sold. Items whose product
/// no longer exists are costed at zero.
pub fn profit<'a>(orders: impl IntoIterator<Item = &'a Order> + Clone, products: &[Product]) -> Decimal {
    let cost: BTreeMap<Uuid, Decimal> = products.iter().map(|p| (p.id, p.cost)).collect();
    let cost_of_goods: Decimal = orders
        .clone()
        .into_iter()
        .filter(|o| o.status.counts_as_revenue())
        .flat_map(|o| o.items.iter())
        .map(|i| cost.get(&i.product_id).copied().unwrap_or(Decimal::ZERO).saturating_mul(Decimal::from(i.quantity)))
        .fold(Decimal::ZERO, Decimal::saturating_add);
    revenue(orders).saturating_sub(cost_of_goods)
}

pub fn product_sales(orders: &[&Order]) -> Vec<ProductSales> {
    let mut by_product: BTreeMap<Uuid, ProductSales> = BTreeMap::new();
    for order in orders.iter().filter(|o| !o.is_cancelled()) {
        for item in &order.items {
            let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
                product_id: item.product_id,
                name: item.product_name.clone(),
                quantity: 0,
                revenue: Decimal::ZERO,
                last_sold_at: order.created_at,
            });
            entry.quantity += u64::from(item.quantity);
            entry.revenue = entry.revenue.saturating_add(item.line_total());
            if order.created_at >= entry.last_sold_at {
                entry.last_sold_at = order.created_at;
                entry.name = item.product_name.clone();
            }
        }
    }
    let mut sales: Vec<ProductSales> = by_product.into_values().collect();
    sales.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.product_id.cmp(&b.product_id)));
    sales
}

pub fn customers(orders: &[&Order]) -> Vec<CustomerStats> {
    let mut by_key: BTreeMap<CustomerKey, CustomerStats> = BTreeMap::new();
    for order in orders {
        let Some(key) = order.customer_key() else { continue };
        let entry = by_key.entry(key.clone()).or_insert_with(|| CustomerStats {
            key,
            name: order.customer.name.clone(),
            order_count: 0,
            total_spent: Decimal::ZERO,
            last_order_at: order.created_at,
        });
        entry.order_count += 1;
        if !order.is_cancelled() {
            entry.total_spent = entry.total_spent.saturating_add(order.total_amount);
        }
        if order.created_at >= entry.last_order_at {
            entry.last_order_at = order.created_at;
            entry.name = order.customer.name.clone();
        }
    }
    let mut stats: Vec<CustomerStats> = by_key.into_values().collect();
    stats.sort_by(|a, b| b.total_spent.cmp(&a.total_spent).then(a.key.cmp(&b.key)));
    stats
}

pub fn channels(orders: &[&Order]) -> Vec<ChannelStats> {
    let mut by_channel: BTreeMap<String, (usize, Decimal, BTreeSet<CustomerKey>)> = BTreeMap::new();
    for order in orders.iter().filter(|o| !o.is_cancelled()) {
        let channel = order.channel.clone().unwrap_or_else(|| "unknown".to_string());
        let entry = by_channel.entry(channel).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(order.total_amount);
        if let Some(key) = order.customer_key() {
            entry.2.insert(key);
        }
    }
    let mut stats: Vec<ChannelStats> = by_channel
        .into_iter()
        .map(|(channel, (order_count, revenue, customers))| ChannelStats { channel, order_count, revenue, customers: customers.len() })
        .collect();
    stats.sort_by(|a, b| b.order_count.cmp(&a.order_count).then_with(|| a.channel.cmp(&b.channel)));
    stats
}

/// Non-cancelled orders per UTC day: the `days` most recent days that had
/// any, oldest first.
pub fn daily_series(orders: &[Order], days: usize) -> Vec<DailyPoint> {
    let mut by_day: BTreeMap<NaiveDate, (usize, Decimal)> = BTreeMap::new();
    for order in orders.iter().filter(|o| !o.is_deleted() && !o.is_cancelled()) {
        let entry = by_day.entry(order.created_at.date_naive()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(order.total_amount);
    }
    let skip = by_day.len().saturating_sub(days);
    by_day
        .into_iter()
        .skip(skip)
        .map(|(date, (order_count, revenue))| DailyPoint { date, order_count, revenue })
        .collect()
}

pub fn goal_progress(target: Decimal, revenue: Decimal) -> GoalProgress {
    if target <= Decimal::ZERO {
        return GoalProgress { progress: Decimal::ONE_HUNDRED, remaining: Decimal::ZERO, achieved: true };
    }
    GoalProgress {
        progress: revenue
            .checked_div(target)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map_or(Decimal::ONE_HUNDRED, round2)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED),
        remaining: target.saturating_sub(revenue).max(Decimal::ZERO),
        achieved: revenue >= target,
    }
}

/// Progress of each active goal over its current period.
pub fn goal_reports(goals: &[SalesGoal], orders: &[Order], now: DateTime<Utc>) -> Vec<GoalReport> {
    let mut reports: Vec<GoalReport> = goals
        .iter()
        .filter(|g| g.active)
        .map(|goal| {
            let period_start = goal.current_period_start(now);
            let revenue = revenue(orders.iter().filter(|o| !o.is_deleted() && o.created_at >= period_start && o.created_at <= now));
            GoalReport {
                goal_id: goal.id,
                period: goal.period,
                target_amount: goal.target_amount,
                period_start,
                revenue,
                progress: goal_progress(goal.target_amount, revenue),
            }
        })
        .collect();
    reports.sort_by_key(|r| r.goal_id);
    reports
}

pub fn low_stock(products: &[Product]) -> Vec<LowStockAlert> {
    let mut alerts: Vec<LowStockAlert> = products
        .iter()
        .filter(|p| p.active && p.is_low_stock())
        .filter_map(|p| match p.stock {
            StockLevel::Tracked(stock) => Some(LowStockAlert { product_id: p.id, name: p.name.clone(), stock, threshold: p.low_stock_threshold }),
            StockLevel::Unlimited => None,
        })
        .collect();
    alerts.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.product_id.cmp(&b.product_id)));
    alerts
}

fn summary(orders: &[&Order], revenue: Decimal) -> Summary {
    let paid_count = orders.iter().filter(|o| o.status.counts_as_revenue()).count();
    Summary {
        order_count: orders.len(),
        pending_count: orders.iter().filter(|o| o.status == OrderStatus::Pending).count(),
        paid_count,
        average_order_value: if paid_count == 0 { Decimal::ZERO } else { round2(revenue / Decimal::from(paid_count as u64)) },
    }
}

pub fn build_report(snapshot: &Snapshot, window: Window, now: DateTime<Utc>) -> Report {
    let orders = windowed(&snapshot.orders, window.start(now));
    let revenue = revenue(orders.iter().copied());
    Report {
        window,
        generated_at: now,
        revenue,
        profit: profit(orders.iter().copied(), &snapshot.products),
        summary: summary(&orders, revenue),
        products: product_sales(&orders),
        customers: customers(&orders),
        channels: channels(&orders),
        daily: daily_series(&snapshot.orders, DAILY_SERIES_DAYS),
        goals: goal_reports(&snapshot.goals, &snapshot.orders, now),
        low_stock: low_stock(&snapshot.products),
        carts: cart_stats(&snapshot.carts),
        error: None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
    pub period: GoalPeriod,
    pub target_amount: Decimal,
    pub start_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct Analytics { deps: Deps }

impl Analytics {
    pub fn new(deps: Deps) -> Self { Self { deps } }

    /// Dashboard report. Never fails: store errors produce an empty report
    /// with `error` set.
    pub async fn report(&self, ctx: &RequestContext, window: Window) -> Report {
        let now = self.deps.now();
        match self.deps.call("snapshot", self.deps.store.snapshot(ctx.tenant_id)).await {
            Ok(snapshot) => build_report(&snapshot, window, now),
            Err(e) => {
                tracing::warn!(tenant_id = %ctx.tenant_id, error = %e, "analytics degraded to empty report");
                Report::empty(window, now, Some(e.to_string()))
            }
        }
    }

    pub async fn add_goal(&self, ctx: &RequestContext, input: NewGoal) -> Result<SalesGoal> {
        if input.target_amount <= Decimal::ZERO {
            return Err(CommerceError::Validation("goal target must be positive".into()));
        }
        check_amount("goal target", input.target_amount)?;
        let start_date = input.start_date.unwrap_or_else(|| self.deps.now().date_naive());
        let goal = SalesGoal::create(ctx.tenant_id, input.period, input.target_amount, start_date);
        self.deps.call("insert_goal", self.deps.store.insert_goal(&goal)).await?;
        tracing::info!(tenant_id = %ctx.tenant_id, goal_id = %goal.id, period = goal.period.as_str(), "sales goal added");
        Ok(goal)
    }
}
