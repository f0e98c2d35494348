//! Product Aggregate
//!
//! The engine only reads products, apart from the stock field which the
//! order ledger reserves through the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{StockLevel, TenantId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub price: Decimal,
    pub cost: Decimal,
    pub stock: StockLevel,
    pub low_stock_threshold: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(tenant_id: TenantId, name: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), tenant_id, name: name.into(), price, cost: Decimal::ZERO,
            stock: StockLevel::Unlimited, low_stock_threshold: 5, active: true,
            created_at: now, updated_at: now,
        }
    }

    pub fn with_stock(mut self, quantity: u32) -> Self { self.stock = StockLevel::Tracked(quantity); self }
    pub fn with_cost(mut self, cost: Decimal) -> Self { self.cost = cost; self }
    pub fn with_low_stock_threshold(mut self, threshold: u32) -> Self { self.low_stock_threshold = threshold; self }
    pub fn archive(mut self) -> Self { self.active = false; self }

    pub fn is_low_stock(&self) -> bool {
        match self.stock { StockLevel::Tracked(q) => q <= self.low_stock_threshold, StockLevel::Unlimited => false }
    }
}
