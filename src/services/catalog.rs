//! Catalog writes needed to stock the engine: products with price, cost
//! and tracked or unlimited stock.

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use super::{check_amount, Deps};
use crate::context::RequestContext;
use crate::domain::Product;
use crate::Result;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub cost: Decimal,
    /// Tracked stock; absent means unlimited.
    #[validate(range(max = 2147483647))]
    pub stock: Option<u32>,
    #[validate(range(max = 2147483647))]
    pub low_stock_threshold: Option<u32>,
}

#[derive(Clone)]
pub struct Catalog { deps: Deps }

impl Catalog {
    pub fn new(deps: Deps) -> Self { Self { deps } }

    pub async fn add_product(&self, ctx: &RequestContext, input: NewProduct) -> Result<Product> {
        input.validate()?;
        check_amount("price", input.price)?;
        check_amount("cost", input.cost)?;
        let mut product = Product::create(ctx.tenant_id, input.name.trim(), input.price).with_cost(input.cost);
        if let Some(qty) = input.stock { product = product.with_stock(qty); }
        if let Some(threshold) = input.low_stock_threshold { product = product.with_low_stock_threshold(threshold); }
        let now = self.deps.now();
        product.created_at = now;
        product.updated_at = now;

        self.deps.call("insert_product", self.deps.store.insert_product(&product)).await?;
        tracing::info!(tenant_id = %ctx.tenant_id, product_id = %product.id, "product added");
        Ok(product)
    }
}
