//! Abandoned cart tracking.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{check_amount, Deps};
use crate::context::RequestContext;
use crate::domain::{AbandonedCart, CartContact, CartLine, CustomerKey};
use crate::{CommerceError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TrackCart {
    #[validate(length(max = 200))]
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 40))]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub items: Vec<CartLine>,
    /// Computed from the lines when absent.
    pub total: Option<Decimal>,
}

impl TrackCart {
    fn contact(&self) -> CartContact {
        let clean = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        CartContact { name: clean(&self.customer_name), email: clean(&self.customer_email), phone: clean(&self.customer_phone) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CartStats {
    pub open: usize,
    pub recovered: usize,
    /// Recovered share of all tracked carts, in percent.
    pub recovery_rate: Decimal,
    pub open_value: Decimal,
}

pub fn cart_stats(carts: &[AbandonedCart]) -> CartStats {
    let recovered = carts.iter().filter(|c| c.recovered).count();
    let open_value = carts.iter().filter(|c| !c.recovered).fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.total));
    let recovery_rate = if carts.is_empty() {
        Decimal::ZERO
    } else {
        (Decimal::from(recovered as u64) * Decimal::ONE_HUNDRED / Decimal::from(carts.len() as u64))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };
    CartStats { open: carts.len() - recovered, recovered, recovery_rate, open_value }
}

#[derive(Clone)]
pub struct CartTracker { deps: Deps }

impl CartTracker {
    pub fn new(deps: Deps) -> Self { Self { deps } }

    /// Record the latest snapshot of a customer's cart. A customer has at
    /// most one open record; tracking again replaces its contents.
    #[tracing::instrument(skip(self, input), fields(tenant_id = %ctx.tenant_id))]
    pub async fn track(&self, ctx: &RequestContext, input: TrackCart) -> Result<AbandonedCart> {
        input.validate()?;
        if input.items.iter().any(|l| l.quantity == 0) {
            return Err(CommerceError::Validation("cart lines need a positive quantity".into()));
        }
        for line in &input.items {
            check_amount("cart line price", line.unit_price)?;
        }
        let contact = input.contact();
        let key = contact.key().ok_or_else(|| CommerceError::Validation("cart needs an email or phone".into()))?;
        let total = match input.total {
            Some(total) => total,
            None => input
                .items
                .iter()
                .try_fold(Decimal::ZERO, |acc, l| l.line_total().and_then(|t| acc.checked_add(t)))
                .ok_or_else(|| CommerceError::Validation("cart total is out of range".into()))?,
        };
        check_amount("cart total", total)?;

        let cart = AbandonedCart::open(ctx.tenant_id, key, contact, input.items, total, self.deps.now());
        let stored = self.deps.call("upsert_abandoned_cart", self.deps.store.upsert_abandoned_cart(&cart)).await?;
        tracing::debug!(cart_id = %stored.id, customer_key = %stored.customer_key, lines = stored.items.len(), "abandoned cart tracked");
        Ok(stored)
    }

    /// Mark the customer's open cart recovered. Returns false when there is none.
    pub async fn reconcile(&self, ctx: &RequestContext, key: &CustomerKey) -> Result<bool> {
        let mut tx = self.deps.call("begin", self.deps.store.begin()).await?;
        let recovered = match self.deps.call("recover_abandoned_cart", tx.recover_abandoned_cart(ctx.tenant_id, key, self.deps.now())).await {
            Ok(r) => r,
            Err(e) => {
                if let Err(rb) = tx.rollback().await { tracing::warn!(error = %rb, "rollback failed"); }
                return Err(e);
            }
        };
        self.deps.call("commit", tx.commit()).await?;
        if recovered {
            tracing::info!(tenant_id = %ctx.tenant_id, customer_key = %key, "abandoned cart recovered");
        }
        Ok(recovered)
    }

    pub async fn list(&self, ctx: &RequestContext, include_recovered: bool) -> Result<Vec<AbandonedCart>> {
        self.deps.call("list_abandoned_carts", self.deps.store.list_abandoned_carts(ctx.tenant_id, include_recovered)).await
    }

    pub async fn stats(&self, ctx: &RequestContext) -> Result<CartStats> {
        Ok(cart_stats(&self.list(ctx, true).await?))
    }
}
