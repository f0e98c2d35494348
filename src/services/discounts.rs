//! Discount code validation and redemption.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{check_amount, Deps};
use crate::context::RequestContext;
use crate::domain::{DiscountCode, DiscountCodeValue, DiscountKind, DiscountRejection};
use crate::store::RedemptionOutcome;
use crate::{CommerceError, Result};

/// A code that passed validation against a given subtotal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub code_id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub amount: Decimal,
    /// The caller waives shipping; `amount` stays zero for this.
    pub free_shipping: bool,
}

/// Evaluate `code` against `subtotal`. Checks run in a fixed order and the
/// first failure wins.
pub fn evaluate(code: Option<&DiscountCode>, subtotal: Decimal, now: DateTime<Utc>) -> std::result::Result<DiscountQuote, DiscountRejection> {
    let code = code.filter(|c| c.active).ok_or(DiscountRejection::NotFound)?;
    if code.is_expired(now) { return Err(DiscountRejection::Expired); }
    if !code.has_started(now) { return Err(DiscountRejection::NotStarted); }
    if !code.has_remaining_uses() { return Err(DiscountRejection::UsageLimitReached); }
    if let Some(minimum) = code.min_order_amount {
        if subtotal < minimum { return Err(DiscountRejection::BelowMinimum { minimum }); }
    }

    let subtotal = subtotal.max(Decimal::ZERO);
    let amount = match code.kind {
        DiscountKind::Percentage => (subtotal * code.value / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .clamp(Decimal::ZERO, subtotal),
        DiscountKind::Fixed => code.value.clamp(Decimal::ZERO, subtotal),
        DiscountKind::FreeShipping => Decimal::ZERO,
    };
    Ok(DiscountQuote {
        code_id: code.id,
        code: code.code.to_string(),
        kind: code.kind,
        amount,
        free_shipping: code.kind == DiscountKind::FreeShipping,
    })
}

/// Response shape for clients asking whether a code applies.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiscountValidation {
    pub valid: bool,
    pub discount_amount: Decimal,
    pub free_shipping: bool,
    pub error: Option<String>,
    pub reason: Option<&'static str>,
}

impl From<std::result::Result<DiscountQuote, DiscountRejection>> for DiscountValidation {
    fn from(result: std::result::Result<DiscountQuote, DiscountRejection>) -> Self {
        match result {
            Ok(q) => Self { valid: true, discount_amount: q.amount, free_shipping: q.free_shipping, error: None, reason: None },
            Err(r) => Self { valid: false, discount_amount: Decimal::ZERO, free_shipping: false, error: Some(r.to_string()), reason: Some(r.code()) },
        }
    }
}

/// A seller-defined code. `value` is percentage points for percentage
/// codes, a currency amount for fixed codes and ignored for free shipping.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDiscountCode {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub kind: DiscountKind,
    #[serde(default)]
    pub value: Decimal,
    pub min_order_amount: Option<Decimal>,
    #[validate(range(min = 1, max = 2147483647))]
    pub max_uses: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewDiscountCode {
    fn check(&self) -> Result<()> {
        self.validate()?;
        match self.kind {
            DiscountKind::Percentage => {
                if self.value < Decimal::ZERO || self.value > Decimal::ONE_HUNDRED {
                    return Err(CommerceError::Validation("percentage must be between 0 and 100".into()));
                }
                check_amount("discount value", self.value)?;
            }
            DiscountKind::Fixed => check_amount("discount value", self.value)?,
            DiscountKind::FreeShipping => {}
        }
        if let Some(minimum) = self.min_order_amount {
            check_amount("minimum order amount", minimum)?;
        }
        if let (Some(starts), Some(expires)) = (self.starts_at, self.expires_at) {
            if starts > expires {
                return Err(CommerceError::Validation("discount code starts after it expires".into()));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct DiscountValidator { deps: Deps }

impl DiscountValidator {
    pub fn new(deps: Deps) -> Self { Self { deps } }

    /// Look up and evaluate a code. Rejections surface as `CommerceError::Discount`.
    pub async fn quote(&self, ctx: &RequestContext, code: &str, subtotal: Decimal) -> Result<DiscountQuote> {
        let value = DiscountCodeValue::new(code).map_err(|_| CommerceError::Discount(DiscountRejection::NotFound))?;
        let found = self.deps.call("find_discount_code", self.deps.store.find_discount_code(ctx.tenant_id, &value)).await?;
        evaluate(found.as_ref(), subtotal, self.deps.now()).map_err(|reason| {
            tracing::debug!(tenant_id = %ctx.tenant_id, code = %value, reason = reason.code(), "discount code rejected");
            CommerceError::Discount(reason)
        })
    }

    /// Like [`quote`](Self::quote), but reports rejections in the result body
    /// instead of as errors. Store failures still propagate.
    pub async fn validate(&self, ctx: &RequestContext, code: &str, subtotal: Decimal) -> Result<DiscountValidation> {
        match self.quote(ctx, code, subtotal).await {
            Ok(quote) => Ok(Ok(quote).into()),
            Err(CommerceError::Discount(reason)) => Ok(Err(reason).into()),
            Err(e) => Err(e),
        }
    }

    /// Create a code for the caller's tenant. Codes are unique per tenant
    /// after normalization; a duplicate is a `Conflict`.
    pub async fn add_code(&self, ctx: &RequestContext, input: NewDiscountCode) -> Result<DiscountCode> {
        input.check()?;
        let value = DiscountCodeValue::new(&input.code).map_err(|e| CommerceError::Validation(e.to_string()))?;
        let amount = if input.kind == DiscountKind::FreeShipping { Decimal::ZERO } else { input.value };
        let mut code = DiscountCode::create(ctx.tenant_id, value, input.kind, amount)
            .with_window(input.starts_at, input.expires_at);
        code.min_order_amount = input.min_order_amount;
        code.max_uses = input.max_uses;
        code.created_at = self.deps.now();

        self.deps.call("insert_discount_code", self.deps.store.insert_discount_code(&code)).await?;
        tracing::info!(tenant_id = %ctx.tenant_id, code = %code.code, kind = code.kind.as_str(), "discount code added");
        Ok(code)
    }

    /// Count one redemption of `code_id` by `order_id` outside of checkout.
    /// Repeating the call for the same order changes nothing.
    pub async fn increment_usage(&self, ctx: &RequestContext, code_id: Uuid, order_id: Uuid) -> Result<RedemptionOutcome> {
        let mut tx = self.deps.call("begin", self.deps.store.begin()).await?;
        let outcome = match self.deps.call("redeem_discount", tx.redeem_discount(ctx.tenant_id, code_id, order_id)).await {
            Ok(outcome @ RedemptionOutcome::Redeemed { .. }) => outcome,
            Ok(outcome) => {
                // nothing to keep; drop any claim row written before the refusal
                if let Err(rb) = tx.rollback().await { tracing::warn!(error = %rb, "rollback failed"); }
                return Ok(outcome);
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await { tracing::warn!(error = %rb, "rollback failed"); }
                return Err(e);
            }
        };
        self.deps.call("commit", tx.commit()).await?;
        tracing::info!(tenant_id = %ctx.tenant_id, code_id = %code_id, order_id = %order_id, "discount usage incremented");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::domain::TenantId;
    use crate::services::testing::{self, money};
    use crate::store::{MemoryStore, Store};
    use chrono::Duration;

    fn code(kind: DiscountKind, value: i64) -> DiscountCode {
        DiscountCode::create(TenantId::generate(), DiscountCodeValue::new("SAVE").unwrap(), kind, money(value))
    }

    #[test]
    fn test_percentage_and_fixed_amounts() {
        let now = testing::now();
        let pct = evaluate(Some(&code(DiscountKind::Percentage, 10)), money(100), now).unwrap();
        assert_eq!(pct.amount, Decimal::new(1000, 2));
        let fixed = evaluate(Some(&code(DiscountKind::Fixed, 150)), money(100), now).unwrap();
        assert_eq!(fixed.amount, Decimal::new(10000, 2));
        let ship = evaluate(Some(&code(DiscountKind::FreeShipping, 0)), money(100), now).unwrap();
        assert_eq!(ship.amount, Decimal::ZERO);
        assert!(ship.free_shipping);
    }

    #[test]
    fn test_exhausted_code_rejected() {
        let mut c = code(DiscountKind::Percentage, 10).with_max_uses(1);
        c.times_used = 1;
        assert_eq!(evaluate(Some(&c), money(100), testing::now()), Err(DiscountRejection::UsageLimitReached));
    }

    #[test]
    fn test_first_failure_wins() {
        let now = testing::now();
        let mut c = code(DiscountKind::Fixed, 5)
            .with_window(Some(now + Duration::days(1)), Some(now - Duration::days(1)))
            .with_max_uses(1)
            .with_min_order(money(50));
        c.times_used = 1;
        assert_eq!(evaluate(Some(&c), money(10), now), Err(DiscountRejection::Expired));
        c.expires_at = None;
        assert_eq!(evaluate(Some(&c), money(10), now), Err(DiscountRejection::NotStarted));
        c.starts_at = None;
        assert_eq!(evaluate(Some(&c), money(10), now), Err(DiscountRejection::UsageLimitReached));
        c.max_uses = None;
        assert_eq!(evaluate(Some(&c), money(10), now), Err(DiscountRejection::BelowMinimum { minimum: money(50) }));
        assert!(evaluate(Some(&c), money(50), now).is_ok());
    }

    #[test]
    fn test_inactive_or_missing_is_not_found() {
        let mut c = code(DiscountKind::Fixed, 5);
        c.active = false;
        assert_eq!(evaluate(Some(&c), money(10), testing::now()), Err(DiscountRejection::NotFound));
        assert_eq!(evaluate(None, money(10), testing::now()), Err(DiscountRejection::NotFound));
    }

    #[tokio::test]
    async fn test_lookup_normalizes_code() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let c = DiscountCode::create(tenant, DiscountCodeValue::new("welcome").unwrap(), DiscountKind::Percentage, money(20));
        store.insert_discount_code(&c).await.unwrap();
        let validator = DiscountValidator::new(testing::deps(&store));

        let result = validator.validate(&RequestContext::storefront(tenant), " Welcome ", money(50)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.discount_amount, Decimal::new(1000, 2));

        let other_tenant = validator.validate(&RequestContext::storefront(TenantId::generate()), "WELCOME", money(50)).await.unwrap();
        assert_eq!(other_tenant.reason, Some("not_found"));
    }

    #[tokio::test]
    async fn test_increment_usage_is_idempotent_per_order() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let c = DiscountCode::create(tenant, DiscountCodeValue::new("ONCE").unwrap(), DiscountKind::Fixed, money(5)).with_max_uses(1);
        store.insert_discount_code(&c).await.unwrap();
        let validator = DiscountValidator::new(testing::deps(&store));
        let ctx = RequestContext::seller(tenant);
        let order = Uuid::now_v7();

        assert_eq!(validator.increment_usage(&ctx, c.id, order).await.unwrap(), RedemptionOutcome::Redeemed { times_used: 1 });
        assert_eq!(validator.increment_usage(&ctx, c.id, order).await.unwrap(), RedemptionOutcome::AlreadyRedeemed);
        assert_eq!(validator.increment_usage(&ctx, c.id, Uuid::now_v7()).await.unwrap(), RedemptionOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_increment_usage_ignores_other_tenants_codes() {
        let store = MemoryStore::new();
        let owner = TenantId::generate();
        let c = DiscountCode::create(owner, DiscountCodeValue::new("MINE").unwrap(), DiscountKind::Fixed, money(5));
        store.insert_discount_code(&c).await.unwrap();
        let validator = DiscountValidator::new(testing::deps(&store));

        let outcome = validator.increment_usage(&RequestContext::seller(TenantId::generate()), c.id, Uuid::now_v7()).await.unwrap();

        assert_eq!(outcome, RedemptionOutcome::CodeMissing);
        assert_eq!(store.find_discount_code(owner, &c.code).await.unwrap().unwrap().times_used, 0);
    }

    fn new_code(code: &str, kind: DiscountKind, value: i64) -> NewDiscountCode {
        NewDiscountCode { code: code.into(), kind, value: money(value), min_order_amount: None, max_uses: None, starts_at: None, expires_at: None }
    }

    #[tokio::test]
    async fn test_add_code_then_quote() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let validator = DiscountValidator::new(testing::deps(&store));
        let ctx = RequestContext::seller(tenant);

        let added = validator.add_code(&ctx, NewDiscountCode { max_uses: Some(3), ..new_code(" spring15 ", DiscountKind::Percentage, 15) }).await.unwrap();
        assert_eq!(added.code.as_str(), "SPRING15");
        assert_eq!(added.created_at, testing::now());

        let quote = validator.quote(&RequestContext::storefront(tenant), "spring15", money(40)).await.unwrap();
        assert_eq!(quote.amount, Decimal::new(600, 2));

        let duplicate = validator.add_code(&ctx, new_code("SPRING15", DiscountKind::Fixed, 5)).await;
        assert!(matches!(duplicate, Err(CommerceError::Conflict(_))), "{duplicate:?}");
    }

    #[tokio::test]
    async fn test_add_code_rejects_bad_input() {
        let store = MemoryStore::new();
        let tenant = TenantId::generate();
        let validator = DiscountValidator::new(testing::deps(&store));
        let ctx = RequestContext::seller(tenant);
        let now = testing::now();

        for input in [
            new_code("HALF", DiscountKind::Percentage, 101),
            new_code("NEG", DiscountKind::Fixed, -5),
            NewDiscountCode { value: Decimal::MAX, ..new_code("HUGE", DiscountKind::Fixed, 0) },
            NewDiscountCode { max_uses: Some(0), ..new_code("NONE", DiscountKind::Fixed, 5) },
            NewDiscountCode { starts_at: Some(now), expires_at: Some(now - Duration::days(1)), ..new_code("BACKWARDS", DiscountKind::Fixed, 5) },
            new_code("   ", DiscountKind::FreeShipping, 0),
        ] {
            let result = validator.add_code(&ctx, input).await;
            assert!(matches!(result, Err(CommerceError::Validation(_))), "{result:?}");
        }
        let free = validator.add_code(&ctx, new_code("SHIP", DiscountKind::FreeShipping, 7)).await.unwrap();
        assert_eq!(free.value, Decimal::ZERO);
    }
}
