//! Discount Code Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{DiscountCodeValue, TenantId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub code: DiscountCodeValue,
    pub kind: DiscountKind,
    /// Percentage points for `Percentage`, currency amount for `Fixed`, unused for `FreeShipping`.
    pub value: Decimal,
    pub min_order_amount: Option<Decimal>,
    pub max_uses: Option<u32>,
    pub times_used: u32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind { Percentage, Fixed, FreeShipping }

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Fixed => "fixed", Self::FreeShipping => "free_shipping" }
    }
}

impl FromStr for DiscountKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage), "fixed" => Ok(Self::Fixed), "free_shipping" => Ok(Self::FreeShipping),
            other => Err(format!("unknown discount type: {other}")),
        }
    }
}

impl DiscountCode {
    pub fn create(tenant_id: TenantId, code: DiscountCodeValue, kind: DiscountKind, value: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), tenant_id, code, kind, value, min_order_amount: None, max_uses: None,
            times_used: 0, starts_at: None, expires_at: None, active: true, created_at: Utc::now(),
        }
    }

    pub fn with_min_order(mut self, amount: Decimal) -> Self { self.min_order_amount = Some(amount); self }
    pub fn with_max_uses(mut self, max: u32) -> Self { self.max_uses = Some(max); self }
    pub fn with_window(mut self, starts_at: Option<DateTime<Utc>>, expires_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.expires_at = expires_at;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expires_at.is_some_and(|at| at < now) }
    pub fn has_started(&self, now: DateTime<Utc>) -> bool { self.starts_at.map_or(true, |at| at <= now) }
    pub fn has_remaining_uses(&self) -> bool { self.max_uses.map_or(true, |max| self.times_used < max) }
}

/// Why a code could not be redeemed. The `code()` string is stable and
/// meant for clients to pick a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscountRejection {
    NotFound,
    Expired,
    NotStarted,
    UsageLimitReached,
    BelowMinimum { minimum: Decimal },
}

impl DiscountRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found", Self::Expired => "expired", Self::NotStarted => "not_started",
            Self::UsageLimitReached => "usage_limit_reached", Self::BelowMinimum { .. } => "below_minimum",
        }
    }
}

impl fmt::Display for DiscountRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "discount code not found"),
            Self::Expired => write!(f, "discount code has expired"),
            Self::NotStarted => write!(f, "discount code is not active yet"),
            Self::UsageLimitReached => write!(f, "discount code usage limit reached"),
            Self::BelowMinimum { minimum } => write!(f, "order subtotal is below the minimum of {minimum}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    #[test]
    fn test_usage_window() {
        let now = Utc::now();
        let code = DiscountCode::create(TenantId::generate(), DiscountCodeValue::new("x").unwrap(), DiscountKind::Fixed, Decimal::ONE)
            .with_window(Some(now + Duration::days(1)), Some(now - Duration::days(1)))
            .with_max_uses(2);
        assert!(code.is_expired(now));
        assert!(!code.has_started(now));
        assert!(code.has_remaining_uses());
    }
    #[test]
    fn test_rejection_codes() {
        assert_eq!(DiscountRejection::UsageLimitReached.code(), "usage_limit_reached");
        let json = serde_json::to_value(DiscountRejection::Expired).unwrap();
        assert_eq!(json["reason"], "expired");
    }
}
