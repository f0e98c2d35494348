//! Value Objects for the commerce engine

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tenant (store account) identifier. Every entity is scoped by one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new(id: Uuid) -> Self { Self(id) }
    pub fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Discount code value, normalized to trimmed uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscountCodeValue(String);

impl DiscountCodeValue {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CodeError::Empty); }
        if value.len() > 64 { return Err(CodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DiscountCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CodeError { Empty, TooLong }
impl std::error::Error for CodeError {}
impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "discount code is empty"), Self::TooLong => write!(f, "discount code is too long") }
    }
}

/// Identity used to group a customer across orders and carts:
/// lowercased email, falling back to the phone number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerKey(String);

impl CustomerKey {
    pub fn from_contact(email: Option<&str>, phone: Option<&str>) -> Option<Self> {
        let email = email.map(str::trim).filter(|e| !e.is_empty()).map(str::to_lowercase);
        let phone = phone.map(str::trim).filter(|p| !p.is_empty()).map(str::to_string);
        email.or(phone).map(Self)
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Stock on hand. Persisted as a signed integer where `-1` means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "snake_case")]
pub enum StockLevel {
    Unlimited,
    Tracked(u32),
}

impl StockLevel {
    pub const UNLIMITED_SENTINEL: i32 = -1;

    /// Any negative stored value is read as unlimited; tracked stock is never negative.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 { Self::Unlimited } else { Self::Tracked(raw as u32) }
    }
    pub fn to_raw(self) -> i32 {
        match self { Self::Unlimited => Self::UNLIMITED_SENTINEL, Self::Tracked(q) => q.min(i32::MAX as u32) as i32 }
    }
    /// Stock after selling `qty` units, clamped at zero.
    pub fn after_sale(self, qty: u32) -> Self {
        match self { Self::Unlimited => Self::Unlimited, Self::Tracked(q) => Self::Tracked(q.saturating_sub(qty)) }
    }
}
