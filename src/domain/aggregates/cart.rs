//! Abandoned Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{CustomerKey, TenantId};

/// Pre-checkout cart snapshot. At most one unrecovered record exists per
/// (tenant, customer key); later snapshots replace the earlier one in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbandonedCart {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub customer_key: CustomerKey,
    pub contact: CartContact,
    pub items: Vec<CartLine>,
    pub total: Decimal,
    pub recovered: bool,
    pub recovered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CartContact {
    pub fn key(&self) -> Option<CustomerKey> { CustomerKey::from_contact(self.email.as_deref(), self.phone.as_deref()) }

    fn merge(&mut self, newer: &CartContact) {
        if newer.name.is_some() { self.name = newer.name.clone(); }
        if newer.email.is_some() { self.email = newer.email.clone(); }
        if newer.phone.is_some() { self.phone = newer.phone.clone(); }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Option<Decimal> { self.unit_price.checked_mul(Decimal::from(self.quantity)) }
}

impl AbandonedCart {
    pub fn open(
        tenant_id: TenantId,
        customer_key: CustomerKey,
        contact: CartContact,
        items: Vec<CartLine>,
        total: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(), tenant_id, customer_key, contact,
            items, total, recovered: false, recovered_at: None, created_at: now, updated_at: now,
        }
    }

    /// Merge a newer snapshot into this open record.
    pub fn refresh(&mut self, newer: &AbandonedCart) {
        self.items = newer.items.clone();
        self.total = newer.total;
        self.contact.merge(&newer.contact);
        self.updated_at = newer.updated_at;
    }

    pub fn recover(&mut self, at: DateTime<Utc>) {
        if self.recovered { return; }
        self.recovered = true;
        self.recovered_at = Some(at);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn line(qty: u32) -> CartLine {
        CartLine { product_id: Uuid::nil(), name: "Widget".into(), quantity: qty, unit_price: Decimal::new(10, 0) }
    }
    #[test]
    fn test_refresh_replaces_snapshot() {
        let tenant = TenantId::generate();
        let key = CustomerKey::from_contact(Some("a@b.co"), None).unwrap();
        let now = Utc::now();
        let mut cart = AbandonedCart::open(tenant, key.clone(), CartContact { name: Some("Ada".into()), email: Some("a@b.co".into()), phone: None }, vec![line(1)], Decimal::new(10, 0), now);
        let newer = AbandonedCart::open(tenant, key, CartContact { name: None, email: Some("a@b.co".into()), phone: Some("0800".into()) }, vec![line(3)], Decimal::new(30, 0), now);
        cart.refresh(&newer);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.total, Decimal::new(30, 0));
        assert_eq!(cart.contact.name.as_deref(), Some("Ada"));
        assert_eq!(cart.contact.phone.as_deref(), Some("0800"));
    }
    #[test]
    fn test_recover_once() {
        let key = CustomerKey::from_contact(None, Some("0800")).unwrap();
        let t0 = Utc::now();
        let mut cart = AbandonedCart::open(TenantId::generate(), key, CartContact { phone: Some("0800".into()), ..Default::default() }, vec![], Decimal::ZERO, t0);
        cart.recover(t0);
        cart.recover(t0 + chrono::Duration::hours(1));
        assert_eq!(cart.recovered_at, Some(t0));
    }
}
