//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{CustomerKey, TenantId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub customer: Customer,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_code: Option<String>,
    pub discount_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
    pub channel: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub tags: Vec<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// Line snapshot taken at the time of sale, decoupled from the live product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { self.unit_price.saturating_mul(Decimal::from(self.quantity)) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    pub fn key(&self) -> Option<CustomerKey> { CustomerKey::from_contact(self.email.as_deref(), Some(&self.phone)) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Statuses whose totals count as realised revenue.
    pub fn counts_as_revenue(&self) -> bool { matches!(self, Self::Confirmed | Self::Shipped | Self::Delivered) }

    pub fn check_transition(self, to: OrderStatus) -> Result<(), TransitionError> {
        if self == to { return Err(TransitionError::NoOp(self)); }
        if self.is_terminal() { return Err(TransitionError::Terminal(self)); }
        let allowed = matches!(
            (self, to),
            (Self::Pending, Self::Confirmed) | (Self::Confirmed, Self::Shipped) | (Self::Shipped, Self::Delivered)
                | (Self::Pending | Self::Confirmed | Self::Shipped, Self::Cancelled)
        );
        if allowed { Ok(()) } else { Err(TransitionError::Illegal { from: self, to }) }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "confirmed" => Ok(Self::Confirmed), "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered), "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    NoOp(OrderStatus),
    Terminal(OrderStatus),
    Illegal { from: OrderStatus, to: OrderStatus },
}

impl Order {
    pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
    pub fn is_cancelled(&self) -> bool { self.status == OrderStatus::Cancelled }
    pub fn customer_key(&self) -> Option<CustomerKey> { self.customer.key() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_status_workflow() {
        assert!(OrderStatus::Pending.check_transition(OrderStatus::Confirmed).is_ok());
        assert!(OrderStatus::Confirmed.check_transition(OrderStatus::Shipped).is_ok());
        assert!(OrderStatus::Shipped.check_transition(OrderStatus::Delivered).is_ok());
        assert!(OrderStatus::Shipped.check_transition(OrderStatus::Cancelled).is_ok());
    }
    #[test]
    fn test_terminal_and_noop() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert_eq!(terminal.check_transition(OrderStatus::Pending), Err(TransitionError::Terminal(terminal)));
        }
        assert_eq!(OrderStatus::Pending.check_transition(OrderStatus::Pending), Err(TransitionError::NoOp(OrderStatus::Pending)));
        assert!(matches!(OrderStatus::Pending.check_transition(OrderStatus::Delivered), Err(TransitionError::Illegal { .. })));
    }
    #[test]
    fn test_status_round_trips_through_str() {
        for s in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
