//! Domain events
//!
//! Emitted after a unit of work commits. Delivery is best effort: a failed
//! publish is logged and never rolls back the committed change.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{CustomerKey, TenantId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated { tenant_id: TenantId, order_id: Uuid, status: OrderStatus, total: Decimal },
    OrderStatusChanged { tenant_id: TenantId, order_id: Uuid, from: OrderStatus, to: OrderStatus, source: ChangeSource },
    DiscountRedeemed { tenant_id: TenantId, code_id: Uuid, order_id: Uuid },
    CartRecovered { tenant_id: TenantId, customer_key: CustomerKey, order_id: Uuid },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource { Manual, Reaper }

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "commerce.order.created",
            Self::OrderStatusChanged { .. } => "commerce.order.status_changed",
            Self::DiscountRedeemed { .. } => "commerce.discount.redeemed",
            Self::CartRecovered { .. } => "commerce.cart.recovered",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Drops every event; used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, _event: DomainEvent) {}
}

pub struct NatsSink { client: async_nats::Client }

impl NatsSink {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventSink for NatsSink {
    async fn publish(&self, event: DomainEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { tracing::error!(error = %e, "failed to encode domain event"); return; }
        };
        if let Err(e) = self.client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish domain event");
        }
    }
}

/// Keeps published events in memory so tests can assert on them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink { pub events: tokio::sync::Mutex<Vec<DomainEvent>> }

#[cfg(test)]
#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: DomainEvent) { self.events.lock().await.push(event); }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DomainEvent::OrderCreated { tenant_id: TenantId::generate(), order_id: Uuid::nil(), status: OrderStatus::Pending, total: Decimal::new(2500, 2) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order_created");
        assert_eq!(json["status"], "pending");
        assert_eq!(event.subject(), "commerce.order.created");
    }
}
