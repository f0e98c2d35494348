//! Request-scoped context and time source.
//!
//! Every engine operation receives the tenant and actor explicitly; nothing
//! is read from process-wide state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Customer checking out on the public storefront.
    Storefront,
    /// Seller entering or managing orders from the dashboard.
    Seller,
    /// Background jobs such as the reaper.
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub actor: Actor,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, actor: Actor) -> Self { Self { tenant_id, actor } }
    pub fn storefront(tenant_id: TenantId) -> Self { Self::new(tenant_id, Actor::Storefront) }
    pub fn seller(tenant_id: TenantId) -> Self { Self::new(tenant_id, Actor::Seller) }
    pub fn system(tenant_id: TenantId) -> Self { Self::new(tenant_id, Actor::System) }
}

/// Time source, abstracted so windows and expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> { self.0 }
}
