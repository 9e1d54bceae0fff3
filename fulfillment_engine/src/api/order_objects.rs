use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{ActorId, FulfillmentKind, OrderId, OrderStatusType};

/// Search criteria for order queries. Empty filter returns everything, ordered by `created_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub fulfiller_id: Option<ActorId>,
    pub kind: Option<FulfillmentKind>,
    pub status: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.customer_id.is_none() &&
            self.fulfiller_id.is_none() &&
            self.kind.is_none() &&
            self.status.as_ref().map(Vec::is_empty).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_fulfiller(mut self, actor_id: ActorId) -> Self {
        self.fulfiller_id = Some(actor_id);
        self
    }

    pub fn with_kind(mut self, kind: FulfillmentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }
}
