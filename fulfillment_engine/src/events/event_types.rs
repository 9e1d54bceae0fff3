use serde::{Deserialize, Serialize};

use crate::db_types::{ActorId, CommissionRecord, Order, OrderStatusType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAssignedEvent {
    pub order: Order,
    pub actor_id: ActorId,
}

impl OrderAssignedEvent {
    pub fn new(order: Order, actor_id: ActorId) -> Self {
        Self { order, actor_id }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
}

impl OrderCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired for cancellations and for the terminal dispatch failure: anything that annuls the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// Dispatch ran out of escalation rounds without an acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchExhaustedEvent {
    pub order: Order,
    pub attempts: i64,
    pub final_radius_km: f64,
}

impl DispatchExhaustedEvent {
    pub fn new(order: Order) -> Self {
        let attempts = order.search_attempts;
        let final_radius_km = order.search_radius_km;
        Self { order, attempts, final_radius_km }
    }
}

/// A commission obligation passed its due date during a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionOverdueEvent {
    pub record: CommissionRecord,
}

impl CommissionOverdueEvent {
    pub fn new(record: CommissionRecord) -> Self {
        Self { record }
    }
}
