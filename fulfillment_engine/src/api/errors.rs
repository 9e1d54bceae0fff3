use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    resilience::AdmissionError,
    traits::{ActorApiError, CommissionApiError, FulfillmentError},
};

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("No actor could be found for order {0}; escalation is exhausted")]
    NoActorFound(OrderId),
    #[error("Dispatch for order {0} halted: the order is now {1}")]
    Halted(OrderId, OrderStatusType),
    #[error("Dispatch is overloaded; try again later")]
    Overloaded,
    #[error("{0}")]
    Fulfillment(#[from] FulfillmentError),
}

impl From<AdmissionError> for DispatchError {
    fn from(_: AdmissionError) -> Self {
        DispatchError::Overloaded
    }
}

impl From<ActorApiError> for DispatchError {
    fn from(e: ActorApiError) -> Self {
        DispatchError::Fulfillment(e.into())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CommissionError {
    #[error("Order {0} has no recorded payment to settle")]
    NoPayment(OrderId),
    #[error("Order {0} has no assigned fulfiller; there is nobody to settle with")]
    NoFulfiller(OrderId),
    #[error("Payment for order {0} is {1}; settlement requires a captured payment")]
    PaymentNotSettleable(OrderId, crate::db_types::PaymentStatus),
    #[error("{0}")]
    Api(#[from] CommissionApiError),
    #[error("{0}")]
    Fulfillment(#[from] FulfillmentError),
}
