//! Contracts that a storage backend must satisfy to drive the fulfillment engine, plus the
//! contracts of the external collaborators (notification delivery, payouts) the engine consumes.
//!
//! Backends implement [`FulfillmentDatabase`], [`ActorManagement`] and [`CommissionManagement`].
//! The engine's API structs ([`crate::OrderFlowApi`], [`crate::DispatchApi`],
//! [`crate::CommissionApi`]) are generic over these traits, so the SQLite reference backend can be
//! swapped for anything that supports atomic conditional updates, geo-radius queries and
//! multi-statement transactions.

mod actor_management;
mod collaborators;
mod commission_management;
mod data_objects;
mod fulfillment_database;

pub use actor_management::{ActorApiError, ActorManagement};
pub use collaborators::{LogNotifier, LogPayoutProvider, Notifier, PayoutError, PayoutProvider};
pub use commission_management::{CommissionApiError, CommissionManagement};
pub use data_objects::{CancellationOutcome, CandidateFilter, ClaimOutcome, MarkPaidOutcome, NewCommissionRecord};
pub use fulfillment_database::{FulfillmentDatabase, FulfillmentError};
