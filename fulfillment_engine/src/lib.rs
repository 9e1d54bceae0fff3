//! Marketplace Fulfillment Engine
//!
//! The fulfillment engine matches customers to service providers, shops and delivery partners,
//! tracks each order's lifecycle, and settles the money owed between the platform and independent
//! earners. This library contains the core logic; it is transport-agnostic, and an HTTP (or any
//! other) layer wraps the plain request/result operations exposed here.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`], behind the [`traits`] contracts). SQLite is
//!    the reference backend. You should never need to touch the database directly — use the
//!    public APIs. The exception is the data types stored in the database, which live in
//!    [`db_types`] and are public.
//! 2. The engine's public API: [`DispatchApi`] (candidate search, notification fan-out, bounded
//!    waits and escalation, plus the race-free assignment claim), [`OrderFlowApi`] (the order
//!    state machine and its compensating side effects) and [`CommissionApi`] (settlement splits
//!    and the commission-due ledger).
//! 3. The ambient machinery: lifecycle [`events`] you can hook into, [`resilience`] primitives
//!    that gate the engine under load, and the background [`workers`] for sweeps.

mod api;

pub mod config;
pub mod db_types;
pub mod events;
pub mod resilience;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub mod workers;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    commission_api::CommissionApi,
    dispatch_api::DispatchApi,
    errors::{CommissionError, DispatchError},
    order_flow_api::OrderFlowApi,
    order_objects,
};
