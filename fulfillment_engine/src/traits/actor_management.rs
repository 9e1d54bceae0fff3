use mfb_common::Coordinates;
use thiserror::Error;

use crate::{
    db_types::{ActorId, ActorProfile, CandidateActor, NewActor},
    traits::CandidateFilter,
};

/// Read/write access to the actor availability projection and the stock ledger.
///
/// The actor's profile aggregate is owned elsewhere; its owner pushes updates in through
/// [`upsert_actor`](Self::upsert_actor). The engine itself only mutates the assignment and
/// completion counters, and always through atomic increments.
#[allow(async_fn_in_trait)]
pub trait ActorManagement: Clone {
    /// Insert or replace the projection row for this actor.
    async fn upsert_actor(&self, actor: NewActor) -> Result<ActorProfile, ActorApiError>;

    async fn fetch_actor(&self, actor_id: &ActorId) -> Result<Option<ActorProfile>, ActorApiError>;

    /// The GeoIndex contract: every available actor within `radius_km` of `origin` matching
    /// `filter`, sorted nearest first. A pure query; an empty result is a valid outcome.
    async fn find_candidates(
        &self,
        origin: Coordinates,
        radius_km: f64,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateActor>, ActorApiError>;

    async fn set_availability(&self, actor_id: &ActorId, available: bool) -> Result<(), ActorApiError>;

    /// Seeds or replaces the stock level for a product. Reservation and restoration happen inside
    /// order transactions, not through this call.
    async fn set_stock(&self, shop_id: &ActorId, product_id: &str, quantity: i64) -> Result<(), ActorApiError>;

    async fn fetch_stock(&self, product_id: &str) -> Result<Option<i64>, ActorApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum ActorApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested actor {0} does not exist")]
    ActorNotFound(ActorId),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(String),
}

impl From<sqlx::Error> for ActorApiError {
    fn from(e: sqlx::Error) -> Self {
        ActorApiError::DatabaseError(e.to_string())
    }
}
