use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mfb_common::{Cents, Coordinates, DEFAULT_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The externally visible, human-referenceable order identifier. The internal `id` column is the
/// ownership key; this one is what customers and actors see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        ActorId        -------------------------------------------------------
/// Identifier of a service provider, shop or delivery partner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ActorId(pub String);

impl<S: Into<String>> From<S> for ActorId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    FulfillmentKind    -------------------------------------------------------
/// What kind of fulfillment the order needs. Selects the dispatch defaults (initial radius, actor
/// kind searched for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum FulfillmentKind {
    /// Goods prepared by a shop and carried to the customer.
    Delivery,
    /// A service performed at the customer's location.
    Service,
}

impl Display for FulfillmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FulfillmentKind::Delivery => write!(f, "Delivery"),
            FulfillmentKind::Service => write!(f, "Service"),
        }
    }
}

impl FromStr for FulfillmentKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Delivery" => Ok(Self::Delivery),
            "Service" => Ok(Self::Service),
            s => Err(ConversionError("fulfillment kind", s.to_string())),
        }
    }
}

//--------------------------------------       ActorKind       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ActorKind {
    Provider,
    Shop,
    Courier,
}

impl Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorKind::Provider => write!(f, "Provider"),
            ActorKind::Shop => write!(f, "Shop"),
            ActorKind::Courier => write!(f, "Courier"),
        }
    }
}

impl FromStr for ActorKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Provider" => Ok(Self::Provider),
            "Shop" => Ok(Self::Shop),
            "Courier" => Ok(Self::Courier),
            s => Err(ConversionError("actor kind", s.to_string())),
        }
    }
}

//--------------------------------------    OrderStatusType    -------------------------------------------------------
/// The canonical order status. Exactly one per order; every change appends a [`StatusEntry`] to the
/// order's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created but dispatch has not started.
    Placed,
    /// The dispatch coordinator is looking for an actor to fulfil the order.
    Searching,
    /// An actor has claimed the order.
    Assigned,
    /// The fulfilling shop has explicitly accepted the assigned order.
    Accepted,
    /// The shop is preparing the goods.
    Preparing,
    /// Out for delivery, or the service is underway.
    InProgress,
    /// The order has been fulfilled.
    Completed,
    /// The assigned actor backed out. The order may be re-dispatched.
    Rejected,
    /// Cancelled by the customer, actor, admin or a system timeout.
    Cancelled,
    /// Dispatch exhausted every escalation round without an acceptance.
    NoActorFound,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Placed => "Placed",
            OrderStatusType::Searching => "Searching",
            OrderStatusType::Assigned => "Assigned",
            OrderStatusType::Accepted => "Accepted",
            OrderStatusType::Preparing => "Preparing",
            OrderStatusType::InProgress => "InProgress",
            OrderStatusType::Completed => "Completed",
            OrderStatusType::Rejected => "Rejected",
            OrderStatusType::Cancelled => "Cancelled",
            OrderStatusType::NoActorFound => "NoActorFound",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Placed" => Ok(Self::Placed),
            "Searching" => Ok(Self::Searching),
            "Assigned" => Ok(Self::Assigned),
            "Accepted" => Ok(Self::Accepted),
            "Preparing" => Ok(Self::Preparing),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Rejected" => Ok(Self::Rejected),
            "Cancelled" => Ok(Self::Cancelled),
            "NoActorFound" => Ok(Self::NoActorFound),
            s => Err(ConversionError("order status", s.to_string())),
        }
    }
}

impl OrderStatusType {
    /// The strict transition whitelist. Anything not listed here is an [`InvalidTransition`] error
    /// at the API layer.
    ///
    /// | From \ To    | Allowed                                   |
    /// |--------------|-------------------------------------------|
    /// | Placed       | Searching, Cancelled                      |
    /// | Searching    | Assigned, Cancelled, NoActorFound         |
    /// | Assigned     | Accepted, InProgress, Rejected, Cancelled |
    /// | Accepted     | Preparing, InProgress, Cancelled          |
    /// | Preparing    | InProgress, Cancelled                     |
    /// | InProgress   | Completed, Cancelled                      |
    /// | Rejected     | Searching, Cancelled                      |
    /// | Completed    | (terminal)                                |
    /// | Cancelled    | (terminal)                                |
    /// | NoActorFound | (terminal)                                |
    pub fn may_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Placed, Searching | Cancelled) |
                (Searching, Assigned | Cancelled | NoActorFound) |
                (Assigned, Accepted | InProgress | Rejected | Cancelled) |
                (Accepted, Preparing | InProgress | Cancelled) |
                (Preparing, InProgress | Cancelled) |
                (InProgress, Completed | Cancelled) |
                (Rejected, Searching | Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled | OrderStatusType::NoActorFound)
    }

    /// States in which the dispatch coordinator may still offer the order to actors, and in which a
    /// claim attempt is legal.
    pub fn is_claimable(&self) -> bool {
        matches!(self, OrderStatusType::Placed | OrderStatusType::Searching)
    }

    /// States that imply a fulfiller has been assigned and is still on the hook.
    pub fn holds_assignment(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Assigned |
                OrderStatusType::Accepted |
                OrderStatusType::Preparing |
                OrderStatusType::InProgress
        )
    }
}

//--------------------------------------      StatusEntry      -------------------------------------------------------
/// One entry in an order's append-only status history. Entries are never mutated after insertion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    /// Who drove the transition: a customer id, actor id, "admin" or "system".
    pub actor: String,
    pub note: Option<String>,
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    /// Null until the assignment ledger records a successful claim. The claim path is the only
    /// code permitted to set this field.
    pub fulfiller_id: Option<ActorId>,
    /// Optional secondary actor: the shop preparing a delivery order, distinct from the courier
    /// that dispatch assigns as the fulfiller. Set at placement, never by dispatch.
    pub shop_id: Option<ActorId>,
    pub kind: FulfillmentKind,
    /// Required capability for service orders ("plumbing", …). Narrows the candidate search.
    pub category: Option<String>,
    pub status: OrderStatusType,
    pub line_total: Cents,
    pub currency: String,
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub destination_lat: f64,
    pub destination_lon: f64,
    /// Current dispatch search radius. Grows monotonically across escalation rounds.
    pub search_radius_km: f64,
    pub search_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn origin(&self) -> Coordinates {
        Coordinates::new(self.origin_lat, self.origin_lon)
    }

    pub fn destination(&self) -> Coordinates {
        Coordinates::new(self.destination_lat, self.destination_lon)
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub kind: FulfillmentKind,
    pub shop_id: Option<ActorId>,
    pub category: Option<String>,
    pub line_total: Cents,
    pub currency: String,
    /// Where fulfillment starts: the shop for deliveries, the search centre for services.
    pub origin: Coordinates,
    /// The customer's location.
    pub destination: Coordinates,
    /// Stock to reserve at placement time. May be empty for pure service orders.
    pub items: Vec<LineItem>,
}

impl NewOrder {
    pub fn new(
        order_id: OrderId,
        customer_id: String,
        kind: FulfillmentKind,
        line_total: Cents,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Self {
        Self {
            order_id,
            customer_id,
            kind,
            shop_id: None,
            category: None,
            line_total,
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            origin,
            destination,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_shop(mut self, shop_id: ActorId) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
}

//--------------------------------------   DispatchResponse    -------------------------------------------------------
/// Per-actor outcome of one notification ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DispatchResponse {
    Pending,
    Accepted,
    Rejected,
    TimedOut,
}

impl Display for DispatchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatchResponse::Pending => "Pending",
            DispatchResponse::Accepted => "Accepted",
            DispatchResponse::Rejected => "Rejected",
            DispatchResponse::TimedOut => "TimedOut",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DispatchResponse {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "Rejected" => Ok(Self::Rejected),
            "TimedOut" => Ok(Self::TimedOut),
            s => Err(ConversionError("dispatch response", s.to_string())),
        }
    }
}

//--------------------------------------     NotifiedActor     -------------------------------------------------------
/// One "this actor was offered this order" ticket. At most one ticket per order ever reaches
/// `Accepted`; the assignment ledger enforces that.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotifiedActor {
    pub id: i64,
    pub order_id: OrderId,
    pub actor_id: ActorId,
    /// Which escalation round produced the ticket.
    pub round: i64,
    pub notified_at: DateTime<Utc>,
    pub response: DispatchResponse,
    pub responded_at: Option<DateTime<Utc>>,
}

//--------------------------------------  PaymentDestination   -------------------------------------------------------
/// Where the customer's money landed. Drives the commission branch: platform-held money is split
/// before payout, actor-held money creates a commission obligation owed back to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentDestination {
    PlatformAccount,
    PersonalAccount,
}

impl Display for PaymentDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentDestination::PlatformAccount => write!(f, "PlatformAccount"),
            PaymentDestination::PersonalAccount => write!(f, "PersonalAccount"),
        }
    }
}

impl FromStr for PaymentDestination {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PlatformAccount" => Ok(Self::PlatformAccount),
            "PersonalAccount" => Ok(Self::PersonalAccount),
            s => Err(ConversionError("payment destination", s.to_string())),
        }
    }
}

//--------------------------------------     PaymentStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    /// A captured payment that must be returned (cancellation or dispatch exhaustion).
    RefundDue,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::RefundDue => "RefundDue",
            PaymentStatus::Refunded => "Refunded",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "RefundDue" => Ok(Self::RefundDue),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError("payment status", s.to_string())),
        }
    }
}

//--------------------------------------        Payment        -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    pub method: String,
    pub destination: PaymentDestination,
    pub status: PaymentStatus,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub method: String,
    pub destination: PaymentDestination,
    pub amount: Cents,
}

impl NewPayment {
    pub fn new(order_id: OrderId, method: impl Into<String>, destination: PaymentDestination, amount: Cents) -> Self {
        Self { order_id, method: method.into(), destination, amount }
    }
}

//--------------------------------------   ObligationStatus    -------------------------------------------------------
/// Lifecycle of the "commission due back to the platform" obligation. `NotApplicable` only ever
/// appears on platform-account settlements, where the commission was deducted up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ObligationStatus {
    NotApplicable,
    Pending,
    Paid,
    Overdue,
}

impl Display for ObligationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObligationStatus::NotApplicable => "NotApplicable",
            ObligationStatus::Pending => "Pending",
            ObligationStatus::Paid => "Paid",
            ObligationStatus::Overdue => "Overdue",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ObligationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotApplicable" => Ok(Self::NotApplicable),
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Overdue" => Ok(Self::Overdue),
            s => Err(ConversionError("obligation status", s.to_string())),
        }
    }
}

//--------------------------------------     PayoutStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PayoutStatus {
    Initiated,
    /// The payout provider rejected or failed the transfer. Retryable; never blocks completion.
    Failed,
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Initiated => write!(f, "Initiated"),
            PayoutStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initiated" => Ok(Self::Initiated),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError("payout status", s.to_string())),
        }
    }
}

//--------------------------------------   CommissionRecord    -------------------------------------------------------
/// One record per successful payment settlement. Never deleted; a refund writes a reversing record
/// pointing back at the original via `reversal_of`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub actor_id: ActorId,
    /// Gross payment amount the split was computed from.
    pub amount: Cents,
    pub destination: PaymentDestination,
    pub rate_permille: i64,
    pub commission: Cents,
    pub owner_earning: Cents,
    pub obligation_status: ObligationStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_date: Option<DateTime<Utc>>,
    /// Reference supplied with a manual settlement (bank slip number, transfer id, …).
    pub paid_proof: Option<String>,
    /// Last time an overdue reminder went out. Gates the sweep's reminder cadence.
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub payout_id: Option<String>,
    pub payout_status: Option<PayoutStatus>,
    pub reversal_of: Option<i64>,
    pub settled_at: DateTime<Utc>,
}

//--------------------------------------     ActorProfile      -------------------------------------------------------
/// The dispatch core's read-projection of an actor's profile aggregate, plus the two counters the
/// engine itself maintains (`current_assignments` via the assignment ledger, completion counters
/// via the order state machine). Counter updates are atomic increments, never read-modify-write.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: i64,
    pub actor_id: ActorId,
    pub kind: ActorKind,
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_available: bool,
    /// Comma-separated service categories, e.g. "plumbing,electrical".
    pub service_categories: String,
    pub current_assignments: i64,
    pub completed_orders: i64,
    pub total_earnings: Cents,
    pub updated_at: DateTime<Utc>,
}

impl ActorProfile {
    pub fn location(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.service_categories.split(',').map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories().any(|c| c.eq_ignore_ascii_case(category))
    }
}

//--------------------------------------       NewActor        -------------------------------------------------------
/// Upsert payload for the actor projection. The profile aggregate itself lives outside this core;
/// this is how its owner pushes location/availability updates in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActor {
    pub actor_id: ActorId,
    pub kind: ActorKind,
    pub display_name: String,
    pub location: Coordinates,
    pub is_available: bool,
    pub service_categories: String,
}

impl NewActor {
    pub fn new(actor_id: ActorId, kind: ActorKind, display_name: impl Into<String>, location: Coordinates) -> Self {
        Self {
            actor_id,
            kind,
            display_name: display_name.into(),
            location,
            is_available: true,
            service_categories: String::new(),
        }
    }

    pub fn with_categories(mut self, categories: impl Into<String>) -> Self {
        self.service_categories = categories.into();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.is_available = false;
        self
    }
}

//--------------------------------------    CandidateActor     -------------------------------------------------------
/// A geo-query hit: an available actor within the search radius, with the computed distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateActor {
    pub actor_id: ActorId,
    pub kind: ActorKind,
    pub location: Coordinates,
    pub distance_km: f64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whitelist_rejects_everything_not_listed() {
        use OrderStatusType::*;
        let all = [
            Placed,
            Searching,
            Assigned,
            Accepted,
            Preparing,
            InProgress,
            Completed,
            Rejected,
            Cancelled,
            NoActorFound,
        ];
        let allowed = [
            (Placed, Searching),
            (Placed, Cancelled),
            (Searching, Assigned),
            (Searching, Cancelled),
            (Searching, NoActorFound),
            (Assigned, Accepted),
            (Assigned, InProgress),
            (Assigned, Rejected),
            (Assigned, Cancelled),
            (Accepted, Preparing),
            (Accepted, InProgress),
            (Accepted, Cancelled),
            (Preparing, InProgress),
            (Preparing, Cancelled),
            (InProgress, Completed),
            (InProgress, Cancelled),
            (Rejected, Searching),
            (Rejected, Cancelled),
        ];
        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.may_transition_to(to), expected, "transition {from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_states_allow_nothing() {
        use OrderStatusType::*;
        for terminal in [Completed, Cancelled, NoActorFound] {
            assert!(terminal.is_terminal());
            for to in [Placed, Searching, Assigned, Completed, Cancelled] {
                assert!(!terminal.may_transition_to(to));
            }
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        use OrderStatusType::*;
        for status in [Placed, Searching, Assigned, Accepted, Preparing, InProgress, Completed, Rejected, Cancelled,
            NoActorFound]
        {
            assert_eq!(status.to_string().parse::<OrderStatusType>().unwrap(), status);
        }
    }

    #[test]
    fn actor_categories_parse() {
        let actor = NewActor::new("a-1".into(), ActorKind::Provider, "Pat", Coordinates::new(0.0, 0.0))
            .with_categories("plumbing, electrical");
        let profile = ActorProfile {
            id: 1,
            actor_id: actor.actor_id,
            kind: actor.kind,
            display_name: actor.display_name,
            latitude: 0.0,
            longitude: 0.0,
            is_available: true,
            service_categories: actor.service_categories,
            current_assignments: 0,
            completed_orders: 0,
            total_earnings: Cents::from(0),
            updated_at: Utc::now(),
        };
        assert!(profile.has_category("plumbing"));
        assert!(profile.has_category("Electrical"));
        assert!(!profile.has_category("carpentry"));
    }
}
