use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;

use crate::db_types::FulfillmentKind;

const DEFAULT_DELIVERY_RADIUS_KM: f64 = 3.0;
const DEFAULT_SERVICE_RADIUS_KM: f64 = 5.0;
const DEFAULT_RADIUS_STEP_KM: f64 = 2.0;
const DEFAULT_MAX_RADIUS_KM: f64 = 15.0;
const DEFAULT_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 45;
const DEFAULT_BACKOFF_MS: u64 = 2_000;

const DEFAULT_PLATFORM_RATE_PERMILLE: i64 = 150;
const DEFAULT_PENDING_RATE_PERMILLE: i64 = 200;
const DEFAULT_GRACE_PERIOD_DAYS: i64 = 7;
const DEFAULT_REMINDER_CADENCE_HOURS: i64 = 24;

const DEFAULT_ADMISSION_CAPACITY: usize = 64;
const DEFAULT_ADMISSION_WAITING: usize = 128;
const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 2_000;

fn env_parsed<T: std::str::FromStr + std::fmt::Display>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|_| {
            error!("🪛️ {s} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

//--------------------------------------    DispatchConfig     -------------------------------------------------------
/// Escalation policy knobs for the dispatch coordinator.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Initial search radius for delivery orders (courier dispatch).
    pub delivery_radius_km: f64,
    /// Initial search radius for service orders (provider dispatch).
    pub service_radius_km: f64,
    /// Fixed radius increment per escalation round.
    pub radius_step_km: f64,
    /// Hard ceiling on the search radius.
    pub max_radius_km: f64,
    /// Hard ceiling on escalation rounds.
    pub max_attempts: i64,
    /// How long one notification round waits for an acceptance.
    pub round_timeout: StdDuration,
    /// Base delay between rounds; actual delay adds up to 50% jitter.
    pub escalation_backoff: StdDuration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_radius_km: DEFAULT_DELIVERY_RADIUS_KM,
            service_radius_km: DEFAULT_SERVICE_RADIUS_KM,
            radius_step_km: DEFAULT_RADIUS_STEP_KM,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            round_timeout: StdDuration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS),
            escalation_backoff: StdDuration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl DispatchConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            delivery_radius_km: env_parsed("MFB_DELIVERY_RADIUS_KM", defaults.delivery_radius_km),
            service_radius_km: env_parsed("MFB_SERVICE_RADIUS_KM", defaults.service_radius_km),
            radius_step_km: env_parsed("MFB_RADIUS_STEP_KM", defaults.radius_step_km),
            max_radius_km: env_parsed("MFB_MAX_RADIUS_KM", defaults.max_radius_km),
            max_attempts: env_parsed("MFB_MAX_SEARCH_ATTEMPTS", defaults.max_attempts),
            round_timeout: StdDuration::from_secs(env_parsed("MFB_ROUND_TIMEOUT_SECS", DEFAULT_ROUND_TIMEOUT_SECS)),
            escalation_backoff: StdDuration::from_millis(env_parsed("MFB_ESCALATION_BACKOFF_MS", DEFAULT_BACKOFF_MS)),
        }
    }

    pub fn initial_radius_km(&self, kind: FulfillmentKind) -> f64 {
        match kind {
            FulfillmentKind::Delivery => self.delivery_radius_km,
            FulfillmentKind::Service => self.service_radius_km,
        }
    }
}

//--------------------------------------   CommissionConfig    -------------------------------------------------------
/// Commission rates and obligation timing. Rates are permille so the arithmetic stays integral.
#[derive(Clone, Debug)]
pub struct CommissionConfig {
    /// Rate deducted up front when the payment landed in the platform account.
    pub rate_permille: i64,
    /// Rate owed back to the platform when the payment went to the actor's personal account.
    pub pending_rate_permille: i64,
    /// Per-category overrides, e.g. ("electrical", 180).
    pub category_rates_permille: Vec<(String, i64)>,
    /// Time a personal-account obligation stays `Pending` before it is due.
    pub grace_period: Duration,
    /// Minimum spacing between overdue reminders per record.
    pub reminder_cadence: Duration,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            rate_permille: DEFAULT_PLATFORM_RATE_PERMILLE,
            pending_rate_permille: DEFAULT_PENDING_RATE_PERMILLE,
            category_rates_permille: Vec::new(),
            grace_period: Duration::days(DEFAULT_GRACE_PERIOD_DAYS),
            reminder_cadence: Duration::hours(DEFAULT_REMINDER_CADENCE_HOURS),
        }
    }
}

impl CommissionConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            rate_permille: env_parsed("MFB_COMMISSION_RATE_PERMILLE", defaults.rate_permille),
            pending_rate_permille: env_parsed("MFB_PENDING_RATE_PERMILLE", defaults.pending_rate_permille),
            category_rates_permille: Vec::new(),
            grace_period: Duration::days(env_parsed("MFB_GRACE_PERIOD_DAYS", DEFAULT_GRACE_PERIOD_DAYS)),
            reminder_cadence: Duration::hours(env_parsed("MFB_REMINDER_CADENCE_HOURS", DEFAULT_REMINDER_CADENCE_HOURS)),
        }
    }

    /// The deducted-up-front rate for a category, falling back to the flat default.
    pub fn rate_for(&self, category: Option<&str>) -> i64 {
        self.lookup(category).unwrap_or(self.rate_permille)
    }

    /// The owed-back rate for a category, falling back to the flat default.
    pub fn pending_rate_for(&self, category: Option<&str>) -> i64 {
        self.lookup(category).unwrap_or(self.pending_rate_permille)
    }

    fn lookup(&self, category: Option<&str>) -> Option<i64> {
        let category = category?;
        self.category_rates_permille
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(category))
            .map(|(_, rate)| *rate)
    }

    pub fn with_category_rate(mut self, category: impl Into<String>, rate_permille: i64) -> Self {
        self.category_rates_permille.push((category.into(), rate_permille));
        self
    }
}

//--------------------------------------   ResilienceConfig    -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    pub admission_capacity: usize,
    pub admission_max_waiting: usize,
    pub admission_timeout: StdDuration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            admission_capacity: DEFAULT_ADMISSION_CAPACITY,
            admission_max_waiting: DEFAULT_ADMISSION_WAITING,
            admission_timeout: StdDuration::from_millis(DEFAULT_ADMISSION_TIMEOUT_MS),
        }
    }
}

impl ResilienceConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            admission_capacity: env_parsed("MFB_ADMISSION_CAPACITY", defaults.admission_capacity),
            admission_max_waiting: env_parsed("MFB_ADMISSION_MAX_WAITING", defaults.admission_max_waiting),
            admission_timeout: StdDuration::from_millis(env_parsed(
                "MFB_ADMISSION_TIMEOUT_MS",
                DEFAULT_ADMISSION_TIMEOUT_MS,
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn category_rates_override_the_flat_default() {
        let config = CommissionConfig::default().with_category_rate("electrical", 180);
        assert_eq!(config.rate_for(Some("electrical")), 180);
        assert_eq!(config.rate_for(Some("Electrical")), 180);
        assert_eq!(config.rate_for(Some("plumbing")), DEFAULT_PLATFORM_RATE_PERMILLE);
        assert_eq!(config.rate_for(None), DEFAULT_PLATFORM_RATE_PERMILLE);
    }

    #[test]
    fn initial_radius_tracks_the_order_kind() {
        let config = DispatchConfig::default();
        assert_eq!(config.initial_radius_km(FulfillmentKind::Delivery), DEFAULT_DELIVERY_RADIUS_KM);
        assert_eq!(config.initial_radius_km(FulfillmentKind::Service), DEFAULT_SERVICE_RADIUS_KM);
    }
}
