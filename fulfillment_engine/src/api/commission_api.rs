use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::errors::CommissionError,
    config::CommissionConfig,
    db_types::{CommissionRecord, ObligationStatus, OrderId, PaymentDestination, PaymentStatus},
    events::{CommissionOverdueEvent, EventProducers},
    resilience::RateLimiter,
    traits::{
        CommissionManagement,
        FulfillmentDatabase,
        MarkPaidOutcome,
        NewCommissionRecord,
        Notifier,
        PayoutProvider,
    },
};

/// `CommissionApi` owns everything money-splitting: settlement at payment-success time, the
/// pending/overdue obligation lifecycle, manual settlement, and refund reversals.
pub struct CommissionApi<B, N, P> {
    db: B,
    notifier: N,
    payouts: P,
    config: CommissionConfig,
    producers: EventProducers,
    reminder_limiter: RateLimiter,
}

impl<B, N, P> Debug for CommissionApi<B, N, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommissionApi")
    }
}

impl<B: Clone, N: Clone, P: Clone> Clone for CommissionApi<B, N, P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            notifier: self.notifier.clone(),
            payouts: self.payouts.clone(),
            config: self.config.clone(),
            producers: self.producers.clone(),
            reminder_limiter: self.reminder_limiter.clone(),
        }
    }
}

impl<B, N, P> CommissionApi<B, N, P>
where
    B: FulfillmentDatabase,
    N: Notifier,
    P: PayoutProvider,
{
    pub fn new(db: B, notifier: N, payouts: P, config: CommissionConfig, producers: EventProducers) -> Self {
        // One reminder per record per cadence window is already enforced in the store; the limiter
        // additionally caps process-level sends per actor so a pathological sweep cannot spam.
        let window = config.reminder_cadence.to_std().unwrap_or(std::time::Duration::from_secs(86_400));
        let reminder_limiter = RateLimiter::new(3, window);
        Self { db, notifier, payouts, config, producers, reminder_limiter }
    }

    /// Settles the order's payment into a commission record. Called at payment-success time; if
    /// the payment is still `Pending` it is captured (flipped to `Paid`) first.
    ///
    /// The split branches on where the money landed:
    /// * `PlatformAccount` — the platform already holds the money. Commission is deducted up
    ///   front, the remainder is paid out to the actor, and no obligation exists.
    /// * `PersonalAccount` — the actor already holds the money. The full amount is theirs; the
    ///   commission becomes an obligation owed back to the platform, due after the configured
    ///   grace period.
    ///
    /// Settlement is idempotent per order: an existing non-reversal record is returned as-is.
    pub async fn settle_payment(&self, order_id: &OrderId) -> Result<CommissionRecord, CommissionError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| crate::traits::FulfillmentError::OrderNotFound(order_id.clone()))?;
        let actor_id = order.fulfiller_id.clone().ok_or_else(|| CommissionError::NoFulfiller(order_id.clone()))?;

        if let Some(existing) =
            self.db.commission_records_for_order(order_id).await?.into_iter().find(|r| r.reversal_of.is_none())
        {
            debug!("🧾️ Order {order_id} is already settled (record #{}). Returning it.", existing.id);
            return Ok(existing);
        }

        let mut payment =
            self.db.fetch_payment(order_id).await?.ok_or_else(|| CommissionError::NoPayment(order_id.clone()))?;
        match payment.status {
            PaymentStatus::Pending => {
                payment = self.db.update_payment_status(order_id, PaymentStatus::Paid).await?;
            },
            PaymentStatus::Paid => {},
            other => return Err(CommissionError::PaymentNotSettleable(order_id.clone(), other)),
        }

        let settled_at = Utc::now();
        let amount = payment.amount;
        let category = order.category.as_deref();
        let record = match payment.destination {
            PaymentDestination::PlatformAccount => {
                let rate = self.config.rate_for(category);
                let commission = amount.apply_permille(rate);
                NewCommissionRecord {
                    order_id: order_id.clone(),
                    actor_id: actor_id.clone(),
                    amount,
                    destination: PaymentDestination::PlatformAccount,
                    rate_permille: rate,
                    commission,
                    owner_earning: amount - commission,
                    obligation_status: ObligationStatus::NotApplicable,
                    due_date: None,
                    reversal_of: None,
                    settled_at,
                }
            },
            PaymentDestination::PersonalAccount => {
                let rate = self.config.pending_rate_for(category);
                let commission = amount.apply_permille(rate);
                NewCommissionRecord {
                    order_id: order_id.clone(),
                    actor_id: actor_id.clone(),
                    amount,
                    destination: PaymentDestination::PersonalAccount,
                    rate_permille: rate,
                    commission,
                    // The actor already has the full amount in hand.
                    owner_earning: amount,
                    obligation_status: ObligationStatus::Pending,
                    due_date: Some(settled_at + self.config.grace_period),
                    reversal_of: None,
                    settled_at,
                }
            },
        };
        let record = self.db.insert_commission_record(record).await?;
        debug!(
            "🧾️ Order {order_id} settled: {} gross, {} commission ({}‰, {}), record #{}",
            record.amount, record.commission, record.rate_permille, record.destination, record.id
        );

        if record.destination == PaymentDestination::PlatformAccount && !record.owner_earning.is_zero() {
            match self.payouts.initiate_payout(&actor_id, record.owner_earning).await {
                Ok(payout_id) => {
                    debug!("🧾️ Payout {payout_id} initiated for record #{}", record.id);
                    self.db.record_payout_result(record.id, Some(payout_id), false).await?;
                },
                Err(e) => {
                    // Retryable: the record keeps payout_status = Failed and completion proceeds.
                    warn!("🧾️ Payout for record #{} failed: {e}", record.id);
                    self.db.record_payout_result(record.id, None, true).await?;
                },
            }
        }
        let refreshed = self
            .db
            .fetch_commission_record(record.id)
            .await?
            .ok_or(crate::traits::CommissionApiError::RecordNotFound(record.id))?;
        Ok(refreshed)
    }

    /// Writes the reversing record for a refunded payment. History is never mutated: the original
    /// record stays, the reversal references it and negates the amounts.
    pub async fn settle_refund(&self, order_id: &OrderId) -> Result<CommissionRecord, CommissionError> {
        let payment =
            self.db.fetch_payment(order_id).await?.ok_or_else(|| CommissionError::NoPayment(order_id.clone()))?;
        if !matches!(payment.status, PaymentStatus::RefundDue | PaymentStatus::Refunded) {
            return Err(CommissionError::PaymentNotSettleable(order_id.clone(), payment.status));
        }
        let records = self.db.commission_records_for_order(order_id).await?;
        let original = records
            .iter()
            .find(|r| r.reversal_of.is_none())
            .cloned()
            .ok_or_else(|| CommissionError::NoPayment(order_id.clone()))?;
        if let Some(reversal) = records.iter().find(|r| r.reversal_of == Some(original.id)) {
            debug!("🧾️ Order {order_id} already has reversal record #{}", reversal.id);
            return Ok(reversal.clone());
        }
        let reversal = NewCommissionRecord {
            order_id: order_id.clone(),
            actor_id: original.actor_id.clone(),
            amount: -original.amount,
            destination: original.destination,
            rate_permille: original.rate_permille,
            commission: -original.commission,
            owner_earning: -original.owner_earning,
            obligation_status: ObligationStatus::NotApplicable,
            due_date: None,
            reversal_of: Some(original.id),
            settled_at: Utc::now(),
        };
        let reversal = self.db.insert_commission_record(reversal).await?;
        info!("🧾️ Refund reversal #{} written for order {order_id} (reverses #{})", reversal.id, original.id);
        Ok(reversal)
    }

    /// Manual settlement of an obligation against payment proof. Requires the obligation to be
    /// `Pending` or `Overdue`; marking an already-paid record again is a no-op.
    pub async fn mark_paid(&self, record_id: i64, proof: &str) -> Result<MarkPaidOutcome, CommissionError> {
        let outcome = self.db.mark_obligation_paid(record_id, proof, Utc::now()).await?;
        match &outcome {
            MarkPaidOutcome::Marked(record) => {
                info!("🧾️ Obligation on record #{record_id} settled manually ({proof}); actor {}", record.actor_id)
            },
            MarkPaidOutcome::AlreadyPaid(_) => {
                debug!("🧾️ Obligation on record #{record_id} was already settled. No action to take.")
            },
        }
        Ok(outcome)
    }

    /// One sweep pass: flip due obligations to `Overdue`, emit events, send cadence-limited
    /// reminders. Safe to run repeatedly; a second pass over the same data changes nothing and
    /// sends nothing new inside the cadence window.
    pub async fn run_overdue_sweep(&self) -> Result<Vec<CommissionRecord>, CommissionError> {
        let now = Utc::now();
        let flipped = self.db.sweep_overdue(now).await?;
        if !flipped.is_empty() {
            info!("🧾️ Overdue sweep flipped {} obligation(s)", flipped.len());
        }
        for record in &flipped {
            for producer in &self.producers.commission_overdue {
                producer.publish_event(CommissionOverdueEvent::new(record.clone())).await;
            }
        }

        let due_for_reminder = self.db.overdue_needing_reminder(now, self.config.reminder_cadence).await?;
        for record in due_for_reminder {
            if !self.reminder_limiter.check(record.actor_id.as_str()).await {
                debug!("🧾️ Reminder for record #{} suppressed by the rate limiter", record.id);
                continue;
            }
            let delivered = self
                .notifier
                .notify(
                    record.actor_id.as_str(),
                    "Commission overdue",
                    &format!("Commission of {} for order {} is overdue.", record.commission, record.order_id),
                    serde_json::json!({ "record_id": record.id, "order_id": record.order_id }),
                )
                .await;
            if !delivered {
                warn!("🧾️ Overdue reminder for record #{} could not be delivered", record.id);
            }
            // Stamp regardless: cadence bounds attempts, not deliveries.
            self.db.record_reminder_sent(record.id, now).await?;
        }
        self.reminder_limiter.cleanup().await;
        Ok(flipped)
    }

    pub async fn records_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionRecord>, CommissionError> {
        Ok(self.db.commission_records_for_order(order_id).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
