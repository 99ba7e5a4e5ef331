//! SweepExpiredHandler - expires subscriptions whose period or trial ended.
//!
//! Each row is expired in its own transaction. A failing row is logged and
//! counted; it never stops the rest of the run. The scan pages by
//! `(current_period_end, id)` until no lapsed rows remain after the cursor,
//! so rows that keep failing or get skipped cannot starve the rest.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    BillingNotification, ExpireOutcome, LapsedCursor, SubscriptionRepository, UserNotifier,
};

/// Rows fetched per page of the lapsed scan.
pub const DEFAULT_BATCH_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: u32,
    pub expired: u32,
    /// Renewed, cancelled or expired by someone else since the scan.
    pub skipped: u32,
    pub failed: u32,
}

pub struct SweepExpiredHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    notifier: Arc<dyn UserNotifier>,
    batch_size: u32,
}

impl SweepExpiredHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            subscriptions,
            notifier,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn handle(&self) -> Result<SweepReport, BillingError> {
        self.sweep_at(Timestamp::now()).await
    }

    /// Only the candidate query failing is an error.
    pub async fn sweep_at(&self, now: Timestamp) -> Result<SweepReport, BillingError> {
        let mut report = SweepReport::default();
        let mut cursor: Option<LapsedCursor> = None;

        loop {
            let page = self
                .subscriptions
                .find_lapsed(now, cursor, self.batch_size)
                .await?;
            let full = page.len() as u32 >= self.batch_size;
            cursor = page.last().map(LapsedCursor::after);
            report.examined += page.len() as u32;

            for candidate in page {
                self.expire_one(&candidate.id, now, &mut report).await;
            }
            if !full {
                break;
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Expiration sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_one(&self, id: &SubscriptionId, now: Timestamp, report: &mut SweepReport) {
        match self.subscriptions.expire_lapsed(id, now).await {
            Ok(ExpireOutcome::Expired { user_id }) => {
                report.expired += 1;
                tracing::info!(subscription_id = %id, user_id = %user_id, "Subscription expired");
                if let Err(e) = self
                    .notifier
                    .notify(&user_id, BillingNotification::SubscriptionExpired)
                    .await
                {
                    tracing::warn!(user_id = %user_id, error = %e, "Billing notification failed");
                }
            }
            Ok(ExpireOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(subscription_id = %id, error = %e, "Failed to expire subscription");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::notify::TracingNotifier;
    use crate::domain::billing::{
        test_tier, BillingType, PaymentDetails, SubscriptionStatus, UserSubscription,
    };
    use rust_decimal::Decimal;

    fn handler(store: &InMemoryBillingStore) -> SweepExpiredHandler {
        SweepExpiredHandler::new(Arc::new(store.clone()), Arc::new(TracingNotifier::new()))
    }

    async fn subscription_started(store: &InMemoryBillingStore, start: Timestamp) -> UserSubscription {
        let user = store.add_user("ada@example.com").await;
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        let payment = PaymentDetails {
            reference: format!("sub_{}", user),
            amount: Decimal::new(5000, 2),
            customer_code: None,
            paid_at: start,
        };
        let sub = UserSubscription::from_payment(user, &tier, &payment, start);
        store.insert_subscription(sub.clone()).await;
        sub
    }

    #[tokio::test]
    async fn expires_lapsed_and_keeps_current() {
        let store = InMemoryBillingStore::new();
        let now = Timestamp::now();
        let lapsed = subscription_started(&store, now.add_days(-31)).await;
        let current = subscription_started(&store, now.add_days(-5)).await;

        let report = handler(&store).sweep_at(now).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                examined: 1,
                expired: 1,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(
            store.subscription(&lapsed.id).await.unwrap().status,
            SubscriptionStatus::Expired
        );
        assert!(!store.is_premium(&lapsed.user_id).await);
        assert!(store.is_premium(&current.user_id).await);
    }

    #[tokio::test]
    async fn second_run_expires_nothing() {
        let store = InMemoryBillingStore::new();
        let now = Timestamp::now();
        subscription_started(&store, now.add_days(-40)).await;

        let first = handler(&store).sweep_at(now).await.unwrap();
        let second = handler(&store).sweep_at(now).await.unwrap();

        assert_eq!(first.expired, 1);
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn one_failing_row_does_not_stop_the_batch() {
        let store = InMemoryBillingStore::new();
        let now = Timestamp::now();
        let broken = subscription_started(&store, now.add_days(-40)).await;
        let healthy = subscription_started(&store, now.add_days(-35)).await;
        store.fail_expiry_for(broken.id).await;

        let report = handler(&store).sweep_at(now).await.unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.expired, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            store.subscription(&healthy.id).await.unwrap().status,
            SubscriptionStatus::Expired
        );
        assert_eq!(
            store.subscription(&broken.id).await.unwrap().status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn ended_trials_are_expired() {
        let store = InMemoryBillingStore::new();
        let user = store.add_user("ada@example.com").await;
        let mut tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        tier.trial_days = 7;
        let now = Timestamp::now();
        let trial = UserSubscription::start_trial(user, &tier, now.add_days(-8)).unwrap();
        store.insert_subscription(trial.clone()).await;

        let report = handler(&store).sweep_at(now).await.unwrap();

        assert_eq!(report.expired, 1);
        assert!(!store.is_premium(&user).await);
    }

    #[tokio::test]
    async fn pages_through_more_rows_than_one_batch() {
        let store = InMemoryBillingStore::new();
        let now = Timestamp::now();
        let mut ids = Vec::new();
        for days in 31..38 {
            ids.push(subscription_started(&store, now.add_days(-days)).await.id);
        }
        store.fail_expiry_for(ids[6]).await;
        store.fail_expiry_for(ids[5]).await;

        let report = handler(&store).with_batch_size(2).sweep_at(now).await.unwrap();

        assert_eq!(report.examined, 7);
        assert_eq!(report.expired, 5);
        assert_eq!(report.failed, 2);
        for id in &ids[..5] {
            assert_eq!(
                store.subscription(id).await.unwrap().status,
                SubscriptionStatus::Expired
            );
        }
    }

    #[test]
    fn batch_size_is_at_least_one() {
        let store = InMemoryBillingStore::new();
        let h = handler(&store).with_batch_size(0);
        assert_eq!(h.batch_size, 1);
    }
}
