//! SubscriptionLifecycleHandler - user-driven subscription commands.
//!
//! Gateway calls (cancel) run before any local write so no transaction is
//! held across network I/O. Disabling a gateway subscription ends access at
//! once, so only rows the gateway does not bill may cancel at period end.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PlanChange, SubscriptionTier, UserSubscription};
use crate::domain::foundation::{TierId, Timestamp, UserId};
use crate::ports::{
    BillingNotification, CreateOutcome, PaymentGateway, SubscriptionRepository, TierRepository,
    UserDirectory, UserNotifier,
};

#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub user_id: UserId,
    pub tier_id: TierId,
}

#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub user_id: UserId,
    pub tier_id: TierId,
    pub direction: PlanChange,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    /// Keep access until the current period ends.
    pub at_period_end: bool,
}

/// The user's live subscription and its tier.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSubscription {
    pub subscription: UserSubscription,
    pub tier: Option<SubscriptionTier>,
}

pub struct SubscriptionLifecycleHandler {
    users: Arc<dyn UserDirectory>,
    tiers: Arc<dyn TierRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn UserNotifier>,
}

impl SubscriptionLifecycleHandler {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tiers: Arc<dyn TierRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            users,
            tiers,
            subscriptions,
            gateway,
            notifier,
        }
    }

    /// Starts a trial on a tier that offers one.
    pub async fn subscribe(&self, cmd: SubscribeCommand) -> Result<UserSubscription, BillingError> {
        if self.users.find_contact(&cmd.user_id).await?.is_none() {
            return Err(BillingError::not_found("user", cmd.user_id));
        }
        let tier = self.available_tier(&cmd.tier_id).await?;

        let now = Timestamp::now();
        let subscription = UserSubscription::start_trial(cmd.user_id, &tier, now)?;

        match self.subscriptions.create_if_none_current(&subscription).await? {
            CreateOutcome::Created => {}
            CreateOutcome::CurrentExists => {
                return Err(BillingError::conflict(
                    "User already has an active subscription",
                ))
            }
        }

        tracing::info!(
            user_id = %cmd.user_id,
            tier_id = %tier.id,
            subscription_id = %subscription.id,
            "Trial started"
        );
        if let Some(trial_end) = subscription.trial_end {
            self.notify(
                &cmd.user_id,
                BillingNotification::TrialStarted {
                    tier_name: tier.name.clone(),
                    trial_end,
                },
            )
            .await;
        }
        Ok(subscription)
    }

    /// Moves an active subscription to a higher or lower tier in place.
    pub async fn change_plan(&self, cmd: ChangePlanCommand) -> Result<UserSubscription, BillingError> {
        let mut subscription = self.current(&cmd.user_id).await?;
        if subscription.tier_id == cmd.tier_id {
            return Err(BillingError::validation(
                "tier_id",
                "subscription is already on this tier",
            ));
        }

        let current_tier = self
            .tiers
            .find_by_id(&subscription.tier_id)
            .await?
            .ok_or_else(|| BillingError::not_found("tier", subscription.tier_id))?;
        let target = self
            .tiers
            .find_by_id(&cmd.tier_id)
            .await?
            .ok_or_else(|| BillingError::not_found("tier", cmd.tier_id))?;

        subscription.change_tier(&current_tier, &target, cmd.direction, Timestamp::now())?;
        self.subscriptions.save(&subscription).await?;

        tracing::info!(
            user_id = %cmd.user_id,
            from_tier = %current_tier.id,
            to_tier = %target.id,
            direction = ?cmd.direction,
            "Subscription plan changed"
        );
        Ok(subscription)
    }

    pub async fn cancel(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<UserSubscription, BillingError> {
        let subscription = self.current(&cmd.user_id).await?;

        if cmd.at_period_end && subscription.remote_subscription_code.is_some() {
            return Err(BillingError::validation(
                "at_period_end",
                "gateway-billed subscriptions can only be cancelled immediately",
            ));
        }

        if let Some(code) = subscription.remote_subscription_code.as_deref() {
            self.disable_remote(code).await?;
        }

        // Re-read: a webhook may have cancelled the row during the gateway call.
        let mut subscription = match self.subscriptions.find_current_for_user(&cmd.user_id).await? {
            Some(current) if current.id == subscription.id => current,
            _ => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    "Subscription left the live state during cancellation"
                );
                return Ok(self
                    .refreshed(&subscription)
                    .await?
                    .unwrap_or(subscription));
            }
        };

        let now = Timestamp::now();
        let effective_at = if cmd.at_period_end {
            subscription.cancel_at_period_end(now)?;
            subscription.current_period_end
        } else {
            subscription.cancel(now)?;
            now
        };
        self.subscriptions.save(&subscription).await?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            at_period_end = cmd.at_period_end,
            "Subscription cancelled"
        );
        self.notify(
            &cmd.user_id,
            BillingNotification::SubscriptionCancelled { effective_at },
        )
        .await;
        Ok(subscription)
    }

    pub async fn current_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CurrentSubscription>, BillingError> {
        let Some(subscription) = self.subscriptions.find_current_for_user(user_id).await? else {
            return Ok(None);
        };
        let tier = self.tiers.find_by_id(&subscription.tier_id).await?;
        Ok(Some(CurrentSubscription { subscription, tier }))
    }

    async fn current(&self, user_id: &UserId) -> Result<UserSubscription, BillingError> {
        self.subscriptions
            .find_current_for_user(user_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", user_id))
    }

    async fn available_tier(&self, tier_id: &TierId) -> Result<SubscriptionTier, BillingError> {
        self.tiers
            .find_by_id(tier_id)
            .await?
            .filter(SubscriptionTier::is_available)
            .ok_or_else(|| BillingError::not_found("tier", tier_id))
    }

    async fn disable_remote(&self, code: &str) -> Result<(), BillingError> {
        let remote = self.gateway.fetch_subscription(code).await?;
        let token = remote.email_token.ok_or_else(|| {
            BillingError::gateway(
                format!("subscription {} has no email token", code),
                false,
            )
        })?;
        self.gateway.disable_subscription(code, &token).await?;
        Ok(())
    }

    async fn refreshed(
        &self,
        subscription: &UserSubscription,
    ) -> Result<Option<UserSubscription>, BillingError> {
        match subscription.remote_subscription_code.as_deref() {
            Some(code) => Ok(self
                .subscriptions
                .find_by_remote_subscription_code(code)
                .await?),
            None => Ok(None),
        }
    }

    async fn notify(&self, user_id: &UserId, notification: BillingNotification) {
        if let Err(e) = self.notifier.notify(user_id, notification).await {
            tracing::warn!(user_id = %user_id, error = %e, "Billing notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::notify::TracingNotifier;
    use crate::adapters::paystack::{GatewayCall, MockPaymentGateway};
    use crate::domain::billing::{test_tier, BillingType, PaymentDetails, SubscriptionStatus};
    use crate::ports::{GatewayError, RemoteSubscription};
    use rust_decimal::Decimal;

    struct Fixture {
        store: InMemoryBillingStore,
        gateway: MockPaymentGateway,
        handler: SubscriptionLifecycleHandler,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let user = store.add_user("ada@example.com").await;
        let handler = SubscriptionLifecycleHandler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(TracingNotifier::new()),
        );
        Fixture {
            store,
            gateway,
            handler,
            user,
        }
    }

    fn tier_at(level: i32, trial_days: i32) -> SubscriptionTier {
        let mut tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        tier.level = level;
        tier.trial_days = trial_days;
        tier
    }

    async fn paid(f: &Fixture, tier: &SubscriptionTier, remote: Option<&str>) -> UserSubscription {
        let payment = PaymentDetails {
            reference: "sub_00000001_1700000000".to_string(),
            amount: tier.price,
            customer_code: Some("CUS_ada".to_string()),
            paid_at: Timestamp::now(),
        };
        let mut sub = UserSubscription::from_payment(f.user, tier, &payment, Timestamp::now());
        sub.remote_subscription_code = remote.map(str::to_string);
        f.store.insert_subscription(sub.clone()).await;
        sub
    }

    #[tokio::test]
    async fn subscribe_starts_trial_and_grants_premium() {
        let f = fixture().await;
        let tier = tier_at(2, 14);
        f.store.add_tier(tier.clone()).await;

        let sub = f
            .handler
            .subscribe(SubscribeCommand {
                user_id: f.user,
                tier_id: tier.id,
            })
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert_eq!(sub.trial_end, Some(sub.created_at.add_days(14)));
        assert_eq!(sub.current_period_end, sub.trial_end.unwrap());
        assert!(f.store.is_premium(&f.user).await);
    }

    #[tokio::test]
    async fn subscribe_twice_conflicts() {
        let f = fixture().await;
        let tier = tier_at(2, 14);
        f.store.add_tier(tier.clone()).await;
        let cmd = SubscribeCommand {
            user_id: f.user,
            tier_id: tier.id,
        };

        f.handler.subscribe(cmd.clone()).await.unwrap();
        let err = f.handler.subscribe(cmd).await.unwrap_err();

        assert!(matches!(err, BillingError::Conflict(_)));
        assert_eq!(f.store.subscriptions_for(&f.user).await.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_requires_trial_tier() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;

        let err = f
            .handler
            .subscribe(SubscribeCommand {
                user_id: f.user,
                tier_id: tier.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }

    #[tokio::test]
    async fn upgrade_keeps_billing_period() {
        let f = fixture().await;
        let basic = tier_at(1, 0);
        let pro = tier_at(2, 0);
        f.store.add_tier(basic.clone()).await;
        f.store.add_tier(pro.clone()).await;
        let before = paid(&f, &basic, None).await;

        let after = f
            .handler
            .change_plan(ChangePlanCommand {
                user_id: f.user,
                tier_id: pro.id,
                direction: PlanChange::Upgrade,
            })
            .await
            .unwrap();

        assert_eq!(after.id, before.id);
        assert_eq!(after.tier_id, pro.id);
        assert_eq!(after.current_period_end, before.current_period_end);
    }

    #[tokio::test]
    async fn downgrade_to_higher_tier_is_rejected() {
        let f = fixture().await;
        let basic = tier_at(1, 0);
        let pro = tier_at(2, 0);
        f.store.add_tier(basic.clone()).await;
        f.store.add_tier(pro.clone()).await;
        paid(&f, &basic, None).await;

        let err = f
            .handler
            .change_plan(ChangePlanCommand {
                user_id: f.user,
                tier_id: pro.id,
                direction: PlanChange::Downgrade,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }

    #[tokio::test]
    async fn same_tier_change_is_rejected() {
        let f = fixture().await;
        let basic = tier_at(1, 0);
        f.store.add_tier(basic.clone()).await;
        paid(&f, &basic, None).await;

        let err = f
            .handler
            .change_plan(ChangePlanCommand {
                user_id: f.user,
                tier_id: basic.id,
                direction: PlanChange::Upgrade,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }

    #[tokio::test]
    async fn cancel_disables_remote_then_cancels_locally() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;
        paid(&f, &tier, Some("SUB_ada")).await;
        f.gateway.set_subscription(RemoteSubscription {
            subscription_code: "SUB_ada".to_string(),
            email_token: Some("tok_ada".to_string()),
            status: "active".to_string(),
            customer_code: Some("CUS_ada".to_string()),
            plan_code: Some("PLN_0001".to_string()),
            next_payment_date: None,
        });

        let sub = f
            .handler
            .cancel(CancelSubscriptionCommand {
                user_id: f.user,
                at_period_end: false,
            })
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(!f.store.is_premium(&f.user).await);
        assert_eq!(
            f.gateway.count_calls(|c| matches!(
                c,
                GatewayCall::DisableSubscription { email_token, .. } if email_token == "tok_ada"
            )),
            1
        );
    }

    #[tokio::test]
    async fn cancel_at_period_end_keeps_access() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;
        paid(&f, &tier, None).await;

        let sub = f
            .handler
            .cancel(CancelSubscriptionCommand {
                user_id: f.user,
                at_period_end: true,
            })
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.cancel_at_period_end);
        assert!(f.store.is_premium(&f.user).await);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn period_end_cancel_of_gateway_billed_row_is_rejected() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;
        let before = paid(&f, &tier, Some("SUB_ada")).await;

        let err = f
            .handler
            .cancel(CancelSubscriptionCommand {
                user_id: f.user,
                at_period_end: true,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "at_period_end"));
        assert!(f.gateway.calls().is_empty());
        let stored = f.store.subscription(&before.id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert!(!stored.cancel_at_period_end);
        assert!(f.store.is_premium(&f.user).await);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_subscription_untouched() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;
        let before = paid(&f, &tier, Some("SUB_ada")).await;
        f.gateway.fail_next(GatewayError::network("connection reset"));

        let err = f
            .handler
            .cancel(CancelSubscriptionCommand {
                user_id: f.user,
                at_period_end: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Gateway { .. }));
        let stored = f.store.subscription(&before.id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_not_found() {
        let f = fixture().await;

        let err = f
            .handler
            .cancel(CancelSubscriptionCommand {
                user_id: f.user,
                at_period_end: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::NotFound { entity: "subscription", .. }));
    }

    #[tokio::test]
    async fn current_subscription_includes_tier() {
        let f = fixture().await;
        let tier = tier_at(2, 0);
        f.store.add_tier(tier.clone()).await;
        assert!(f.handler.current_subscription(&f.user).await.unwrap().is_none());

        paid(&f, &tier, None).await;
        let current = f.handler.current_subscription(&f.user).await.unwrap().unwrap();

        assert_eq!(current.tier.map(|t| t.id), Some(tier.id));
    }
}
