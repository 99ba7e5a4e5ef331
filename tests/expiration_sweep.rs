//! Expiry sweep: lapsed rows expire once, premium access follows, and one
//! bad row never stops the batch.

mod common;

use rust_decimal::Decimal;

use subscription_ledger::domain::billing::{
    BillingType, PaymentDetails, PlanChange, SubscriptionStatus, SubscriptionTier,
    UserSubscription,
};
use subscription_ledger::domain::foundation::{ErrorCode, Timestamp, UserId};
use subscription_ledger::ports::SubscriptionRepository;

use common::{tier, TestApp};

fn paid(user: UserId, tier: &SubscriptionTier, started: Timestamp) -> UserSubscription {
    UserSubscription::from_payment(
        user,
        tier,
        &PaymentDetails {
            reference: format!("sub_{}_{}", &user.to_string()[..8], started.unix_secs()),
            amount: Decimal::new(5000, 2),
            customer_code: None,
            paid_at: started,
        },
        started,
    )
}

#[tokio::test]
async fn sweep_expires_lapsed_rows_once() {
    let app = TestApp::new();
    let now = Timestamp::now();
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;

    // Period ended ten days ago.
    let lapsed_user = app.store.add_user("lapsed@example.com").await;
    let lapsed = paid(lapsed_user, &monthly, now.add_days(-40));
    app.store.insert_subscription(lapsed.clone()).await;

    // Trial ended yesterday.
    let trial_user = app.store.add_user("trial@example.com").await;
    let mut trial_tier = monthly.clone();
    trial_tier.trial_days = 7;
    let trial = UserSubscription::start_trial(trial_user, &trial_tier, now.add_days(-8)).unwrap();
    app.store.insert_subscription(trial.clone()).await;

    // Still inside its period.
    let live_user = app.store.add_user("live@example.com").await;
    app.store
        .insert_subscription(paid(live_user, &monthly, now.add_days(-5)))
        .await;

    // Past due and past period end: left to the gateway's retries.
    let dunning_user = app.store.add_user("dunning@example.com").await;
    let mut dunning = paid(dunning_user, &monthly, now.add_days(-40));
    dunning.mark_past_due(now.add_days(-9)).unwrap();
    app.store.insert_subscription(dunning.clone()).await;

    assert!(app.store.is_premium(&lapsed_user).await);

    let first = app.state.sweeper.sweep_at(now).await.unwrap();
    assert_eq!(first.expired, 2);
    assert_eq!(first.failed, 0);

    let second = app.state.sweeper.sweep_at(now).await.unwrap();
    assert_eq!(second.expired, 0);
    assert_eq!(second.examined, 0);

    let expired = app.store.subscription(&lapsed.id).await.unwrap();
    assert_eq!(expired.status, SubscriptionStatus::Expired);
    assert!(!expired.is_active);
    assert!(!app.store.is_premium(&lapsed_user).await);
    assert!(!app.store.is_premium(&trial_user).await);
    assert!(app.store.is_premium(&live_user).await);

    let dunning = app.store.subscription(&dunning.id).await.unwrap();
    assert_eq!(dunning.status, SubscriptionStatus::PastDue);
    assert!(app.store.is_premium(&dunning_user).await);
}

#[tokio::test]
async fn one_failing_row_does_not_stop_the_batch() {
    let app = TestApp::new();
    let now = Timestamp::now();
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;

    let mut rows = Vec::new();
    for i in 0..3 {
        let user = app.store.add_user(&format!("user{}@example.com", i)).await;
        let row = paid(user, &monthly, now.add_days(-31 - i));
        app.store.insert_subscription(row.clone()).await;
        rows.push(row);
    }
    app.store.fail_expiry_for(rows[1].id).await;

    let report = app.state.sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.expired, 2);
    assert_eq!(report.failed, 1);
    let stuck = app.store.subscription(&rows[1].id).await.unwrap();
    assert_eq!(stuck.status, SubscriptionStatus::Active);
    for row in [&rows[0], &rows[2]] {
        let row = app.store.subscription(&row.id).await.unwrap();
        assert_eq!(row.status, SubscriptionStatus::Expired);
    }
}

#[tokio::test]
async fn cancel_at_period_end_expires_when_the_period_ends() {
    let app = TestApp::new();
    let now = Timestamp::now();
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;
    let user = app.store.add_user("ada@example.com").await;
    let mut row = paid(user, &monthly, now.add_days(-35));
    row.cancel_at_period_end(now.add_days(-10)).unwrap();
    app.store.insert_subscription(row.clone()).await;

    let report = app.state.sweeper.sweep_at(now).await.unwrap();

    assert_eq!(report.expired, 1);
    assert!(!app.store.is_premium(&user).await);
}

#[tokio::test]
async fn one_run_pages_past_rows_that_keep_failing() {
    let app = TestApp::with_batch_size(2);
    let now = Timestamp::now();
    let monthly = tier(5000, BillingType::Monthly);
    app.store.add_tier(monthly.clone()).await;
    let mut rows = Vec::new();
    for i in 0..5 {
        let user = app.store.add_user(&format!("user{}@example.com", i)).await;
        let row = paid(user, &monthly, now.add_days(-40 - i));
        app.store.insert_subscription(row.clone()).await;
        rows.push(row);
    }
    // The two oldest rows fill the first page and always fail.
    app.store.fail_expiry_for(rows[4].id).await;
    app.store.fail_expiry_for(rows[3].id).await;

    let first = app.state.sweeper.sweep_at(now).await.unwrap();
    assert_eq!(first.examined, 5);
    assert_eq!(first.expired, 3);
    assert_eq!(first.failed, 2);

    let second = app.state.sweeper.sweep_at(now).await.unwrap();
    assert_eq!(second.examined, 2);
    assert_eq!(second.expired, 0);
    for row in &rows[..3] {
        let row = app.store.subscription(&row.id).await.unwrap();
        assert_eq!(row.status, SubscriptionStatus::Expired);
    }
}

#[tokio::test]
async fn stale_plan_change_cannot_revive_an_expired_row() {
    let app = TestApp::new();
    let now = Timestamp::now();
    let basic = tier(5000, BillingType::Monthly);
    let mut pro = tier(9000, BillingType::Monthly);
    pro.level = basic.level + 1;
    app.store.add_tier(basic.clone()).await;
    app.store.add_tier(pro.clone()).await;
    let user = app.store.add_user("ada@example.com").await;
    let row = paid(user, &basic, now.add_days(-40));
    app.store.insert_subscription(row.clone()).await;

    // Read before the sweep, written after it.
    let mut stale = app.store.subscription(&row.id).await.unwrap();
    let report = app.state.sweeper.sweep_at(now).await.unwrap();
    assert_eq!(report.expired, 1);

    stale
        .change_tier(&basic, &pro, PlanChange::Upgrade, Timestamp::now())
        .unwrap();
    let err = app.store.save(&stale).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::ConcurrencyConflict);
    let stored = app.store.subscription(&row.id).await.unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);
    assert_eq!(stored.tier_id, basic.id);
    assert!(!app.store.is_premium(&user).await);
}
