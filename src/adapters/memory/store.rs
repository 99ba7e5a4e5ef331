//! In-memory billing store.
//!
//! One lock over all tables, so every port call behaves like a serializable
//! transaction. Backs tests and local runs without Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{
    RemotePlanBinding, SettlementDecision, SettlementRecord, SubscriptionTier,
    UserSubscription,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, Page, PageRequest, SubscriptionId, TierId, Timestamp, UserId,
};
use crate::ports::{
    BindingInsert, CreateOutcome, ExpireOutcome, LapsedCursor, PlanBindingRepository, SettleOutcome,
    SettlementRequest, SettlementStore, SubscriptionRepository, TierRepository, UserContact,
    UserDirectory,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, UserContact>,
    premium: HashMap<UserId, bool>,
    tiers: HashMap<TierId, SubscriptionTier>,
    bindings: Vec<RemotePlanBinding>,
    subscriptions: Vec<UserSubscription>,
    settlements: Vec<SettlementRecord>,
    failing_expiry: HashSet<SubscriptionId>,
    /// Users whose live row is locked by a simulated concurrent transaction.
    held: HashSet<UserId>,
}

impl Tables {
    fn current_for(&self, user_id: &UserId) -> Option<&UserSubscription> {
        self.subscriptions
            .iter()
            .rev()
            .find(|s| s.user_id == *user_id && s.is_current() && s.deleted_at.is_none())
    }

    fn sync_premium(&mut self, user_id: UserId) {
        let entitled = self
            .subscriptions
            .iter()
            .any(|s| s.user_id == user_id && s.grants_premium() && s.deleted_at.is_none());
        self.premium.insert(user_id, entitled);
    }

    /// Version-checked write; bumps the stored version.
    fn write_versioned(&mut self, subscription: &UserSubscription) -> Result<(), DomainError> {
        let slot = self
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                    .with_detail("id", subscription.id.to_string())
            })?;
        if slot.version != subscription.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                "Subscription version mismatch - another update occurred",
            )
            .with_detail("id", subscription.id.to_string())
            .with_detail("version", subscription.version.to_string()));
        }
        *slot = subscription.clone();
        slot.version += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, email: &str) -> UserId {
        let id = UserId::new();
        let mut t = self.tables.write().await;
        t.users.insert(
            id,
            UserContact {
                id,
                email: email.to_string(),
                display_name: None,
            },
        );
        t.premium.insert(id, false);
        id
    }

    pub async fn add_tier(&self, tier: SubscriptionTier) {
        self.tables.write().await.tiers.insert(tier.id, tier);
    }

    /// Inserts a row as-is, bypassing the one-live-row check.
    pub async fn insert_subscription(&self, subscription: UserSubscription) {
        let mut t = self.tables.write().await;
        let user_id = subscription.user_id;
        t.subscriptions.push(subscription);
        t.sync_premium(user_id);
    }

    /// Simulates another transaction holding the user's live row: settlement
    /// reports contention, trials report a current row, expiry skips.
    pub async fn hold_subscription_lock(&self, user_id: &UserId) {
        self.tables.write().await.held.insert(*user_id);
    }

    pub async fn release_subscription_lock(&self, user_id: &UserId) {
        self.tables.write().await.held.remove(user_id);
    }

    /// Makes `expire_lapsed` fail for this row.
    pub async fn fail_expiry_for(&self, id: SubscriptionId) {
        self.tables.write().await.failing_expiry.insert(id);
    }

    pub async fn is_premium(&self, user_id: &UserId) -> bool {
        self.tables
            .read()
            .await
            .premium
            .get(user_id)
            .copied()
            .unwrap_or(false)
    }

    pub async fn subscriptions_for(&self, user_id: &UserId) -> Vec<UserSubscription> {
        self.tables
            .read()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.user_id == *user_id)
            .cloned()
            .collect()
    }

    pub async fn subscription(&self, id: &SubscriptionId) -> Option<UserSubscription> {
        self.tables
            .read()
            .await
            .subscriptions
            .iter()
            .find(|s| s.id == *id)
            .cloned()
    }

    pub async fn settlements_for_reference(&self, reference: &str) -> Vec<SettlementRecord> {
        self.tables
            .read()
            .await
            .settlements
            .iter()
            .filter(|s| s.reference == reference)
            .cloned()
            .collect()
    }

    pub async fn bindings_for(&self, tier_id: &TierId) -> Vec<RemotePlanBinding> {
        self.tables
            .read()
            .await
            .bindings
            .iter()
            .filter(|b| b.tier_id == *tier_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TierRepository for InMemoryBillingStore {
    async fn find_by_id(&self, id: &TierId) -> Result<Option<SubscriptionTier>, DomainError> {
        Ok(self.tables.read().await.tiers.get(id).cloned())
    }

    async fn list_available(&self) -> Result<Vec<SubscriptionTier>, DomainError> {
        let mut tiers: Vec<_> = self
            .tables
            .read()
            .await
            .tiers
            .values()
            .filter(|t| t.is_available())
            .cloned()
            .collect();
        tiers.sort_by_key(|t| t.sort_order);
        Ok(tiers)
    }
}

#[async_trait]
impl PlanBindingRepository for InMemoryBillingStore {
    async fn find_active(
        &self,
        tier_id: &TierId,
    ) -> Result<Option<RemotePlanBinding>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .bindings
            .iter()
            .find(|b| b.tier_id == *tier_id && b.is_active)
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        binding: &RemotePlanBinding,
    ) -> Result<BindingInsert, DomainError> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t
            .bindings
            .iter()
            .find(|b| b.tier_id == binding.tier_id && b.is_active)
        {
            return Ok(BindingInsert::Existing(existing.plan_code.clone()));
        }
        t.bindings.push(binding.clone());
        Ok(BindingInsert::Inserted(binding.plan_code.clone()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryBillingStore {
    async fn find_contact(&self, user_id: &UserId) -> Result<Option<UserContact>, DomainError> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self.tables.read().await.current_for(user_id).cloned())
    }

    async fn find_by_remote_subscription_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .iter()
            .rev()
            .find(|s| s.remote_subscription_code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_by_customer_code(
        &self,
        code: &str,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .iter()
            .rev()
            .find(|s| s.remote_customer_code.as_deref() == Some(code))
            .cloned())
    }

    async fn create_if_none_current(
        &self,
        subscription: &UserSubscription,
    ) -> Result<CreateOutcome, DomainError> {
        let mut t = self.tables.write().await;
        if t.held.contains(&subscription.user_id) || t.current_for(&subscription.user_id).is_some() {
            return Ok(CreateOutcome::CurrentExists);
        }
        t.subscriptions.push(subscription.clone());
        t.sync_premium(subscription.user_id);
        Ok(CreateOutcome::Created)
    }

    async fn save(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        let mut t = self.tables.write().await;
        t.write_versioned(subscription)?;
        t.sync_premium(subscription.user_id);
        Ok(())
    }

    async fn find_lapsed(
        &self,
        now: Timestamp,
        after: Option<LapsedCursor>,
        limit: u32,
    ) -> Result<Vec<UserSubscription>, DomainError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .subscriptions
            .iter()
            .filter(|s| s.has_lapsed(now))
            .filter(|s| after.map_or(true, |cursor| LapsedCursor::after(s) > cursor))
            .cloned()
            .collect();
        rows.sort_by_key(LapsedCursor::after);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn expire_lapsed(
        &self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<ExpireOutcome, DomainError> {
        let mut t = self.tables.write().await;
        if t.failing_expiry.contains(id) {
            return Err(DomainError::database("expire subscription", "injected failure"));
        }
        let held = &t.held;
        let Some(sub) = t
            .subscriptions
            .iter()
            .find(|s| s.id == *id && !held.contains(&s.user_id))
        else {
            return Ok(ExpireOutcome::Skipped);
        };
        let mut sub = sub.clone();
        if !sub.has_lapsed(now) || sub.expire(now).is_err() {
            return Ok(ExpireOutcome::Skipped);
        }
        let user_id = sub.user_id;
        t.write_versioned(&sub)?;
        t.sync_premium(user_id);
        Ok(ExpireOutcome::Expired { user_id })
    }
}

#[async_trait]
impl SettlementStore for InMemoryBillingStore {
    async fn exists(&self, reference: &str) -> Result<bool, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .settlements
            .iter()
            .any(|s| s.reference == reference))
    }

    async fn settle(&self, request: SettlementRequest) -> Result<SettleOutcome, DomainError> {
        let mut t = self.tables.write().await;
        if t.settlements.iter().any(|s| s.reference == request.payment.reference) {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let current = t.current_for(&request.payment.user_id).cloned();
        if t.held.contains(&request.payment.user_id) {
            return Ok(match current {
                Some(held) if held.is_entitled() && !held.has_lapsed(request.now) => {
                    SettleOutcome::ActiveSubscriptionExists {
                        subscription_id: held.id,
                    }
                }
                _ => SettleOutcome::Contended,
            });
        }
        let decision =
            SettlementDecision::decide(current, &request.payment, &request.tier, request.now);

        let (subscription, promoted) = match decision {
            SettlementDecision::AlreadyActive(id) => {
                return Ok(SettleOutcome::ActiveSubscriptionExists { subscription_id: id })
            }
            SettlementDecision::Create(sub) => {
                t.subscriptions.push(sub.clone());
                (sub, false)
            }
            SettlementDecision::Promote(mut sub) => {
                t.write_versioned(&sub)?;
                sub.version += 1;
                (sub, true)
            }
        };

        let settlement = SettlementRecord::for_payment(&request.payment, subscription.id, request.now);
        t.settlements.push(settlement.clone());
        t.sync_premium(subscription.user_id);

        Ok(SettleOutcome::Applied {
            subscription,
            settlement,
            promoted,
        })
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        page: PageRequest,
    ) -> Result<Page<SettlementRecord>, DomainError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .settlements
            .iter()
            .filter(|s| s.user_id == *user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(Page::new(items, page, total))
    }
}
