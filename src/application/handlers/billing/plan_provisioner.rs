//! PlanProvisioner - lazily binds a tier to a gateway recurring plan.
//!
//! The gateway plan is created outside any transaction; the local binding is
//! then inserted first-writer-wins. Racing provisioners may leave orphaned
//! remote plans behind, but every caller returns the same winning code.

use std::sync::Arc;

use crate::domain::billing::{BillingError, RemotePlanBinding, SubscriptionTier};
use crate::domain::foundation::Timestamp;
use crate::ports::{BindingInsert, CreatePlan, PaymentGateway, PlanBindingRepository, PlanCodeCache};

pub struct PlanProvisioner {
    bindings: Arc<dyn PlanBindingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    cache: Arc<dyn PlanCodeCache>,
}

impl PlanProvisioner {
    pub fn new(
        bindings: Arc<dyn PlanBindingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        cache: Arc<dyn PlanCodeCache>,
    ) -> Self {
        Self {
            bindings,
            gateway,
            cache,
        }
    }

    /// Returns the tier's gateway plan code, creating the plan on first use.
    pub async fn plan_code_for(&self, tier: &SubscriptionTier) -> Result<String, BillingError> {
        let interval = tier.billing_type.plan_interval().ok_or_else(|| {
            BillingError::validation(
                "billing_type",
                format!("tier '{}' is not billed on a recurring plan", tier.name),
            )
        })?;

        match self.cache.get(&tier.id).await {
            Ok(Some(code)) => return Ok(code),
            Ok(None) => {}
            Err(e) => tracing::warn!(tier_id = %tier.id, error = %e, "Plan code cache read failed"),
        }

        if let Some(binding) = self.bindings.find_active(&tier.id).await? {
            self.remember(tier, &binding.plan_code).await;
            return Ok(binding.plan_code);
        }

        let amount_minor = tier.price_minor()?;
        let plan = self
            .gateway
            .create_plan(CreatePlan {
                name: tier.name.clone(),
                interval: interval.to_string(),
                amount_minor,
                currency: tier.currency.clone(),
            })
            .await?;

        let binding = RemotePlanBinding::new(tier.id, plan.plan_code.clone(), Timestamp::now());
        let code = match self.bindings.insert_if_absent(&binding).await? {
            BindingInsert::Inserted(code) => {
                tracing::info!(tier_id = %tier.id, plan_code = %code, "Bound tier to gateway plan");
                code
            }
            BindingInsert::Existing(code) => {
                tracing::warn!(
                    tier_id = %tier.id,
                    orphaned_plan_code = %plan.plan_code,
                    plan_code = %code,
                    "Lost plan binding race; remote plan left unused"
                );
                code
            }
            BindingInsert::Conflict => {
                let winner = self.bindings.find_active(&tier.id).await?.ok_or_else(|| {
                    BillingError::integrity(format!(
                        "plan binding for tier {} conflicted but no active binding exists",
                        tier.id
                    ))
                })?;
                tracing::warn!(
                    tier_id = %tier.id,
                    orphaned_plan_code = %plan.plan_code,
                    plan_code = %winner.plan_code,
                    "Plan binding insert conflicted; using winner"
                );
                winner.plan_code
            }
        };

        self.remember(tier, &code).await;
        Ok(code)
    }

    async fn remember(&self, tier: &SubscriptionTier, code: &str) {
        if let Err(e) = self.cache.put(&tier.id, code).await {
            tracing::warn!(tier_id = %tier.id, error = %e, "Plan code cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingStore, InMemoryPlanCodeCache};
    use crate::adapters::paystack::{GatewayCall, MockPaymentGateway};
    use crate::domain::billing::{test_tier, BillingType};
    use crate::domain::foundation::{DomainError, TierId};
    use crate::ports::GatewayError;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn provisioner(
        store: &InMemoryBillingStore,
        gateway: &MockPaymentGateway,
        cache: Arc<dyn PlanCodeCache>,
    ) -> PlanProvisioner {
        PlanProvisioner::new(Arc::new(store.clone()), Arc::new(gateway.clone()), cache)
    }

    /// Loses every insert race: reports a conflict and lets a rival win.
    struct RacingBindings {
        inner: InMemoryBillingStore,
        rival_code: String,
    }

    #[async_trait]
    impl PlanBindingRepository for RacingBindings {
        async fn find_active(
            &self,
            tier_id: &TierId,
        ) -> Result<Option<RemotePlanBinding>, DomainError> {
            self.inner.find_active(tier_id).await
        }

        async fn insert_if_absent(
            &self,
            binding: &RemotePlanBinding,
        ) -> Result<BindingInsert, DomainError> {
            let rival = RemotePlanBinding::new(binding.tier_id, self.rival_code.clone(), Timestamp::now());
            self.inner.insert_if_absent(&rival).await?;
            Ok(BindingInsert::Conflict)
        }
    }

    struct BrokenCache {
        reads: Mutex<u32>,
    }

    #[async_trait]
    impl PlanCodeCache for BrokenCache {
        async fn get(&self, _tier_id: &TierId) -> Result<Option<String>, DomainError> {
            *self.reads.lock().unwrap() += 1;
            Err(DomainError::new(
                crate::domain::foundation::ErrorCode::CacheError,
                "connection refused",
            ))
        }

        async fn put(&self, _tier_id: &TierId, _plan_code: &str) -> Result<(), DomainError> {
            Err(DomainError::new(
                crate::domain::foundation::ErrorCode::CacheError,
                "connection refused",
            ))
        }
    }

    #[tokio::test]
    async fn first_call_creates_plan_and_binding() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        let p = provisioner(&store, &gateway, Arc::new(InMemoryPlanCodeCache::new()));

        let code = p.plan_code_for(&tier).await.unwrap();

        assert!(code.starts_with("PLN_"));
        assert_eq!(gateway.plans_created(), 1);
        let created = gateway
            .calls()
            .into_iter()
            .find_map(|c| match c {
                GatewayCall::CreatePlan(plan) => Some(plan),
                _ => None,
            })
            .unwrap();
        assert_eq!(created.amount_minor, 5000);
        assert_eq!(created.interval, "monthly");
        assert_eq!(store.bindings_for(&tier.id).await.len(), 1);
    }

    #[tokio::test]
    async fn second_call_is_served_without_gateway() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Yearly);
        let p = provisioner(&store, &gateway, Arc::new(InMemoryPlanCodeCache::new()));

        let first = p.plan_code_for(&tier).await.unwrap();
        let second = p.plan_code_for(&tier).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.plans_created(), 1);
    }

    #[tokio::test]
    async fn existing_binding_skips_gateway() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        store
            .insert_if_absent(&RemotePlanBinding::new(tier.id, "PLN_seeded", Timestamp::now()))
            .await
            .unwrap();
        let p = provisioner(&store, &gateway, Arc::new(InMemoryPlanCodeCache::new()));

        assert_eq!(p.plan_code_for(&tier).await.unwrap(), "PLN_seeded");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn conflict_returns_winner_code() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        let p = PlanProvisioner::new(
            Arc::new(RacingBindings {
                inner: store.clone(),
                rival_code: "PLN_rival".to_string(),
            }),
            Arc::new(gateway.clone()),
            Arc::new(InMemoryPlanCodeCache::new()),
        );

        assert_eq!(p.plan_code_for(&tier).await.unwrap(), "PLN_rival");
    }

    #[tokio::test]
    async fn cache_failures_fall_through_to_database() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        let cache = Arc::new(BrokenCache {
            reads: Mutex::new(0),
        });
        let p = provisioner(&store, &gateway, cache.clone());

        let code = p.plan_code_for(&tier).await.unwrap();

        assert!(code.starts_with("PLN_"));
        assert_eq!(*cache.reads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn lifetime_tier_has_no_plan() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Lifetime);
        let p = provisioner(&store, &gateway, Arc::new(InMemoryPlanCodeCache::new()));

        let err = p.plan_code_for(&tier).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation { .. }));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_leaves_no_binding() {
        let store = InMemoryBillingStore::new();
        let gateway = MockPaymentGateway::new();
        gateway.fail_next(GatewayError::timeout("plan create timed out"));
        let tier = test_tier(Decimal::new(5000, 2), BillingType::Monthly);
        let p = provisioner(&store, &gateway, Arc::new(InMemoryPlanCodeCache::new()));

        let err = p.plan_code_for(&tier).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.bindings_for(&tier.id).await.is_empty());
    }
}
