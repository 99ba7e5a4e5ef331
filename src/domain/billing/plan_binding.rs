//! Tier to remote plan mapping.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanBindingId, TierId, Timestamp};

/// Links one tier to the gateway plan that bills it.
///
/// At most one active binding per tier; the first writer wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlanBinding {
    pub id: PlanBindingId,
    pub tier_id: TierId,
    pub plan_code: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl RemotePlanBinding {
    pub fn new(tier_id: TierId, plan_code: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: PlanBindingId::new(),
            tier_id,
            plan_code: plan_code.into(),
            is_active: true,
            created_at: now,
        }
    }
}
