//! Purchasable subscription tiers.
//!
//! Tiers are maintained by administrators and are read-only here. Prices are
//! held in major currency units; the gateway speaks minor units.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{TierId, Timestamp, ValidationError};

/// Minor units per major unit for the currencies the gateway settles in.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Period granted to lifetime purchases, effectively unbounded.
pub const LIFETIME_PERIOD_DAYS: i64 = 365 * 100;

/// How a tier is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    Monthly,
    Yearly,
    Lifetime,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::Monthly => "monthly",
            BillingType::Yearly => "yearly",
            BillingType::Lifetime => "lifetime",
        }
    }

    /// Gateway plan interval, `None` for one-off lifetime charges.
    pub fn plan_interval(&self) -> Option<&'static str> {
        match self {
            BillingType::Monthly => Some("monthly"),
            BillingType::Yearly => Some("annually"),
            BillingType::Lifetime => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.plan_interval().is_some()
    }
}

impl fmt::Display for BillingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingType::Monthly),
            "yearly" => Ok(BillingType::Yearly),
            "lifetime" => Ok(BillingType::Lifetime),
            other => Err(ValidationError::invalid_format(
                "billing_type",
                format!("unknown billing type '{}'", other),
            )),
        }
    }
}

/// A purchasable plan definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub id: TierId,
    pub name: String,
    pub billing_type: BillingType,
    /// Ordering used by upgrade/downgrade; higher is better.
    pub level: i32,
    /// Price in major currency units.
    pub price: Decimal,
    /// ISO 4217 code, e.g. "NGN".
    pub currency: String,
    pub billing_cycle_days: i32,
    pub trial_days: i32,
    pub features: Vec<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub deleted_at: Option<Timestamp>,
}

impl SubscriptionTier {
    /// Active and not soft-deleted.
    pub fn is_available(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    pub fn is_free(&self) -> bool {
        self.price <= Decimal::ZERO
    }

    pub fn offers_trial(&self) -> bool {
        self.trial_days > 0
    }

    /// Price as gateway minor units (`price × 100`).
    ///
    /// Fails for prices with sub-minor precision or that overflow `i64`.
    pub fn price_minor(&self) -> Result<i64, ValidationError> {
        let scaled = self.price * Decimal::from(MINOR_UNITS_PER_MAJOR);
        if scaled.fract() != Decimal::ZERO {
            return Err(ValidationError::invalid_format(
                "price",
                format!("{} has more precision than the currency allows", self.price),
            ));
        }
        scaled.to_i64().ok_or_else(|| {
            ValidationError::invalid_format("price", format!("{} is out of range", self.price))
        })
    }

    /// End of a billing period that starts at `start`.
    pub fn period_end_from(&self, start: Timestamp) -> Timestamp {
        match self.billing_type {
            BillingType::Lifetime => start.add_days(LIFETIME_PERIOD_DAYS),
            _ => start.add_days(i64::from(self.billing_cycle_days)),
        }
    }
}

/// Converts a gateway minor-unit amount to major units.
///
/// Exact for currencies with a 100:1 minor-unit ratio. Three-decimal
/// currencies are not supported.
pub fn minor_to_major(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

#[cfg(test)]
pub(crate) fn test_tier(price: Decimal, billing_type: BillingType) -> SubscriptionTier {
    SubscriptionTier {
        id: TierId::new(),
        name: "Pro".to_string(),
        billing_type,
        level: 2,
        price,
        currency: "NGN".to_string(),
        billing_cycle_days: 30,
        trial_days: 0,
        features: vec!["unlimited_projects".to_string()],
        is_active: true,
        sort_order: 1,
        deleted_at: None,
    }
}
