//! Payment references, the idempotency key for settlement.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

const PREFIX: &str = "sub";
const MAX_LEN: usize = 100;

/// Globally unique, human-traceable reference for one gateway transaction.
///
/// Generated references look like `sub_ab12cd34_1700000000`: eight random
/// hex digits followed by the issue time in Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Fresh reference using the thread-local RNG.
    pub fn generate(now: Timestamp) -> Self {
        Self::generate_with(&mut rand::thread_rng(), now)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, now: Timestamp) -> Self {
        let random: u32 = rng.gen();
        Self(format!("{}_{:08x}_{}", PREFIX, random, now.unix_secs()))
    }

    /// Accepts any reference the gateway may echo back, including ones this
    /// service did not generate.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::empty_field("reference"));
        }
        if raw.len() > MAX_LEN {
            return Err(ValidationError::out_of_range(
                "reference",
                1,
                MAX_LEN as i64,
                raw.len() as i64,
            ));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '='))
        {
            return Err(ValidationError::invalid_format(
                "reference",
                "only alphanumerics and - . = _ are allowed",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Issue time embedded in a generated reference.
    pub fn issued_at(&self) -> Option<Timestamp> {
        let mut parts = self.0.splitn(3, '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(PREFIX), Some(random), Some(secs)) if random.len() == 8 => {
                Timestamp::from_unix_secs(secs.parse().ok()?)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaymentReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
