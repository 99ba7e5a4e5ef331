//! Read-only view of platform users.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_contact(&self, user_id: &UserId) -> Result<Option<UserContact>, DomainError>;
}
