//! PostgreSQL implementation of UserDirectory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{UserContact, UserDirectory};

#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    email: String,
    display_name: Option<String>,
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_contact(&self, user_id: &UserId) -> Result<Option<UserContact>, DomainError> {
        let row: Option<ContactRow> = sqlx::query_as(
            "SELECT id, email, display_name FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("fetch user contact", e))?;

        Ok(row.map(|r| UserContact {
            id: UserId::from_uuid(r.id),
            email: r.email,
            display_name: r.display_name,
        }))
    }
}
