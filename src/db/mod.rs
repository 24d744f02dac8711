mod memory;
mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::workflow::{ReviewUpsert, Role, Status};

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Row storage for profiles, submissions, reviews and the audit log.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Users holding any of `roles`, optionally limited to one institution.
    async fn list_users_by_roles(
        &self,
        roles: &[Role],
        institution: Option<&str>,
    ) -> Result<Vec<User>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StoreError>;

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError>;

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError>;

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn attach_document(
        &self,
        id: Uuid,
        filename: &str,
        path: &str,
    ) -> Result<Submission, StoreError>;

    async fn list_reviews(&self, submission_id: Uuid) -> Result<Vec<Review>, StoreError>;

    /// Atomically move `submission_id` from `expected` to `next` and upsert
    /// `reviews` on (submission_id, reviewer_role).
    ///
    /// Fails with [`StoreError::Conflict`] when the stored status is no longer
    /// `expected`; nothing is written in that case.
    async fn commit_transition(
        &self,
        submission_id: Uuid,
        expected: Status,
        next: Status,
        reviews: &[ReviewUpsert],
    ) -> Result<Vec<Review>, StoreError>;

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    async fn list_audit_entries(
        &self,
        submission_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert!(MIGRATOR.iter().any(|m| m.description == "initial"));
    }
}
