use async_trait::async_trait;
use uuid::Uuid;

use super::{
    AuditEntry, DbPool, NewAuditEntry, NewSubmission, NewUser, Review, ReviewRow, Store,
    Submission, SubmissionFilter, SubmissionRow, User, UserRow,
};
use crate::error::StoreError;
use crate::workflow::{ReviewUpsert, Role, Status};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM profiles WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM profiles ORDER BY full_name")
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_users_by_roles(
        &self,
        roles: &[Role],
        institution: Option<&str>,
    ) -> Result<Vec<User>, StoreError> {
        let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT * FROM profiles
            WHERE role = ANY($1)
              AND ($2::text IS NULL OR institution = $2)
            ORDER BY full_name
            "#,
        )
        .bind(&roles)
        .bind(institution)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO profiles (id, email, full_name, role, institution)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&user.institution)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(e),
        })?;
        Ok(row.into())
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE profiles SET role = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            INSERT INTO submissions (id, human_code, title, status, institution, instructor_id, resubmission_of)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&submission.human_code)
        .bind(&submission.title)
        .bind(Status::Draft.as_str())
        .bind(&submission.institution)
        .bind(submission.instructor_id)
        .bind(submission.resubmission_of)
        .fetch_one(self.pool.as_ref())
        .await?;
        row.try_into()
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        sqlx::query_as::<_, SubmissionRow>("SELECT * FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Submission::try_from)
            .transpose()
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT * FROM submissions
            WHERE ($1::uuid IS NULL OR instructor_id = $1)
              AND ($2::text IS NULL OR institution = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY updated_at DESC
            "#,
        )
        .bind(filter.instructor_id)
        .bind(filter.institution.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.into_iter().map(Submission::try_from).collect()
    }

    async fn attach_document(
        &self,
        id: Uuid,
        filename: &str,
        path: &str,
    ) -> Result<Submission, StoreError> {
        sqlx::query_as::<_, SubmissionRow>(
            r#"
            UPDATE submissions
            SET document_filename = $2, document_path = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(filename)
        .bind(path)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    async fn list_reviews(&self, submission_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE submission_id = $1 ORDER BY reviewer_role DESC",
        )
        .bind(submission_id)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.into_iter().map(Review::try_from).collect()
    }

    async fn commit_transition(
        &self,
        submission_id: Uuid,
        expected: Status,
        next: Status,
        reviews: &[ReviewUpsert],
    ) -> Result<Vec<Review>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE submissions SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(submission_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict);
        }

        let mut stored = Vec::with_capacity(reviews.len());
        for review in reviews {
            let row = sqlx::query_as::<_, ReviewRow>(
                r#"
                INSERT INTO reviews (id, submission_id, reviewer_role, reviewer_user_id, decision, comments, secondary, decided_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (submission_id, reviewer_role) DO UPDATE
                SET reviewer_user_id = EXCLUDED.reviewer_user_id,
                    decision = EXCLUDED.decision,
                    comments = EXCLUDED.comments,
                    secondary = EXCLUDED.secondary,
                    decided_at = EXCLUDED.decided_at
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(submission_id)
            .bind(review.stage.as_str())
            .bind(review.reviewer_user_id)
            .bind(review.decision.as_str())
            .bind(&review.comments)
            .bind(review.secondary)
            .bind(review.decided_at)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(Review::try_from(row)?);
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let row = sqlx::query_as::<_, AuditEntry>(
            r#"
            INSERT INTO audit_logs (id, actor_user_id, action_type, action, submission_id, target_user_id, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_user_id)
        .bind(entry.action_type.as_str())
        .bind(&entry.action)
        .bind(entry.submission_id)
        .bind(entry.target_user_id)
        .bind(&entry.details)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(row)
    }

    async fn list_audit_entries(
        &self,
        submission_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::uuid IS NULL OR submission_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(submission_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows)
    }
}
