//! In-memory [`Store`] for development mode and tests.
//!
//! Everything is lost on restart. A single write lock covers the status
//! compare-and-set and the review upserts, which gives the same atomicity
//! the Postgres transaction provides.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuditEntry, NewAuditEntry, NewSubmission, NewUser, Review, Store, Submission,
    SubmissionFilter, User,
};
use crate::error::StoreError;
use crate::workflow::{ReviewUpsert, Role, Stage, Status};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    submissions: HashMap<Uuid, Submission>,
    reviews: HashMap<(Uuid, Stage), Review>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    async fn list_users_by_roles(
        &self,
        roles: &[Role],
        institution: Option<&str>,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .filter(|u| roles.contains(&u.role))
            .filter(|u| institution.map_or(true, |i| u.institution == i))
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            institution: user.institution,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.role = role;
        Ok(user.clone())
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            human_code: submission.human_code,
            title: submission.title,
            status: Status::Draft,
            institution: submission.institution,
            instructor_id: submission.instructor_id,
            document_filename: None,
            document_path: None,
            resubmission_of: submission.resubmission_of,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .submissions
            .insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| filter.instructor_id.map_or(true, |id| s.instructor_id == id))
            .filter(|s| {
                filter
                    .institution
                    .as_deref()
                    .map_or(true, |i| s.institution == i)
            })
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        submissions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(submissions)
    }

    async fn attach_document(
        &self,
        id: Uuid,
        filename: &str,
        path: &str,
    ) -> Result<Submission, StoreError> {
        let mut tables = self.tables.write().await;
        let submission = tables.submissions.get_mut(&id).ok_or(StoreError::NotFound)?;
        submission.document_filename = Some(filename.to_string());
        submission.document_path = Some(path.to_string());
        submission.updated_at = Utc::now();
        Ok(submission.clone())
    }

    async fn list_reviews(&self, submission_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.reviewer_role);
        Ok(reviews)
    }

    async fn commit_transition(
        &self,
        submission_id: Uuid,
        expected: Status,
        next: Status,
        reviews: &[ReviewUpsert],
    ) -> Result<Vec<Review>, StoreError> {
        let mut tables = self.tables.write().await;
        let submission = tables
            .submissions
            .get_mut(&submission_id)
            .ok_or(StoreError::NotFound)?;
        if submission.status != expected {
            return Err(StoreError::Conflict);
        }
        submission.status = next;
        submission.updated_at = Utc::now();

        let mut stored = Vec::with_capacity(reviews.len());
        for upsert in reviews {
            let key = (submission_id, upsert.stage);
            let review = match tables.reviews.get(&key) {
                Some(existing) => Review {
                    reviewer_user_id: upsert.reviewer_user_id,
                    decision: upsert.decision,
                    comments: upsert.comments.clone(),
                    secondary: upsert.secondary,
                    decided_at: upsert.decided_at,
                    ..existing.clone()
                },
                None => Review {
                    id: Uuid::new_v4(),
                    submission_id,
                    reviewer_role: upsert.stage,
                    reviewer_user_id: upsert.reviewer_user_id,
                    decision: upsert.decision,
                    comments: upsert.comments.clone(),
                    secondary: upsert.secondary,
                    decided_at: upsert.decided_at,
                    created_at: Utc::now(),
                },
            };
            tables.reviews.insert(key, review.clone());
            stored.push(review);
        }
        Ok(stored)
    }

    async fn append_audit_entry(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor_user_id: entry.actor_user_id,
            action_type: entry.action_type.as_str().to_string(),
            action: entry.action,
            submission_id: entry.submission_id,
            target_user_id: entry.target_user_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.tables.write().await.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit_entries(
        &self,
        submission_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|e| submission_id.map_or(true, |id| e.submission_id == Some(id)))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::ReviewDecision;

    async fn seeded() -> (MemoryStore, Submission) {
        let store = MemoryStore::new();
        let instructor = store
            .create_user(NewUser {
                email: "ada@example.edu".into(),
                full_name: "Ada".into(),
                role: Role::Instructor,
                institution: "North Campus".into(),
            })
            .await
            .unwrap();
        let submission = store
            .create_submission(NewSubmission {
                human_code: "TD-20260101-00000001".into(),
                title: "Quiz 1".into(),
                institution: instructor.institution.clone(),
                instructor_id: instructor.id,
                resubmission_of: None,
            })
            .await
            .unwrap();
        (store, submission)
    }

    fn decided(stage: Stage, decision: ReviewDecision, reviewer: Uuid) -> ReviewUpsert {
        ReviewUpsert {
            stage,
            reviewer_user_id: Some(reviewer),
            decision,
            comments: Some("noted".into()),
            secondary: false,
            decided_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_new_submission_is_draft() {
        let (store, submission) = seeded().await;
        assert_eq!(submission.status, Status::Draft);
        let fetched = store.get_submission(submission.id).await.unwrap().unwrap();
        assert_eq!(fetched.human_code, submission.human_code);
    }

    #[tokio::test]
    async fn test_commit_transition_rejects_stale_status() {
        let (store, submission) = seeded().await;
        let err = store
            .commit_transition(submission.id, Status::Submitted, Status::PcApproved, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let fetched = store.get_submission(submission.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Draft);
        assert!(store.list_reviews(submission.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decision_overwrites_seeded_pending_row() {
        let (store, submission) = seeded().await;
        let reviewer = Uuid::new_v4();

        let seeded_rows = store
            .commit_transition(
                submission.id,
                Status::Draft,
                Status::Submitted,
                &[ReviewUpsert {
                    stage: Stage::Pc,
                    reviewer_user_id: None,
                    decision: ReviewDecision::Pending,
                    comments: None,
                    secondary: false,
                    decided_at: None,
                }],
            )
            .await
            .unwrap();
        let decided_rows = store
            .commit_transition(
                submission.id,
                Status::Submitted,
                Status::PcApproved,
                &[decided(Stage::Pc, ReviewDecision::Approved, reviewer)],
            )
            .await
            .unwrap();

        assert_eq!(seeded_rows[0].id, decided_rows[0].id);
        assert_eq!(seeded_rows[0].created_at, decided_rows[0].created_at);
        let reviews = store.list_reviews(submission.id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].decision, ReviewDecision::Approved);
        assert_eq!(reviews[0].reviewer_user_id, Some(reviewer));
    }

    #[tokio::test]
    async fn test_list_submissions_filters() {
        let (store, submission) = seeded().await;
        let mine = SubmissionFilter {
            instructor_id: Some(submission.instructor_id),
            ..Default::default()
        };
        assert_eq!(store.list_submissions(&mine).await.unwrap().len(), 1);

        let elsewhere = SubmissionFilter {
            institution: Some("South Campus".into()),
            ..Default::default()
        };
        assert!(store.list_submissions(&elsewhere).await.unwrap().is_empty());

        let submitted = SubmissionFilter {
            status: Some(Status::Submitted),
            ..Default::default()
        };
        assert!(store.list_submissions(&submitted).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (store, _) = seeded().await;
        let err = store
            .create_user(NewUser {
                email: "ADA@example.edu".into(),
                full_name: "Ada Again".into(),
                role: Role::Pc,
                institution: "North Campus".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_audit_entries_newest_first() {
        let (store, submission) = seeded().await;
        for action in ["first", "second", "third"] {
            store
                .append_audit_entry(NewAuditEntry {
                    actor_user_id: None,
                    action_type: crate::workflow::ActionType::DocumentUploaded,
                    action: action.into(),
                    submission_id: Some(submission.id),
                    target_user_id: None,
                    details: serde_json::json!({}),
                })
                .await
                .unwrap();
        }
        let entries = store
            .list_audit_entries(Some(submission.id), 2)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "third");
        assert!(store
            .list_audit_entries(Some(Uuid::new_v4()), 10)
            .await
            .unwrap()
            .is_empty());
    }
}
