use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;
use crate::workflow::{ActionType, Actor, ReviewDecision, Role, Stage, Status};

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub institution: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            institution: self.institution.clone(),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: Role::parse(&row.role),
            full_name: row.full_name,
            institution: row.institution,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution: String,
}

#[derive(Debug, FromRow)]
pub struct SubmissionRow {
    pub id: Uuid,
    pub human_code: String,
    pub title: String,
    pub status: String,
    pub institution: String,
    pub instructor_id: Uuid,
    pub document_filename: Option<String>,
    pub document_path: Option<String>,
    pub resubmission_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub human_code: String,
    pub title: String,
    pub status: Status,
    pub institution: String,
    pub instructor_id: Uuid,
    pub document_filename: Option<String>,
    #[serde(skip_serializing)]
    pub document_path: Option<String>,
    pub resubmission_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn has_document(&self) -> bool {
        self.document_path.is_some()
    }
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<Status>().map_err(StoreError::Corrupt)?;
        Ok(Self {
            id: row.id,
            human_code: row.human_code,
            title: row.title,
            status,
            institution: row.institution,
            instructor_id: row.instructor_id,
            document_filename: row.document_filename,
            document_path: row.document_path,
            resubmission_of: row.resubmission_of,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub human_code: String,
    pub title: String,
    pub institution: String,
    pub instructor_id: Uuid,
    pub resubmission_of: Option<Uuid>,
}

#[derive(Debug, Default, Clone)]
pub struct SubmissionFilter {
    pub instructor_id: Option<Uuid>,
    pub institution: Option<String>,
    pub status: Option<Status>,
}

#[derive(Debug, FromRow)]
pub struct ReviewRow {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub reviewer_role: String,
    pub reviewer_user_id: Option<Uuid>,
    pub decision: String,
    pub comments: Option<String>,
    pub secondary: bool,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One row per (submission, reviewer_role); later decisions overwrite it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub reviewer_role: Stage,
    pub reviewer_user_id: Option<Uuid>,
    pub decision: ReviewDecision,
    pub comments: Option<String>,
    pub secondary: bool,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            submission_id: row.submission_id,
            reviewer_role: row.reviewer_role.parse::<Stage>().map_err(StoreError::Corrupt)?,
            reviewer_user_id: row.reviewer_user_id,
            decision: row.decision.parse::<ReviewDecision>().map_err(StoreError::Corrupt)?,
            comments: row.comments,
            secondary: row.secondary,
            decided_at: row.decided_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action_type: String,
    pub action: String,
    pub submission_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAuditEntry {
    pub actor_user_id: Option<Uuid>,
    pub action_type: ActionType,
    pub action: String,
    pub submission_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub details: serde_json::Value,
}
