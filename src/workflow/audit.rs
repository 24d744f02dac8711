//! Audit events and their audit-log representation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authz::ReviewKind;
use super::roles::Role;
use super::status::{Action, Stage, Status};
use super::Actor;
use crate::db::NewAuditEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SubmissionCreated,
    DocumentUploaded,
    SubmissionFinalized,
    ReviewApproved,
    ReviewRejected,
    SubmissionArchived,
    UserCreated,
    RoleChanged,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::SubmissionCreated => "submission_created",
            ActionType::DocumentUploaded => "document_uploaded",
            ActionType::SubmissionFinalized => "submission_finalized",
            ActionType::ReviewApproved => "review_approved",
            ActionType::ReviewRejected => "review_rejected",
            ActionType::SubmissionArchived => "submission_archived",
            ActionType::UserCreated => "user_created",
            ActionType::RoleChanged => "role_changed",
        }
    }
}

/// A review decision attached to a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewContext {
    pub stage: Stage,
    pub kind: ReviewKind,
    pub comments: Option<String>,
}

/// Structured description of one meaningful state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    SubmissionCreated {
        actor: Actor,
        submission_id: Uuid,
        human_code: String,
        resubmission_of: Option<Uuid>,
    },
    DocumentUploaded {
        actor: Actor,
        submission_id: Uuid,
        human_code: String,
        filename: String,
    },
    StatusChanged {
        actor: Actor,
        submission_id: Uuid,
        human_code: String,
        action: Action,
        from: Status,
        to: Status,
        review: Option<ReviewContext>,
    },
    UserCreated {
        actor: Actor,
        target_user_id: Uuid,
        role: Role,
    },
    RoleChanged {
        actor: Actor,
        target_user_id: Uuid,
        old_role: Role,
        new_role: Role,
    },
}

impl AuditEvent {
    pub fn action_type(&self) -> ActionType {
        match self {
            AuditEvent::SubmissionCreated { .. } => ActionType::SubmissionCreated,
            AuditEvent::DocumentUploaded { .. } => ActionType::DocumentUploaded,
            AuditEvent::StatusChanged { action, .. } => match action {
                Action::Finalize => ActionType::SubmissionFinalized,
                Action::Approve => ActionType::ReviewApproved,
                Action::Reject => ActionType::ReviewRejected,
                Action::Archive => ActionType::SubmissionArchived,
            },
            AuditEvent::UserCreated { .. } => ActionType::UserCreated,
            AuditEvent::RoleChanged { .. } => ActionType::RoleChanged,
        }
    }

    fn actor(&self) -> &Actor {
        match self {
            AuditEvent::SubmissionCreated { actor, .. }
            | AuditEvent::DocumentUploaded { actor, .. }
            | AuditEvent::StatusChanged { actor, .. }
            | AuditEvent::UserCreated { actor, .. }
            | AuditEvent::RoleChanged { actor, .. } => actor,
        }
    }
}

/// Format an event as the row the audit log stores.
pub fn to_entry(event: &AuditEvent) -> NewAuditEntry {
    let actor = event.actor();
    let action_type = event.action_type();

    let (action, submission_id, target_user_id, mut details) = match event {
        AuditEvent::SubmissionCreated {
            submission_id,
            human_code,
            resubmission_of,
            ..
        } => (
            format!("Created submission {}", human_code),
            Some(*submission_id),
            None,
            serde_json::json!({
                "human_code": human_code,
                "resubmission_of": resubmission_of,
            }),
        ),
        AuditEvent::DocumentUploaded {
            submission_id,
            human_code,
            filename,
            ..
        } => (
            format!("Uploaded {} to submission {}", filename, human_code),
            Some(*submission_id),
            None,
            serde_json::json!({
                "human_code": human_code,
                "filename": filename,
            }),
        ),
        AuditEvent::StatusChanged {
            submission_id,
            human_code,
            action,
            from,
            to,
            review,
            ..
        } => {
            let mut details = serde_json::json!({
                "human_code": human_code,
                "old_status": from,
                "new_status": to,
            });
            let action = match review {
                Some(review) => {
                    details["stage"] = serde_json::json!(review.stage);
                    details["secondary"] = serde_json::json!(review.kind.is_secondary());
                    details["comments"] = serde_json::json!(review.comments);
                    let verb = if *action == Action::Approve {
                        "Approved"
                    } else {
                        "Rejected"
                    };
                    let capacity = if review.kind.is_secondary() {
                        " (secondary)"
                    } else {
                        ""
                    };
                    format!(
                        "{} submission {} at {} stage{}",
                        verb,
                        human_code,
                        review.stage.as_str().to_uppercase(),
                        capacity
                    )
                }
                None => match action {
                    Action::Finalize => format!("Submitted {} for review", human_code),
                    Action::Archive => format!("Archived submission {}", human_code),
                    other => format!("{} submission {}", other, human_code),
                },
            };
            (action, Some(*submission_id), None, details)
        }
        AuditEvent::UserCreated {
            target_user_id,
            role,
            ..
        } => (
            format!("Created user with role {}", role),
            None,
            Some(*target_user_id),
            serde_json::json!({ "role": role }),
        ),
        AuditEvent::RoleChanged {
            target_user_id,
            old_role,
            new_role,
            ..
        } => (
            format!("Changed role from {} to {}", old_role, new_role),
            None,
            Some(*target_user_id),
            serde_json::json!({
                "old_role": old_role,
                "new_role": new_role,
            }),
        ),
    };

    details["actor_role"] = serde_json::json!(actor.role);

    NewAuditEntry {
        actor_user_id: Some(actor.id),
        action_type,
        action,
        submission_id,
        target_user_id,
        details,
    }
}
