//! Review authorization: who may decide the open stage, and in what capacity.

use serde::{Deserialize, Serialize};

use super::roles::{Capability, Role};
use super::status::{Action, Stage, Status};
use super::Actor;
use crate::db::{Review, Submission};
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// The role formally assigned to the stage.
    Primary,
    /// A stand-in acting while the primary decision is outstanding.
    Secondary,
}

impl ReviewKind {
    pub fn is_secondary(&self) -> bool {
        matches!(self, ReviewKind::Secondary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub stage: Stage,
    pub kind: ReviewKind,
}

/// Decide whether `actor_role` may act on the stage opened by `status`.
///
/// Primary reviewers are always allowed, so they can revise their own row.
/// Stand-ins are allowed only while the stage has no decided review.
pub fn resolve(
    status: Status,
    action: Action,
    actor_role: Role,
    existing: &[Review],
) -> Result<Authorization, WorkflowError> {
    let stage = status
        .open_stage()
        .ok_or(WorkflowError::InvalidTransition {
            from: status,
            action,
        })?;

    if actor_role.is_primary_for(stage) {
        return Ok(Authorization {
            stage,
            kind: ReviewKind::Primary,
        });
    }

    if actor_role.can_stand_in_for(stage) && !stage_decided(existing, stage) {
        return Ok(Authorization {
            stage,
            kind: ReviewKind::Secondary,
        });
    }

    Err(WorkflowError::Unauthorized)
}

fn stage_decided(existing: &[Review], stage: Stage) -> bool {
    existing
        .iter()
        .any(|r| r.reviewer_role == stage && r.decision.is_decided())
}

/// The review that governs what a submission displays.
///
/// The AMO stage outranks PC; within a stage the most recent decision wins.
pub fn governing_review(reviews: &[Review]) -> Option<&Review> {
    reviews
        .iter()
        .filter(|r| r.decision.is_decided())
        .max_by_key(|r| (r.reviewer_role, r.decided_at))
}

/// Whether `actor` may see `submission` at all.
pub fn can_view(actor: &Actor, submission: &Submission) -> bool {
    if actor.can(Capability::ViewAllInstitutions) || actor.id == submission.instructor_id {
        return true;
    }
    actor.role.reviews_any_stage() && actor.institution == submission.institution
}
