//! Applying workflow actions.
//!
//! Every function here is pure: it validates the request against the current
//! submission and returns an [`Outcome`] describing what the caller must do.
//! The caller persists `to` together with `reviews` in one transaction, then
//! appends the audit entry and sends the notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::audit::{AuditEvent, ReviewContext};
use super::authz::{self, ReviewKind};
use super::roles::{Capability, Role};
use super::status::{next_state, Action, Stage, Status};
use super::{Actor, ReviewDecision};
use crate::db::{Review, Submission};
use crate::error::WorkflowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub stage: Stage,
    pub decision: ReviewDecision,
    pub comments: String,
}

/// A review row to upsert on (submission, reviewer_role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewUpsert {
    pub stage: Stage,
    pub reviewer_user_id: Option<Uuid>,
    pub decision: ReviewDecision,
    pub comments: Option<String>,
    pub secondary: bool,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReviewUpsert {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            reviewer_user_id: None,
            decision: ReviewDecision::Pending,
            comments: None,
            secondary: false,
            decided_at: None,
        }
    }
}

/// Who receives a work-item notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Review(Stage),
    Archive,
}

impl Pool {
    pub fn roles(&self) -> Vec<Role> {
        match self {
            Pool::Review(stage) => Role::primary_pool(*stage),
            Pool::Archive => Role::ALL
                .into_iter()
                .filter(|r| r.has_capability(Capability::Archive))
                .collect(),
        }
    }

    /// Pools whose members work across institutions.
    pub fn is_global(&self) -> bool {
        self.roles()
            .iter()
            .all(|r| r.has_capability(Capability::ViewAllInstitutions))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Sent to the instructor on every review decision.
    ReviewDecision {
        instructor_id: Uuid,
        submission_id: Uuid,
        human_code: String,
        title: String,
        stage: Stage,
        decision: ReviewDecision,
        reviewer_role: Role,
        comments: Option<String>,
    },
    /// The submission has entered a pool's queue.
    WorkItem {
        pool: Pool,
        institution: String,
        submission_id: Uuid,
        human_code: String,
        title: String,
    },
    Archived {
        instructor_id: Uuid,
        submission_id: Uuid,
        human_code: String,
        title: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub submission_id: Uuid,
    pub from: Status,
    pub to: Status,
    pub reviews: Vec<ReviewUpsert>,
    pub audit: AuditEvent,
    pub notifications: Vec<Notification>,
}

fn work_item(pool: Pool, submission: &Submission) -> Notification {
    Notification::WorkItem {
        pool,
        institution: submission.institution.clone(),
        submission_id: submission.id,
        human_code: submission.human_code.clone(),
        title: submission.title.clone(),
    }
}

/// Apply an approve/reject decision for `request.stage`.
pub fn apply_review(
    submission: &Submission,
    existing: &[Review],
    request: &ReviewRequest,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let from = submission.status;
    let action = request.decision.action().ok_or(WorkflowError::InvalidTransition {
        from,
        action: Action::Approve,
    })?;

    let comments = request.comments.trim();
    if action == Action::Reject && comments.is_empty() {
        return Err(WorkflowError::MissingReason);
    }

    if from.open_stage() != Some(request.stage) {
        return Err(WorkflowError::InvalidTransition { from, action });
    }

    let auth = authz::resolve(from, action, actor.role, existing)?;
    // A stand-in never decides their own submission.
    if auth.kind == ReviewKind::Secondary && actor.id == submission.instructor_id {
        return Err(WorkflowError::Unauthorized);
    }
    let to = next_state(from, action, actor.role)?;

    let comments = (!comments.is_empty()).then(|| comments.to_string());
    let mut reviews = vec![ReviewUpsert {
        stage: auth.stage,
        reviewer_user_id: Some(actor.id),
        decision: request.decision,
        comments: comments.clone(),
        secondary: auth.kind == ReviewKind::Secondary,
        decided_at: Some(now),
    }];

    let mut notifications = vec![Notification::ReviewDecision {
        instructor_id: submission.instructor_id,
        submission_id: submission.id,
        human_code: submission.human_code.clone(),
        title: submission.title.clone(),
        stage: auth.stage,
        decision: request.decision,
        reviewer_role: actor.role,
        comments: comments.clone(),
    }];

    if action == Action::Approve {
        match auth.stage.next() {
            Some(next) => {
                reviews.push(ReviewUpsert::pending(next));
                notifications.push(work_item(Pool::Review(next), submission));
            }
            None => notifications.push(work_item(Pool::Archive, submission)),
        }
    }

    Ok(Outcome {
        submission_id: submission.id,
        from,
        to,
        reviews,
        audit: AuditEvent::StatusChanged {
            actor: actor.clone(),
            submission_id: submission.id,
            human_code: submission.human_code.clone(),
            action,
            from,
            to,
            review: Some(ReviewContext {
                stage: auth.stage,
                kind: auth.kind,
                comments,
            }),
        },
        notifications,
    })
}

/// Move a draft into the PC queue.
pub fn finalize(submission: &Submission, actor: &Actor) -> Result<Outcome, WorkflowError> {
    if actor.id != submission.instructor_id {
        return Err(WorkflowError::NotOwner);
    }
    let from = submission.status;
    let to = next_state(from, Action::Finalize, actor.role)?;
    if !submission.has_document() {
        return Err(WorkflowError::MissingDocument);
    }

    Ok(Outcome {
        submission_id: submission.id,
        from,
        to,
        reviews: vec![ReviewUpsert::pending(Stage::Pc)],
        audit: AuditEvent::StatusChanged {
            actor: actor.clone(),
            submission_id: submission.id,
            human_code: submission.human_code.clone(),
            action: Action::Finalize,
            from,
            to,
            review: None,
        },
        notifications: vec![work_item(Pool::Review(Stage::Pc), submission)],
    })
}

pub fn archive(submission: &Submission, actor: &Actor) -> Result<Outcome, WorkflowError> {
    if !actor.can(Capability::Archive) {
        return Err(WorkflowError::Unauthorized);
    }
    let from = submission.status;
    let to = next_state(from, Action::Archive, actor.role)?;

    Ok(Outcome {
        submission_id: submission.id,
        from,
        to,
        reviews: Vec::new(),
        audit: AuditEvent::StatusChanged {
            actor: actor.clone(),
            submission_id: submission.id,
            human_code: submission.human_code.clone(),
            action: Action::Archive,
            from,
            to,
            review: None,
        },
        notifications: vec![Notification::Archived {
            instructor_id: submission.instructor_id,
            submission_id: submission.id,
            human_code: submission.human_code.clone(),
            title: submission.title.clone(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::audit::to_entry;
    use crate::workflow::authz::tests::review;
    use crate::workflow::ActionType;

    const INSTITUTION: &str = "North Campus";

    fn actor(role: Role) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role,
            institution: INSTITUTION.into(),
        }
    }

    fn submission(status: Status, instructor: &Actor) -> Submission {
        let now = Utc::now();
        Submission {
            id: Uuid::new_v4(),
            human_code: "TD-20260101-0a1b2c3d".into(),
            title: "Midterm: Linear Algebra".into(),
            status,
            institution: INSTITUTION.into(),
            instructor_id: instructor.id,
            document_filename: Some("midterm.pdf".into()),
            document_path: Some("uploads/midterm.pdf".into()),
            resubmission_of: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(stage: Stage, decision: ReviewDecision, comments: &str) -> ReviewRequest {
        ReviewRequest {
            stage,
            decision,
            comments: comments.into(),
        }
    }

    #[test]
    fn finalize_with_document_submits() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Draft, &instructor);

        let outcome = finalize(&sub, &instructor).unwrap();

        assert_eq!(outcome.to, Status::Submitted);
        assert_eq!(outcome.reviews, vec![ReviewUpsert::pending(Stage::Pc)]);
        assert_eq!(
            to_entry(&outcome.audit).action_type,
            ActionType::SubmissionFinalized
        );
        assert!(matches!(
            outcome.notifications.as_slice(),
            [Notification::WorkItem {
                pool: Pool::Review(Stage::Pc),
                ..
            }]
        ));
    }

    #[test]
    fn finalize_requires_document_and_owner() {
        let instructor = actor(Role::Instructor);
        let mut sub = submission(Status::Draft, &instructor);
        sub.document_path = None;
        assert_eq!(
            finalize(&sub, &instructor).unwrap_err(),
            WorkflowError::MissingDocument
        );

        let other = actor(Role::Instructor);
        assert_eq!(finalize(&sub, &other).unwrap_err(), WorkflowError::NotOwner);
    }

    #[test]
    fn finalize_twice_is_invalid() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        assert!(matches!(
            finalize(&sub, &instructor).unwrap_err(),
            WorkflowError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn pc_approval_without_comment() {
        let instructor = actor(Role::Instructor);
        let pc = actor(Role::Pc);
        let sub = submission(Status::Submitted, &instructor);

        let outcome = apply_review(
            &sub,
            &[review(Stage::Pc, ReviewDecision::Pending, 0)],
            &request(Stage::Pc, ReviewDecision::Approved, ""),
            &pc,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.to, Status::PcApproved);
        let entry = to_entry(&outcome.audit);
        assert_eq!(entry.action_type, ActionType::ReviewApproved);
        assert_eq!(entry.details["stage"], "pc");
        assert_eq!(entry.details["secondary"], false);

        assert_eq!(outcome.reviews.len(), 2);
        assert_eq!(outcome.reviews[0].decision, ReviewDecision::Approved);
        assert_eq!(outcome.reviews[0].reviewer_user_id, Some(pc.id));
        assert_eq!(outcome.reviews[0].comments, None);
        assert_eq!(outcome.reviews[1], ReviewUpsert::pending(Stage::Amo));

        assert!(outcome.notifications.iter().any(|n| matches!(
            n,
            Notification::ReviewDecision { instructor_id, .. } if *instructor_id == instructor.id
        )));
        assert!(outcome.notifications.iter().any(|n| matches!(
            n,
            Notification::WorkItem {
                pool: Pool::Review(Stage::Amo),
                ..
            }
        )));
    }

    #[test]
    fn rejection_requires_reason() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        for comments in ["", "   "] {
            let err = apply_review(
                &sub,
                &[],
                &request(Stage::Pc, ReviewDecision::Rejected, comments),
                &actor(Role::Pc),
                Utc::now(),
            )
            .unwrap_err();
            assert_eq!(err, WorkflowError::MissingReason);
        }
    }

    #[test]
    fn rejection_with_reason_is_terminal_and_only_notifies_instructor() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        let outcome = apply_review(
            &sub,
            &[],
            &request(Stage::Pc, ReviewDecision::Rejected, "Question 4 is ambiguous"),
            &actor(Role::Pc),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.to, Status::PcRejected);
        assert!(outcome.to.is_terminal());
        assert_eq!(outcome.reviews.len(), 1);
        assert_eq!(
            outcome.reviews[0].comments.as_deref(),
            Some("Question 4 is ambiguous")
        );
        assert_eq!(outcome.notifications.len(), 1);
    }

    #[test]
    fn amo_stage_gated_on_pc_approval() {
        let instructor = actor(Role::Instructor);
        for status in [Status::Draft, Status::Submitted, Status::AmoApproved] {
            let sub = submission(status, &instructor);
            for role in [Role::Amo, Role::HeadOfPrograms, Role::Instructor] {
                let err = apply_review(
                    &sub,
                    &[],
                    &request(Stage::Amo, ReviewDecision::Approved, ""),
                    &actor(role),
                    Utc::now(),
                )
                .unwrap_err();
                assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn amo_approval_then_archive() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::PcApproved, &instructor);

        let outcome = apply_review(
            &sub,
            &[review(Stage::Pc, ReviewDecision::Approved, 60)],
            &request(Stage::Amo, ReviewDecision::Approved, "Good to go"),
            &actor(Role::Amo),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome.to, Status::AmoApproved);
        assert!(outcome.notifications.iter().any(|n| matches!(
            n,
            Notification::WorkItem {
                pool: Pool::Archive,
                ..
            }
        )));

        let mut approved = sub.clone();
        approved.status = outcome.to;
        let archived = archive(&approved, &actor(Role::Records)).unwrap();
        assert_eq!(archived.to, Status::Archived);
        assert!(archived.to.is_terminal());
        assert_eq!(
            to_entry(&archived.audit).action_type,
            ActionType::SubmissionArchived
        );
    }

    #[test]
    fn archive_requires_records_role_and_amo_approval() {
        let instructor = actor(Role::Instructor);
        let approved = submission(Status::AmoApproved, &instructor);
        assert_eq!(
            archive(&approved, &actor(Role::HeadOfPrograms)).unwrap_err(),
            WorkflowError::Unauthorized
        );
        let pending = submission(Status::PcApproved, &instructor);
        assert!(matches!(
            archive(&pending, &actor(Role::Records)).unwrap_err(),
            WorkflowError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn senior_instructor_secondary_approval() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        let senior = actor(Role::SeniorInstructor);

        let outcome = apply_review(
            &sub,
            &[],
            &request(Stage::Pc, ReviewDecision::Approved, ""),
            &senior,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.to, Status::PcApproved);
        assert!(outcome.reviews[0].secondary);
        assert_eq!(to_entry(&outcome.audit).details["secondary"], true);
    }

    #[test]
    fn senior_instructor_cannot_stand_in_on_own_submission() {
        let senior = actor(Role::SeniorInstructor);
        let sub = submission(Status::Submitted, &senior);

        let err = apply_review(
            &sub,
            &[review(Stage::Pc, ReviewDecision::Pending, 0)],
            &request(Stage::Pc, ReviewDecision::Approved, ""),
            &senior,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Unauthorized);

        let colleague = actor(Role::SeniorInstructor);
        assert!(apply_review(
            &sub,
            &[],
            &request(Stage::Pc, ReviewDecision::Approved, ""),
            &colleague,
            Utc::now(),
        )
        .is_ok());
    }

    #[test]
    fn second_pc_decision_is_refused_once_status_moved() {
        let instructor = actor(Role::Instructor);
        let pc = actor(Role::Pc);
        for status in [Status::PcApproved, Status::PcRejected] {
            let sub = submission(status, &instructor);
            let err = apply_review(
                &sub,
                &[review(Stage::Pc, ReviewDecision::Approved, 5)],
                &request(Stage::Pc, ReviewDecision::Rejected, "Changed my mind"),
                &pc,
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn secondary_blocked_after_primary_decided() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        let existing = [review(Stage::Pc, ReviewDecision::Approved, 5)];

        let err = apply_review(
            &sub,
            &existing,
            &request(Stage::Pc, ReviewDecision::Approved, ""),
            &actor(Role::InstitutionManager),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Unauthorized);
    }

    #[test]
    fn pending_decision_is_not_an_action() {
        let instructor = actor(Role::Instructor);
        let sub = submission(Status::Submitted, &instructor);
        let err = apply_review(
            &sub,
            &[],
            &request(Stage::Pc, ReviewDecision::Pending, ""),
            &actor(Role::Pc),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn archive_pool_is_global() {
        assert!(Pool::Archive.is_global());
        assert!(!Pool::Review(Stage::Pc).is_global());
    }
}
