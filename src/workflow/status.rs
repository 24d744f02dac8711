//! Submission status graph.
//!
//! Every legal move is a row in [`TRANSITIONS`]; [`next_state`] is the only
//! way to compute a new status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::roles::{Capability, Role};
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Submitted,
    /// Alias of `Submitted` while the PC stage is open.
    PcReview,
    PcApproved,
    PcRejected,
    /// Alias of `PcApproved` while the AMO stage is open.
    AmoReview,
    AmoApproved,
    AmoRejected,
    Archived,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Draft,
        Status::Submitted,
        Status::PcReview,
        Status::PcApproved,
        Status::PcRejected,
        Status::AmoReview,
        Status::AmoApproved,
        Status::AmoRejected,
        Status::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Submitted => "submitted",
            Status::PcReview => "pc_review",
            Status::PcApproved => "pc_approved",
            Status::PcRejected => "pc_rejected",
            Status::AmoReview => "amo_review",
            Status::AmoApproved => "amo_approved",
            Status::AmoRejected => "amo_rejected",
            Status::Archived => "archived",
        }
    }

    /// Collapse the review aliases onto the state they stand for.
    pub fn canonical(self) -> Status {
        match self {
            Status::PcReview => Status::Submitted,
            Status::AmoReview => Status::PcApproved,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Archived | Status::PcRejected | Status::AmoRejected
        )
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, Status::PcRejected | Status::AmoRejected)
    }

    /// The review stage currently open, if any.
    pub fn open_stage(self) -> Option<Stage> {
        match self.canonical() {
            Status::Submitted => Some(Stage::Pc),
            Status::PcApproved => Some(Stage::Amo),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown submission status: {}", s))
    }
}

/// One of the two sequential review checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pc,
    Amo,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pc => "pc",
            Stage::Amo => "amo",
        }
    }

    pub fn primary_capability(&self) -> Capability {
        match self {
            Stage::Pc => Capability::ReviewAsPc,
            Stage::Amo => Capability::ReviewAsAmo,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Pc => Some(Stage::Amo),
            Stage::Amo => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pc" => Ok(Stage::Pc),
            "amo" => Ok(Stage::Amo),
            other => Err(format!("unknown review stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Finalize,
    Approve,
    Reject,
    Archive,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Finalize,
        Action::Approve,
        Action::Reject,
        Action::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Finalize => "finalize",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Archive => "archive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an actor must hold to take an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Capability(Capability),
    /// Primary reviewer for the stage, or a role allowed to stand in for it.
    Review(Stage),
}

impl Requirement {
    pub fn satisfied_by(&self, role: Role) -> bool {
        match self {
            Requirement::Capability(capability) => role.has_capability(*capability),
            Requirement::Review(stage) => role.can_review_stage(*stage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Status,
    pub action: Action,
    pub requires: Requirement,
    pub to: Status,
}

pub const TRANSITIONS: [Transition; 6] = [
    Transition {
        from: Status::Draft,
        action: Action::Finalize,
        requires: Requirement::Capability(Capability::Submit),
        to: Status::Submitted,
    },
    Transition {
        from: Status::Submitted,
        action: Action::Approve,
        requires: Requirement::Review(Stage::Pc),
        to: Status::PcApproved,
    },
    Transition {
        from: Status::Submitted,
        action: Action::Reject,
        requires: Requirement::Review(Stage::Pc),
        to: Status::PcRejected,
    },
    Transition {
        from: Status::PcApproved,
        action: Action::Approve,
        requires: Requirement::Review(Stage::Amo),
        to: Status::AmoApproved,
    },
    Transition {
        from: Status::PcApproved,
        action: Action::Reject,
        requires: Requirement::Review(Stage::Amo),
        to: Status::AmoRejected,
    },
    Transition {
        from: Status::AmoApproved,
        action: Action::Archive,
        requires: Requirement::Capability(Capability::Archive),
        to: Status::Archived,
    },
];

/// Look up the table row for `(current, action)`, ignoring the actor.
pub fn find_transition(current: Status, action: Action) -> Option<&'static Transition> {
    let current = current.canonical();
    TRANSITIONS
        .iter()
        .find(|t| t.from == current && t.action == action)
}

pub fn next_state(current: Status, action: Action, actor: Role) -> Result<Status, WorkflowError> {
    match find_transition(current, action) {
        Some(t) if t.requires.satisfied_by(actor) => Ok(t.to),
        _ => Err(WorkflowError::InvalidTransition {
            from: current,
            action,
        }),
    }
}
