//! Submission review workflow.
//!
//! - `roles`: role -> capability registry
//! - `status`: the transition table
//! - `authz`: who may decide which stage, and whether as primary or stand-in
//! - `engine`: pure `(submission, request) -> Outcome` functions; the outcome
//!   lists the rows to persist, the audit event and the notifications, and the
//!   caller executes them
//! - `audit`: turns audit events into audit-log entries

pub mod audit;
pub mod authz;
pub mod engine;
pub mod roles;
pub mod status;

pub use audit::{ActionType, AuditEvent};
pub use authz::{Authorization, ReviewKind};
pub use engine::{Notification, Outcome, Pool, ReviewRequest, ReviewUpsert};
pub use roles::{Capability, Role};
pub use status::{next_state, Action, Stage, Status};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The resolved identity a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub institution: String,
}

impl Actor {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.has_capability(capability)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Pending,
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Pending => "pending",
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, ReviewDecision::Pending)
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            ReviewDecision::Pending => None,
            ReviewDecision::Approved => Some(Action::Approve),
            ReviewDecision::Rejected => Some(Action::Reject),
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewDecision::Pending),
            "approved" => Ok(ReviewDecision::Approved),
            "rejected" => Ok(ReviewDecision::Rejected),
            other => Err(format!("unknown review decision: {}", other)),
        }
    }
}
