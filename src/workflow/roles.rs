//! Role registry: the single source of truth for role -> capability lookups.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::Stage;

/// Roles stored on a user profile.
///
/// Only the canonical spellings are recognised. Anything else (including the
/// `admin`/`im` spellings) parses to [`Role::Unknown`] and holds no capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Instructor,
    SeniorInstructor,
    Pc,
    Amo,
    InstitutionManager,
    Records,
    #[serde(alias = "administrator")]
    HeadOfPrograms,
    Registration,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Submit,
    ReviewAsPc,
    ReviewAsAmo,
    SecondaryReview,
    Archive,
    ManageUsers,
    ViewAllInstitutions,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Instructor,
        Role::SeniorInstructor,
        Role::Pc,
        Role::Amo,
        Role::InstitutionManager,
        Role::Records,
        Role::HeadOfPrograms,
        Role::Registration,
    ];

    pub fn parse(s: &str) -> Role {
        match s.trim() {
            "instructor" => Role::Instructor,
            "senior_instructor" => Role::SeniorInstructor,
            "pc" => Role::Pc,
            "amo" => Role::Amo,
            "institution_manager" => Role::InstitutionManager,
            "records" => Role::Records,
            "head_of_programs" | "administrator" => Role::HeadOfPrograms,
            "registration" => Role::Registration,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Instructor => "instructor",
            Role::SeniorInstructor => "senior_instructor",
            Role::Pc => "pc",
            Role::Amo => "amo",
            Role::InstitutionManager => "institution_manager",
            Role::Records => "records",
            Role::HeadOfPrograms => "head_of_programs",
            Role::Registration => "registration",
            Role::Unknown => "unknown",
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Instructor => matches!(capability, Submit),
            Role::SeniorInstructor => matches!(capability, Submit | SecondaryReview),
            Role::Pc => matches!(capability, ReviewAsPc),
            Role::Amo => matches!(capability, ReviewAsAmo),
            Role::InstitutionManager => matches!(capability, SecondaryReview),
            Role::Records => matches!(capability, Archive | ViewAllInstitutions),
            Role::HeadOfPrograms => {
                matches!(capability, SecondaryReview | ManageUsers | ViewAllInstitutions)
            }
            Role::Registration => matches!(capability, ViewAllInstitutions),
            Role::Unknown => false,
        }
    }

    /// Primary reviewer for `stage`.
    pub fn is_primary_for(&self, stage: Stage) -> bool {
        self.has_capability(stage.primary_capability())
    }

    /// Secondary approval is narrower for senior instructors: PC stage only.
    pub fn can_stand_in_for(&self, stage: Stage) -> bool {
        if !self.has_capability(Capability::SecondaryReview) {
            return false;
        }
        match self {
            Role::SeniorInstructor => stage == Stage::Pc,
            _ => true,
        }
    }

    /// Whether this role can decide `stage` at all, as primary or stand-in.
    pub fn can_review_stage(&self, stage: Stage) -> bool {
        self.is_primary_for(stage) || self.can_stand_in_for(stage)
    }

    pub fn reviews_any_stage(&self) -> bool {
        self.can_review_stage(Stage::Pc) || self.can_review_stage(Stage::Amo)
    }

    /// Roles forming the work pool notified when a submission reaches `stage`.
    pub fn primary_pool(stage: Stage) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| role.is_primary_for(stage))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
