use thiserror::Error;

/// Errors raised while generating, projecting or simulating worldlines.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    /// The simulation horizon is age 100, so the profile must start below it.
    #[error("current age {0} must be below the simulation horizon of 100")]
    AgeAtHorizon(u32),
    #[error("trial count must be greater than zero")]
    ZeroTrials,
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    /// A branch names a template the projector cannot resolve.
    #[error("branch {branch_id} references unknown template {template:?}")]
    UnknownTemplate { branch_id: String, template: String },
    #[error("branch {0} has no event templates")]
    EmptyBranch(String),
    #[error("branch id {0} is selected more than once")]
    DuplicateBranch(String),
    /// Bitmask enumeration is limited to 63 uncertain branches.
    #[error("{0} uncertain branches exceed the supported maximum of 63")]
    TooManyBranches(usize),
    #[error("worldline #{index} ({label}) failed: {source}")]
    CandidateFailed {
        index: usize,
        label: String,
        #[source]
        source: Box<PlanError>,
    },
}

impl PlanError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PlanError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
