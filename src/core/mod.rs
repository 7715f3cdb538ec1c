mod assumptions;
mod engine;
mod enumeration;
mod error;
mod generator;
mod layout;
mod pipeline;
mod projector;
mod types;

pub use assumptions::{
    Assumptions, EarningsLinkedPension, PENSION_START_AGE, PensionCalculator,
    ProgressiveTaxEstimator, TaxEstimator,
};
pub use engine::{FIRE_MIN_SOLVENT_RATE, composite_score, simulate, simulate_with, validate_profile};
pub use error::PlanError;
pub use generator::{BASELINE_LABEL, CandidateSet, generate_candidates};
pub use layout::{Choice, LayoutConfig, NodeKind, TreeEdge, TreeLayout, TreeNode, layout_tree};
pub use pipeline::{WorldlineReport, evaluate_worldlines, evaluate_worldlines_with};
pub use projector::{
    BranchTemplate, expand_branch, project_profile, remove_branch_events, replace_branch_events,
};
pub use types::{
    Branch, CashFlowYear, Certainty, HORIZON_AGE, HouseholdMode, LifeEvent, LifeEventKind,
    MAX_WORLDLINES, Metrics, Paths, Profile, SavedScenario, Score, ScoreLevel, SimulationConfig,
    SimulationResult, WorldlineCandidate, YearlyPoint,
};
