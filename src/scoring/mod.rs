pub mod engine;

pub use engine::{
    score_repository, AttributeContribution, RunError, ScoreBreakdown, ScoreError, ScoreResult,
    Scorer, SkipReason, SkippedAttribute,
};
