use crate::ir::{DeoptId, InstId, Representation, ValueId};

/// Fatal optimizer error. Any of these aborts the compilation unit; the
/// driver falls back to the unoptimized graph.
///
/// Declined transformations are not errors: passes report those as `bool`
/// or `Option` outcomes.
#[derive(Debug, thiserror::Error)]
pub enum OptError {
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("instruction {inst:?} can deoptimize but has no environment")]
    MissingEnvironment { inst: InstId },

    #[error("value {value:?} is still used by {user:?} after its producer was removed")]
    DanglingUse { value: ValueId, user: InstId },

    #[error("use list of {value:?} is out of sync: expected {expected} uses, found {found}")]
    UseListMismatch {
        value: ValueId,
        expected: usize,
        found: usize,
    },

    #[error("input {index} of {inst:?} requires {required:?} but {value:?} is {actual:?}")]
    RepresentationMismatch {
        inst: InstId,
        index: usize,
        value: ValueId,
        required: Representation,
        actual: Representation,
    },

    #[error("environment of {inst:?} captures {value:?} in {rep:?} representation")]
    UntaggedEnvironmentSlot {
        inst: InstId,
        value: ValueId,
        rep: Representation,
    },

    #[error("pass {pass} ran before {requires}")]
    PassOrder {
        pass: &'static str,
        requires: &'static str,
    },

    #[error("graph has {count} instructions (limit {limit})")]
    TooManyInstructions { count: usize, limit: usize },

    #[error("optimization disabled after repeated deoptimization at {deopt_id:?}")]
    OptimizationDisabled { deopt_id: DeoptId },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
