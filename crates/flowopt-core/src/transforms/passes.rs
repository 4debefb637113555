//! One `Transform` per optimizer entry point.

use crate::error::OptError;
use crate::optimizer::FlowGraphOptimizer;
use crate::pipeline::{Transform, TransformResult};

/// Attach stored or empty feedback to every call.
pub struct PopulateIcData;

impl Transform for PopulateIcData {
    fn name(&self) -> &'static str {
        "populate-ic-data"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        Ok(TransformResult::changed(opt.populate_with_ic_data()))
    }
}

/// Rewrite calls according to their feedback.
pub struct ApplyIcData;

impl Transform for ApplyIcData {
    fn name(&self) -> &'static str {
        "apply-ic-data"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.apply_ic_data().map(TransformResult::changed)
    }
}

/// Specialize on statically known classes and drop proven checks.
pub struct ApplyClassIds;

impl Transform for ApplyClassIds {
    fn name(&self) -> &'static str {
        "apply-class-ids"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.apply_class_ids().map(TransformResult::changed)
    }
}

pub struct Canonicalize;

impl Transform for Canonicalize {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.canonicalize().map(TransformResult::changed)
    }
}

/// Shift/mask fusion, truncating division/modulo and math merging.
pub struct OptimizePatterns;

impl Transform for OptimizePatterns {
    fn name(&self) -> &'static str {
        "optimize-patterns"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.try_optimize_patterns().map(TransformResult::changed)
    }
}

pub struct EliminateDeadPhis;

impl Transform for EliminateDeadPhis {
    fn name(&self) -> &'static str {
        "eliminate-dead-phis"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.eliminate_dead_phis().map(TransformResult::changed)
    }
}

pub struct WidenSmiToInt32;

impl Transform for WidenSmiToInt32 {
    fn name(&self) -> &'static str {
        "widen-smi-to-int32"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.widen_smi_to_int32().map(TransformResult::changed)
    }
}

/// Choose value representations and insert the conversions between them.
pub struct SelectRepresentations;

impl Transform for SelectRepresentations {
    fn name(&self) -> &'static str {
        "select-representations"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.select_representations().map(TransformResult::changed)
    }
}

pub struct EliminateEnvironments;

impl Transform for EliminateEnvironments {
    fn name(&self) -> &'static str {
        "eliminate-environments"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        opt.eliminate_environments().map(TransformResult::changed)
    }
}
