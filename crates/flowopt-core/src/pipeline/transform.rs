use std::time::Instant;

use tracing::{debug, debug_span, info};

use crate::error::OptError;
use crate::ir::{verify, VerifyLevel};
use crate::optimizer::FlowGraphOptimizer;

/// Result of applying a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformResult {
    /// Whether the pass modified the graph.
    pub changed: bool,
}

impl TransformResult {
    pub fn changed(changed: bool) -> Self {
        Self { changed }
    }
}

/// Transform trait: a pass over the flow graph held by an optimizer.
///
/// Feedback specialization, canonicalization and representation selection
/// are all transforms.
pub trait Transform {
    /// Name of this transform pass.
    fn name(&self) -> &'static str;

    /// Apply this transform in place.
    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError>;
}

/// Run one transform with its span, timing and post-pass checks.
pub(crate) fn run_transform(
    transform: &dyn Transform,
    opt: &mut FlowGraphOptimizer<'_>,
) -> Result<TransformResult, OptError> {
    let span = debug_span!("pass", name = transform.name());
    let _enter = span.enter();
    let start = Instant::now();

    let result = transform.apply(opt)?;

    let count = opt.graph().instruction_count();
    info!(
        target: "flowopt::perf",
        pass = transform.name(),
        elapsed_us = start.elapsed().as_micros() as u64,
        instructions = count,
        "pass finished"
    );
    debug!(changed = result.changed, "{} done", transform.name());

    let limit = opt.config().max_instructions;
    if count > limit {
        return Err(OptError::TooManyInstructions { count, limit });
    }
    if opt.config().verify_each_pass {
        verify(opt.graph(), VerifyLevel::Structure)?;
    }
    Ok(result)
}

/// An ordered sequence of transforms to apply.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    pub fn add(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Names of the transforms, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Run all transforms in order. Returns whether any of them changed the
    /// graph.
    pub fn run(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<bool, OptError> {
        let mut changed = false;
        for transform in &self.transforms {
            changed |= run_transform(transform.as_ref(), opt)?.changed;
        }
        Ok(changed)
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}
