use tracing::{debug, warn};

use crate::error::OptError;
use crate::optimizer::FlowGraphOptimizer;
use crate::pipeline::transform::run_transform;
use crate::pipeline::{Transform, TransformResult};

/// Feedback specialization as a bounded fixpoint: the member passes re-run
/// while the last of them (canonicalization) keeps finding work, since each
/// simplification can expose new class information to the next round.
pub struct Specialize {
    members: Vec<Box<dyn Transform>>,
    max_iterations: usize,
}

impl Specialize {
    pub fn new(members: Vec<Box<dyn Transform>>, max_iterations: usize) -> Self {
        Self {
            members,
            max_iterations,
        }
    }

    pub fn member_names(&self) -> Vec<&'static str> {
        self.members.iter().map(|t| t.name()).collect()
    }
}

impl Transform for Specialize {
    fn name(&self) -> &'static str {
        "specialize"
    }

    fn apply(&self, opt: &mut FlowGraphOptimizer<'_>) -> Result<TransformResult, OptError> {
        let mut changed = false;
        for round in 0..self.max_iterations {
            let mut last = false;
            for member in &self.members {
                last = run_transform(member.as_ref(), opt)?.changed;
                changed |= last;
            }
            if !last {
                debug!(rounds = round + 1, "specialization settled");
                return Ok(TransformResult::changed(changed));
            }
        }
        if self.max_iterations > 0 && !self.members.is_empty() {
            warn!(
                max = self.max_iterations,
                "specialization stopped before reaching a fixpoint"
            );
        }
        Ok(TransformResult::changed(changed))
    }
}
