use std::collections::HashSet;

use tracing::debug;

use crate::error::OptError;
use crate::ir::{InstId, Op};

use super::FlowGraphOptimizer;

impl FlowGraphOptimizer<'_> {
    /// Remove phis whose values never reach a non-phi reader. Liveness starts
    /// at phis read by linked non-phi instructions (inputs or environments)
    /// and flows backwards through phi inputs; every unmarked phi goes, which
    /// takes dead phi cycles with it.
    pub fn eliminate_dead_phis(&mut self) -> Result<bool, OptError> {
        let phis = self.phis_in_rpo();
        let mut live: HashSet<InstId> = HashSet::new();
        let mut worklist: Vec<InstId> = Vec::new();

        for &phi in &phis {
            let Some(value) = self.graph.result(phi) else {
                continue;
            };
            let read_outside = self
                .graph
                .uses(value)
                .iter()
                .any(|u| !matches!(self.graph.op(u.user), Op::Phi));
            if read_outside && live.insert(phi) {
                worklist.push(phi);
            }
        }
        while let Some(phi) = worklist.pop() {
            for &input in self.graph.inputs(phi) {
                let producer = self.graph.producer(input);
                if matches!(self.graph.op(producer), Op::Phi) && live.insert(producer) {
                    worklist.push(producer);
                }
            }
        }

        let dead: Vec<InstId> = phis.into_iter().filter(|p| !live.contains(p)).collect();
        if dead.is_empty() {
            return Ok(false);
        }
        debug!(removed = dead.len(), "eliminated dead phis");
        self.graph.remove_instrs(&dead)?;
        Ok(true)
    }
}
