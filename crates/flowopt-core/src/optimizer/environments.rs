use tracing::debug;

use crate::error::OptError;
use crate::ir::InstId;

use super::FlowGraphOptimizer;

impl FlowGraphOptimizer<'_> {
    /// Drop the environments of instructions that cannot deoptimize. Before
    /// representation selection those environments may still be needed by
    /// speculative unboxing, so running earlier is an error.
    pub fn eliminate_environments(&mut self) -> Result<bool, OptError> {
        if !self.representations_selected {
            return Err(OptError::PassOrder {
                pass: "eliminate-environments",
                requires: "select-representations",
            });
        }
        let prunable: Vec<InstId> = self
            .graph
            .linked_instructions()
            .into_iter()
            .filter(|&i| self.graph.env(i).is_some() && !self.graph.op(i).can_deoptimize())
            .collect();
        for &inst in &prunable {
            self.graph.detach_env(inst);
        }
        if !prunable.is_empty() {
            debug!(pruned = prunable.len(), "eliminated environments");
        }
        Ok(!prunable.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::CompilationUnit;
    use crate::error::OptError;
    use crate::ir::{verify, FlowGraph, FlowGraphBuilder, Op, VerifyLevel};
    use crate::optimizer::test_helpers::{find, with_optimizer};

    /// A pure `Box` that was given an environment, next to a call.
    fn graph_with_stale_env() -> FlowGraph {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        let r = b.instance_call("foo", &[x], None);
        b.ret(r);
        let mut g = b.build();
        let call = find(&g, |op| matches!(op, Op::InstanceCall(_))).unwrap();
        let ret = find(&g, |op| matches!(op, Op::Return)).unwrap();
        let env = g.env(call).cloned();
        g.set_env(ret, env);
        g
    }

    #[test]
    fn requires_selected_representations() {
        let mut g = graph_with_stale_env();
        let unit = CompilationUnit::default();
        let err = with_optimizer(&mut g, &unit, |opt| opt.eliminate_environments()).unwrap_err();
        assert!(matches!(
            err,
            OptError::PassOrder {
                requires: "select-representations",
                ..
            }
        ));
    }

    #[test]
    fn keeps_only_deoptimizing_environments() {
        let mut g = graph_with_stale_env();
        let unit = CompilationUnit::default();
        let changed = with_optimizer(&mut g, &unit, |opt| {
            opt.select_representations().unwrap();
            opt.eliminate_environments().unwrap()
        });
        assert!(changed);
        let call = find(&g, |op| matches!(op, Op::InstanceCall(_))).unwrap();
        let ret = find(&g, |op| matches!(op, Op::Return)).unwrap();
        assert!(g.env(call).is_some());
        assert!(g.env(ret).is_none());
        verify(&g, VerifyLevel::Output).unwrap();

        let again = with_optimizer(&mut g, &unit, |opt| {
            opt.select_representations().unwrap();
            opt.eliminate_environments().unwrap()
        });
        assert!(!again);
    }
}
