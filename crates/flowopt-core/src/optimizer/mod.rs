//! The flow-graph optimizer: feedback specialization, guard insertion,
//! recognized-method inlining, peepholes, canonicalization and
//! representation selection over one [`FlowGraph`].
//!
//! Each concern lives in its own submodule as an `impl` block on
//! [`FlowGraphOptimizer`]; the passes in [`crate::transforms`] drive them.

mod canonicalize;
mod checks;
mod dead_phis;
mod environments;
mod inliner;
mod operators;
mod patterns;
mod polymorphic;
mod representation;
mod specialize;
mod widen;

pub use inliner::InlinedSequence;

use crate::compile::CompilationUnit;
use crate::error::OptError;
use crate::ir::{
    Constant, DeoptId, Dominators, FlowGraph, InstId, Op, Representation, ValueId,
};
use crate::pipeline::OptimizerConfig;

/// Optimizer state for one compilation unit.
///
/// Holds the graph being rewritten together with the unit's read-only
/// feedback and configuration. The control-flow shape never changes while
/// an optimizer exists, so dominators are computed once on demand.
pub struct FlowGraphOptimizer<'a> {
    graph: &'a mut FlowGraph,
    config: &'a OptimizerConfig,
    unit: &'a CompilationUnit,
    dominators: Option<Dominators>,
    representations_selected: bool,
}

impl<'a> FlowGraphOptimizer<'a> {
    pub fn new(
        graph: &'a mut FlowGraph,
        config: &'a OptimizerConfig,
        unit: &'a CompilationUnit,
    ) -> Self {
        Self {
            graph,
            config,
            unit,
            dominators: None,
            representations_selected: false,
        }
    }

    pub fn graph(&self) -> &FlowGraph {
        &*self.graph
    }

    pub fn config(&self) -> &OptimizerConfig {
        self.config
    }

    pub fn unit(&self) -> &CompilationUnit {
        self.unit
    }

    /// Whether `select_representations` has run on this graph.
    pub fn representations_selected(&self) -> bool {
        self.representations_selected
    }

    /// True when speculative inlining at `deopt_id` must not be attempted:
    /// speculation is switched off, or the site already deoptimized.
    pub fn is_black_listed_for_inlining(&self, deopt_id: Option<DeoptId>) -> bool {
        !self.config.use_speculative_inlining
            || deopt_id.is_some_and(|d| self.unit.is_black_listed(d))
    }

    fn dominators(&mut self) -> &Dominators {
        let graph = &*self.graph;
        self.dominators.get_or_insert_with(|| Dominators::compute(graph))
    }

    /// Non-phi instructions of reachable blocks, blocks in reverse postorder.
    pub(crate) fn instructions_in_rpo(&self) -> Vec<InstId> {
        self.graph
            .reverse_postorder()
            .into_iter()
            .flat_map(|b| self.graph.block(b).insts.iter().copied())
            .collect()
    }

    /// Phis of reachable blocks, blocks in reverse postorder.
    pub(crate) fn phis_in_rpo(&self) -> Vec<InstId> {
        self.graph
            .reverse_postorder()
            .into_iter()
            .flat_map(|b| self.graph.block(b).phis.iter().copied())
            .collect()
    }

    // -- rewriting helpers shared by the passes --

    /// Create `op` and link it before `anchor`, without deopt information.
    pub(crate) fn emit_def_before(
        &mut self,
        anchor: InstId,
        op: Op,
        inputs: Vec<ValueId>,
    ) -> Result<ValueId, OptError> {
        let (inst, value) = self.graph.create_def(op, inputs);
        self.graph.insert_before(anchor, inst)?;
        Ok(value)
    }

    pub(crate) fn constant_before(
        &mut self,
        anchor: InstId,
        constant: Constant,
    ) -> Result<ValueId, OptError> {
        self.emit_def_before(anchor, Op::Constant(constant), Vec::new())
    }

    /// `value` itself if tagged, else a box of it linked before `anchor`.
    pub(crate) fn tagged_before(
        &mut self,
        anchor: InstId,
        value: ValueId,
    ) -> Result<ValueId, OptError> {
        let rep = self.graph.rep(value);
        if rep == Representation::Tagged {
            return Ok(value);
        }
        self.emit_def_before(anchor, Op::Box(rep), vec![value])
    }

    /// Link `new` in place of `old`, taking over its uses, and its deopt id
    /// and environment when `new` can deoptimize. A tagged result replaced by
    /// an unboxed one is read through a box so environments keep capturing
    /// tagged values.
    pub(crate) fn replace_instruction(&mut self, old: InstId, new: InstId) -> Result<(), OptError> {
        if self.graph.op(new).can_deoptimize() {
            self.graph.inherit_deopt_info(old, new);
        }
        self.graph.insert_before(old, new)?;
        if let (Some(old_value), Some(new_value)) = (self.graph.result(old), self.graph.result(new)) {
            let replacement = if self.graph.rep(old_value) == Representation::Tagged {
                self.tagged_before(old, new_value)?
            } else {
                new_value
            };
            self.graph.replace_uses(old_value, replacement)?;
        }
        self.graph.remove_instr(old)
    }

    /// Replace the call `old` by the value-producing `op`.
    pub(crate) fn replace_with_op(
        &mut self,
        old: InstId,
        op: Op,
        inputs: Vec<ValueId>,
    ) -> Result<InstId, OptError> {
        let new = self.graph.create_inst(op, inputs);
        self.replace_instruction(old, new)?;
        Ok(new)
    }

    /// Drop `old`, redirecting readers of its result to `value`.
    pub(crate) fn replace_with_value(&mut self, old: InstId, value: ValueId) -> Result<(), OptError> {
        if let Some(old_value) = self.graph.result(old) {
            self.graph.replace_uses(old_value, value)?;
        }
        self.graph.remove_instr(old)
    }
}
