//! Graph well-formedness checks.
//!
//! Passes leave the graph in a state these checks accept; any failure is an
//! invariant violation that aborts the compilation unit.

use std::collections::HashMap;

use crate::error::OptError;

use super::graph::FlowGraph;
use super::inst::{InstId, Op};
use super::value::{Representation, Use, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyLevel {
    /// Block membership, phi arity, terminators, use lists.
    Structure,
    /// Structure, plus every deopt-capable instruction carries an
    /// environment of tagged values.
    Input,
    /// Input, plus every input arrives in the representation its consumer
    /// requires.
    Output,
}

pub fn verify(graph: &FlowGraph, level: VerifyLevel) -> Result<(), OptError> {
    verify_structure(graph)?;
    verify_use_lists(graph)?;
    if level == VerifyLevel::Structure {
        return Ok(());
    }
    verify_environments(graph)?;
    if level == VerifyLevel::Output {
        verify_representations(graph)?;
    }
    Ok(())
}

fn verify_structure(graph: &FlowGraph) -> Result<(), OptError> {
    for (block_id, block) in graph.blocks.iter() {
        for &phi in &block.phis {
            let instr = graph.inst(phi);
            if instr.block != Some(block_id) || !matches!(instr.op, Op::Phi) {
                return Err(OptError::Invariant(format!(
                    "{phi:?} listed as a phi of {block_id:?} but is {} in {:?}",
                    instr.op.name(),
                    instr.block
                )));
            }
            if instr.inputs.len() != block.preds.len() {
                return Err(OptError::Invariant(format!(
                    "phi {phi:?} has {} inputs but {block_id:?} has {} predecessors",
                    instr.inputs.len(),
                    block.preds.len()
                )));
            }
        }
        for (pos, &inst) in block.insts.iter().enumerate() {
            let instr = graph.inst(inst);
            if instr.block != Some(block_id) {
                return Err(OptError::Invariant(format!(
                    "{inst:?} listed in {block_id:?} but linked to {:?}",
                    instr.block
                )));
            }
            if matches!(instr.op, Op::Phi) {
                return Err(OptError::Invariant(format!(
                    "phi {inst:?} in the instruction list of {block_id:?}"
                )));
            }
            if instr.op.is_terminator() && pos + 1 != block.insts.len() {
                return Err(OptError::Invariant(format!(
                    "terminator {inst:?} is not last in {block_id:?}"
                )));
            }
        }
    }
    for block in graph.reverse_postorder() {
        if graph.terminator(block).is_none() {
            return Err(OptError::Invariant(format!(
                "reachable block {block:?} has no terminator"
            )));
        }
    }
    Ok(())
}

fn expected_uses(graph: &FlowGraph) -> HashMap<ValueId, Vec<Use>> {
    let mut expected: HashMap<ValueId, Vec<Use>> = HashMap::new();
    for inst in graph.linked_instructions() {
        let instr = graph.inst(inst);
        for (i, &v) in instr.inputs.iter().enumerate() {
            expected.entry(v).or_default().push(Use::input(inst, i));
        }
        if let Some(env) = &instr.env {
            for (i, &v) in env.slots().iter().enumerate() {
                expected.entry(v).or_default().push(Use::env(inst, i));
            }
        }
    }
    expected
}

fn verify_use_lists(graph: &FlowGraph) -> Result<(), OptError> {
    let mut expected = expected_uses(graph);
    for (value, def) in graph.values.iter() {
        let mut want = expected.remove(&value).unwrap_or_default();
        if let Some(u) = want.first() {
            if !graph.is_linked(def.inst) {
                return Err(OptError::DanglingUse {
                    value,
                    user: u.user,
                });
            }
        }
        let mut have = def.uses.clone();
        want.sort();
        have.sort();
        if want != have {
            return Err(OptError::UseListMismatch {
                value,
                expected: want.len(),
                found: have.len(),
            });
        }
    }
    Ok(())
}

fn verify_environments(graph: &FlowGraph) -> Result<(), OptError> {
    for inst in graph.linked_instructions() {
        let instr = graph.inst(inst);
        match &instr.env {
            None if instr.op.can_deoptimize() => {
                return Err(OptError::MissingEnvironment { inst });
            }
            None => {}
            Some(env) => {
                for &value in env.slots() {
                    let rep = graph.rep(value);
                    if rep != Representation::Tagged {
                        return Err(OptError::UntaggedEnvironmentSlot { inst, value, rep });
                    }
                }
            }
        }
    }
    Ok(())
}

fn verify_representations(graph: &FlowGraph) -> Result<(), OptError> {
    for inst in graph.linked_instructions() {
        verify_inputs_of(graph, inst)?;
    }
    Ok(())
}

fn verify_inputs_of(graph: &FlowGraph, inst: InstId) -> Result<(), OptError> {
    for (index, &value) in graph.inputs(inst).iter().enumerate() {
        let required = graph.required_input_rep(inst, index);
        let actual = graph.rep(value);
        if required != actual {
            return Err(OptError::RepresentationMismatch {
                inst,
                index,
                value,
                required,
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FlowGraphBuilder;
    use crate::ir::inst::BinaryOp;

    #[test]
    fn built_graph_is_valid_input() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        let sum = b.instance_call("+", &[x, y], None);
        b.ret(sum);
        let g = b.build();
        verify(&g, VerifyLevel::Input).unwrap();
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn missing_environment_is_rejected() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        let check = b.emit_void(Op::CheckSmi, &[x]);
        b.ret(x);
        let mut g = b.build();
        g.detach_env(check);
        verify(&g, VerifyLevel::Structure).unwrap();
        assert!(matches!(
            verify(&g, VerifyLevel::Input),
            Err(OptError::MissingEnvironment { .. })
        ));
    }

    #[test]
    fn representation_mismatch_is_rejected() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        let sum = b.emit(
            Op::BinaryMintOp {
                op: BinaryOp::BitAnd,
                can_overflow: false,
            },
            &[x, y],
        );
        let boxed = b.emit(Op::Box(Representation::UnboxedInt64), &[sum]);
        b.ret(boxed);
        let g = b.build();
        verify(&g, VerifyLevel::Input).unwrap();
        assert!(matches!(
            verify(&g, VerifyLevel::Output),
            Err(OptError::RepresentationMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn stale_use_list_is_rejected() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        b.ret(x);
        let mut g = b.build();
        g.values[x].uses.clear();
        assert!(matches!(
            verify(&g, VerifyLevel::Structure),
            Err(OptError::UseListMismatch { .. })
        ));
    }
}
