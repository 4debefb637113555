//! Local simplification to a fixed point.
//!
//! Every rewrite keeps the representation of the value it replaces, so the
//! pass can run both before and after representation selection.

use tracing::{debug, trace, warn};

use crate::error::OptError;
use crate::ir::{BinaryOp, Constant, InstId, NumberKind, Op, ValueId};

use super::FlowGraphOptimizer;

/// Outcome of simplifying one instruction.
enum Rewrite {
    /// Readers use this value; the instruction goes away.
    Value(ValueId),
    /// The instruction has no effect.
    Remove,
    /// The instruction becomes a cheaper one.
    Op(Op, Vec<ValueId>),
}

impl FlowGraphOptimizer<'_> {
    /// Simplify until nothing changes or `max_canonicalize_iterations`
    /// rounds ran. Returns whether anything changed.
    pub fn canonicalize(&mut self) -> Result<bool, OptError> {
        let mut changed = false;
        let limit = self.config.max_canonicalize_iterations;
        for round in 0..limit {
            let mut round_changed = false;
            let worklist: Vec<InstId> = self
                .phis_in_rpo()
                .into_iter()
                .chain(self.instructions_in_rpo())
                .collect();
            for inst in worklist {
                if !self.graph.is_linked(inst) {
                    continue;
                }
                if let Some(rewrite) = self.canonical_form(inst) {
                    round_changed |= self.apply_rewrite(inst, rewrite)?;
                }
            }
            if !round_changed {
                debug!(rounds = round + 1, changed, "canonicalized");
                return Ok(changed);
            }
            changed = true;
        }
        warn!(limit, "canonicalize stopped before reaching a fixed point");
        Ok(changed)
    }

    fn apply_rewrite(&mut self, inst: InstId, rewrite: Rewrite) -> Result<bool, OptError> {
        let result = self.graph.result(inst);
        match rewrite {
            Rewrite::Remove => {
                trace!(op = self.graph.op(inst).name(), "removed");
                self.graph.remove_instr(inst)?;
            }
            Rewrite::Value(value) => {
                let Some(old) = result else {
                    return Ok(false);
                };
                if value == old || self.graph.rep(value) != self.graph.rep(old) {
                    return Ok(false);
                }
                trace!(op = self.graph.op(inst).name(), "replaced by existing value");
                self.replace_with_value(inst, value)?;
            }
            Rewrite::Op(op, inputs) => {
                if result.is_some_and(|old| op.default_representation() != self.graph.rep(old)) {
                    return Ok(false);
                }
                trace!(from = self.graph.op(inst).name(), to = op.name(), "simplified");
                self.replace_with_op(inst, op, inputs)?;
            }
        }
        Ok(true)
    }

    fn canonical_form(&self, inst: InstId) -> Option<Rewrite> {
        let g = &*self.graph;
        let op = g.op(inst);
        let inputs = g.inputs(inst);

        if op.is_pure() && g.result(inst).is_some_and(|v| !g.has_uses(v)) {
            return Some(Rewrite::Remove);
        }

        match op {
            Op::Phi => {
                let this = g.result(inst)?;
                let mut unique = None;
                for &input in inputs {
                    if input == this || Some(input) == unique {
                        continue;
                    }
                    if unique.is_some() {
                        return None;
                    }
                    unique = Some(input);
                }
                unique.map(Rewrite::Value)
            }
            Op::Box(rep) => {
                let inner = g.producer(*inputs.first()?);
                match g.op(inner) {
                    Op::Unbox { to, .. } if to == rep => Some(Rewrite::Value(g.input(inner, 0))),
                    _ => None,
                }
            }
            Op::Unbox { to, .. } => {
                let input = *inputs.first()?;
                let inner = g.producer(input);
                match g.op(inner) {
                    Op::Box(from) if from == to => Some(Rewrite::Value(g.input(inner, 0))),
                    Op::Constant(c) if c.is_representable_in(*to) => Some(Rewrite::Op(
                        Op::UnboxedConstant {
                            value: c.clone(),
                            rep: *to,
                        },
                        Vec::new(),
                    )),
                    _ => None,
                }
            }
            Op::IntConverter { from, to, .. } if from == to => {
                inputs.first().copied().map(Rewrite::Value)
            }
            Op::UnarySmiOp(_) | Op::UnaryMintOp(_) | Op::UnaryDoubleOp(_) | Op::BooleanNegate => {
                let inner = g.producer(*inputs.first()?);
                (g.op(inner) == op).then(|| Rewrite::Value(g.input(inner, 0)))
            }
            Op::BinarySmiOp { op: bin, .. }
            | Op::BinaryMintOp { op: bin, .. }
            | Op::BinaryInt32Op { op: bin, .. } => {
                let (left, right) = (*inputs.first()?, *inputs.get(1)?);
                let l = g.constant(left).and_then(Constant::as_int);
                let r = g.constant(right).and_then(Constant::as_int);
                if let (Op::BinarySmiOp { .. }, Some(a), Some(b)) = (op, l, r) {
                    let folded = fold_smi(*bin, a, b).filter(|v| self.config.target.is_smi(*v))?;
                    return Some(Rewrite::Op(Op::Constant(Constant::Smi(folded)), Vec::new()));
                }
                neutral_operand(*bin, left, l, right, r).map(Rewrite::Value)
            }
            Op::CheckSmi | Op::CheckClass(_) => {
                let cids = super::checks::checked_cids(op)?;
                let cid = g.known_cid(*inputs.first()?)?;
                cids.contains(cid).then_some(Rewrite::Remove)
            }
            Op::EqualityCompare { kind, operands } | Op::RelationalOp { kind, operands }
                if *operands != NumberKind::Double =>
            {
                let (left, right) = (*inputs.first()?, *inputs.get(1)?);
                (left == right).then(|| {
                    Rewrite::Op(
                        Op::Constant(Constant::Bool(kind.reflexive_result())),
                        Vec::new(),
                    )
                })
            }
            _ => None,
        }
    }
}

/// The operand an integer operation returns unchanged, given which operands
/// are constants.
fn neutral_operand(
    op: BinaryOp,
    left: ValueId,
    l: Option<i64>,
    right: ValueId,
    r: Option<i64>,
) -> Option<ValueId> {
    use BinaryOp::*;
    match (op, l, r) {
        (Add | Sub | BitOr | BitXor | Shl | Shr, _, Some(0)) => Some(left),
        (Mul, _, Some(1)) | (BitAnd, _, Some(-1)) => Some(left),
        (Add | BitOr | BitXor, Some(0), _) => Some(right),
        (Mul, Some(1), _) | (BitAnd, Some(-1), _) => Some(right),
        _ => None,
    }
}

/// Smi arithmetic on constants; `None` when the result is not an integer
/// or overflows 64 bits.
fn fold_smi(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Shl => {
            let shift = u32::try_from(b).ok().filter(|s| *s < 63)?;
            let v = a.checked_shl(shift)?;
            (v >> shift == a).then_some(v)
        }
        BinaryOp::Shr => u32::try_from(b).ok().map(|s| a >> s.min(63)),
        BinaryOp::TruncDiv => a.checked_div(b),
        BinaryOp::Mod => {
            // The remainder takes the divisor's magnitude, never its sign.
            let r = a.checked_rem(b)?;
            Some(if r < 0 { r + b.abs() } else { r })
        }
        BinaryOp::Div => None,
    }
}
