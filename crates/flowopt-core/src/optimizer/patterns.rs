//! Block-local peepholes: shift-and-mask fusion and merging of operations
//! that compute several results from the same operands.

use tracing::{debug, trace};

use crate::error::OptError;
use crate::ir::{
    BinaryOp, CidSet, ClassId, InstId, MathKind, MergedMathKind, Op, Representation, ValueId,
};

use super::FlowGraphOptimizer;

impl FlowGraphOptimizer<'_> {
    /// Run the peepholes over every reachable block.
    pub fn try_optimize_patterns(&mut self) -> Result<bool, OptError> {
        let mut changed = false;
        for block in self.graph.reverse_postorder() {
            let insts = self.graph.block(block).insts.clone();
            let mut div_mods = Vec::new();
            let mut math = Vec::new();
            for inst in insts {
                if !self.graph.is_linked(inst) {
                    continue;
                }
                match self.graph.op(inst) {
                    Op::BinarySmiOp {
                        op: BinaryOp::BitAnd,
                        ..
                    }
                    | Op::BinaryMintOp {
                        op: BinaryOp::BitAnd,
                        ..
                    } => {
                        let (left, right) = (self.graph.input(inst, 0), self.graph.input(inst, 1));
                        changed |= self.optimize_left_shift_bit_and_smi_op(inst, left, right)?;
                    }
                    Op::BinarySmiOp {
                        op: BinaryOp::TruncDiv | BinaryOp::Mod,
                        ..
                    } => div_mods.push(inst),
                    Op::MathUnary(_)
                    | Op::InvokeMathCFunction(MathKind::Sin | MathKind::Cos) => math.push(inst),
                    _ => {}
                }
            }
            changed |= self.try_merge_trunc_div_mod(&div_mods)?;
            changed |= self.try_merge_math_unary(&math)?;
        }
        debug!(changed, "optimized patterns");
        Ok(changed)
    }

    /// `(a << b) & c` with `c` a non-negative Smi constant becomes one
    /// `ShiftLeftMaskSmi`, which cannot overflow. The shift must be in the
    /// same block; it goes away once nothing else reads it.
    ///
    /// Only the overflow check is dropped. Unless `b` is a constant in
    /// `0..smi_bits` the fused instruction still deoptimizes on a bad count,
    /// at the shift's deoptimization point.
    pub fn optimize_left_shift_bit_and_smi_op(
        &mut self,
        bit_and: InstId,
        left: ValueId,
        right: ValueId,
    ) -> Result<bool, OptError> {
        let (shifted, mask) = match (self.graph.smi_constant(right), self.graph.smi_constant(left)) {
            (Some(mask), _) if mask >= 0 => (left, mask),
            (_, Some(mask)) if mask >= 0 => (right, mask),
            _ => return Ok(false),
        };
        // A mint shift reaches a Smi `&` through a box.
        let boxed = matches!(self.graph.op(self.graph.producer(shifted)), Op::Box(_))
            .then(|| self.graph.producer(shifted));
        let shift_value = match boxed {
            Some(b) => self.graph.input(b, 0),
            None => shifted,
        };
        let shift = self.graph.producer(shift_value);
        if self.graph.block_of(shift) != self.graph.block_of(bit_and) {
            return Ok(false);
        }
        let is_mint = match self.graph.op(shift) {
            Op::BinarySmiOp {
                op: BinaryOp::Shl,
                ..
            } => false,
            Op::BinaryMintOp {
                op: BinaryOp::Shl,
                ..
            } => true,
            _ => return Ok(false),
        };
        let (value, count) = (self.graph.input(shift, 0), self.graph.input(shift, 1));
        if is_mint {
            let smi = CidSet::single(ClassId::SMI);
            if !self.is_proven(value, &smi, bit_and) || !self.is_proven(count, &smi, bit_and) {
                trace!(?shift, "mint shift operands are not Smis");
                return Ok(false);
            }
        }

        let smi_bits = i64::from(self.config.target.smi_bits);
        let check_count = !self
            .graph
            .smi_constant(count)
            .is_some_and(|c| (0..smi_bits).contains(&c));
        if check_count && self.graph.env(shift).is_none() {
            trace!(?shift, "shift count needs a check but the shift has no environment");
            return Ok(false);
        }

        let fused = self
            .graph
            .create_inst(Op::ShiftLeftMaskSmi { mask, check_count }, vec![value, count]);
        if check_count {
            self.graph.inherit_deopt_info(shift, fused);
        }
        self.replace_instruction(bit_and, fused)?;
        if let Some(b) = boxed {
            if !self.graph.has_uses(shifted) {
                self.graph.remove_instr(b)?;
            }
        }
        if !self.graph.has_uses(shift_value) {
            self.graph.remove_instr(shift)?;
        }
        trace!(mask, "fused shift and mask");
        Ok(true)
    }

    /// Pair up `~/` and `%` on the same operands into one `TruncDivMod`.
    pub fn try_merge_trunc_div_mod(&mut self, candidates: &[InstId]) -> Result<bool, OptError> {
        let mut changed = false;
        let mut merged: Vec<InstId> = Vec::new();
        for (i, &first) in candidates.iter().enumerate() {
            if merged.contains(&first) || !self.graph.is_linked(first) {
                continue;
            }
            let first_op = binary_op(self.graph.op(first));
            let Some(&second) = candidates[i + 1..].iter().find(|&&other| {
                !merged.contains(&other)
                    && self.graph.is_linked(other)
                    && binary_op(self.graph.op(other)) != first_op
                    && self.graph.inputs(other) == self.graph.inputs(first)
            }) else {
                continue;
            };
            let (div, rem) = if first_op == Some(BinaryOp::TruncDiv) {
                (first, second)
            } else {
                (second, first)
            };

            let inputs = self.graph.inputs(first).to_vec();
            let pair = self.graph.create_inst(Op::TruncDivMod, inputs);
            self.graph.inherit_deopt_info(first, pair);
            self.graph.insert_before(first, pair)?;
            let (rep, cid) = (Representation::Tagged, ClassId::SMI);
            let quotient = self.append_extract_nth_output_for_merged(pair, 0, rep, cid)?;
            let remainder = self.append_extract_nth_output_for_merged(pair, 1, rep, cid)?;
            self.replace_with_value(div, quotient)?;
            self.replace_with_value(rem, remainder)?;
            merged.extend([first, second]);
            changed = true;
        }
        Ok(changed)
    }

    /// `sin(x)` and `cos(x)` become one `MergedMath`; a repeated unary math
    /// operation on the same value reuses the first result.
    pub fn try_merge_math_unary(&mut self, candidates: &[InstId]) -> Result<bool, OptError> {
        let mut changed = false;
        for (i, &first) in candidates.iter().enumerate() {
            if !self.graph.is_linked(first) {
                continue;
            }
            for &later in &candidates[i + 1..] {
                if self.graph.is_linked(later)
                    && self.graph.op(later) == self.graph.op(first)
                    && self.graph.inputs(later) == self.graph.inputs(first)
                {
                    if let Some(result) = self.graph.result(first) {
                        trace!(?later, "reusing identical math result");
                        self.replace_with_value(later, result)?;
                        changed = true;
                    }
                }
            }
        }

        let sin_cos: Vec<InstId> = candidates
            .iter()
            .copied()
            .filter(|&i| self.graph.is_linked(i))
            .collect();
        for (i, &first) in sin_cos.iter().enumerate() {
            if !self.graph.is_linked(first) {
                continue;
            }
            let wanted = match self.graph.op(first) {
                Op::InvokeMathCFunction(MathKind::Sin) => MathKind::Cos,
                Op::InvokeMathCFunction(MathKind::Cos) => MathKind::Sin,
                _ => continue,
            };
            let Some(&second) = sin_cos[i + 1..].iter().find(|&&other| {
                self.graph.is_linked(other)
                    && *self.graph.op(other) == Op::InvokeMathCFunction(wanted)
                    && self.graph.inputs(other) == self.graph.inputs(first)
            }) else {
                continue;
            };
            let (sin, cos) = if wanted == MathKind::Cos {
                (first, second)
            } else {
                (second, first)
            };

            let inputs = self.graph.inputs(first).to_vec();
            let merged = self
                .graph
                .create_inst(Op::MergedMath(MergedMathKind::SinCos), inputs);
            self.graph.inherit_deopt_info(first, merged);
            self.graph.insert_before(first, merged)?;
            let sin_value = self.append_extract_nth_output_for_merged(
                merged,
                0,
                Representation::UnboxedDouble,
                ClassId::DOUBLE,
            )?;
            let cos_value = self.append_extract_nth_output_for_merged(
                merged,
                1,
                Representation::UnboxedDouble,
                ClassId::DOUBLE,
            )?;
            self.replace_with_value(sin, sin_value)?;
            self.replace_with_value(cos, cos_value)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Project output `index` of `merged`, linked after the projections
    /// already following it.
    pub fn append_extract_nth_output_for_merged(
        &mut self,
        merged: InstId,
        index: u8,
        rep: Representation,
        cid: ClassId,
    ) -> Result<ValueId, OptError> {
        let merged_value = self
            .graph
            .result(merged)
            .ok_or_else(|| OptError::Invariant(format!("{merged:?} has no outputs")))?;
        let block = self
            .graph
            .block_of(merged)
            .ok_or_else(|| OptError::Invariant(format!("{merged:?} is not linked")))?;
        let start = self.graph.position(merged).unwrap_or_default();
        let mut anchor = merged;
        for &next in self.graph.block(block).insts.iter().skip(start + 1) {
            if matches!(self.graph.op(next), Op::ExtractNthOutput { .. })
                && self.graph.inputs(next) == [merged_value]
            {
                anchor = next;
            } else {
                break;
            }
        }
        let (extract, value) = self
            .graph
            .create_def(Op::ExtractNthOutput { index, rep, cid }, vec![merged_value]);
        self.graph.insert_after(anchor, extract)?;
        Ok(value)
    }
}

fn binary_op(op: &Op) -> Option<BinaryOp> {
    match op {
        Op::BinarySmiOp { op, .. } => Some(*op),
        _ => None,
    }
}
