//! Operator calls (`+`, unary `-`, `==`, `<`, `[]`) specialized on the
//! operand classes their feedback saw.

use tracing::trace;

use crate::error::OptError;
use crate::ir::{
    BinaryOp, CidSet, ClassId, CompareKind, Constant, IcData, InstId, NumberKind, Op,
    RecognizedKind, UnaryOp, ValueId,
};

use super::inliner::monomorphic_recognized;
use super::FlowGraphOptimizer;

/// Operators with an unboxed 64-bit integer form.
fn has_mint_form(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Shl | BinaryOp::Shr
    ) || op.is_bitwise()
}

impl FlowGraphOptimizer<'_> {
    fn operands(&self, call: InstId) -> Option<(ValueId, ValueId)> {
        let inputs = self.graph.inputs(call);
        Some((*inputs.first()?, *inputs.get(1)?))
    }

    pub fn try_replace_with_binary_op(
        &mut self,
        call: InstId,
        op: BinaryOp,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((left, right)) = self.operands(call) else {
            return Ok(false);
        };
        let blacklisted = self.is_black_listed_for_inlining(self.graph.deopt_id(call));

        if ic.has_two_smis() {
            if op == BinaryOp::Div {
                return self.replace_with_double_op(call, op, left, right, ic);
            }
            if blacklisted {
                // A Smi op that overflowed here before; widen instead.
                return if has_mint_form(op) {
                    self.replace_with_mint_op(call, op, left, right)
                } else {
                    trace!(?op, "blacklisted smi operation");
                    Ok(false)
                };
            }
            let mut seq = self.begin_sequence(call)?;
            let smi = CidSet::single(ClassId::SMI);
            self.seq_check(&mut seq, left, &smi);
            self.seq_check(&mut seq, right, &smi);
            let result = self.seq_def(
                &mut seq,
                Op::BinarySmiOp {
                    op,
                    can_overflow: op.can_overflow_smi(),
                },
                vec![left, right],
            );
            self.commit_sequence(seq, result)?;
            return Ok(true);
        }
        if ic.has_two_mint_or_smi() && has_mint_form(op) {
            return self.replace_with_mint_op(call, op, left, right);
        }
        if ic.should_specialize_for_double()
            && matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
        {
            return self.replace_with_double_op(call, op, left, right, ic);
        }
        self.try_inline_simd_operator(call, op.symbol(), ic)
    }

    fn replace_with_mint_op(
        &mut self,
        call: InstId,
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
    ) -> Result<bool, OptError> {
        let mut seq = self.begin_sequence(call)?;
        if op.is_shift() {
            self.seq_check(&mut seq, right, &CidSet::single(ClassId::SMI));
        }
        let can_overflow = matches!(
            op,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Shl
        );
        let result = self.seq_def(
            &mut seq,
            Op::BinaryMintOp { op, can_overflow },
            vec![left, right],
        );
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    fn replace_with_double_op(
        &mut self,
        call: InstId,
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            return Ok(false);
        }
        let mut seq = self.begin_sequence(call)?;
        let Some(left) = self.seq_double_operand(&mut seq, left, &ic.arg_cids(0)) else {
            return Ok(false);
        };
        let Some(right) = self.seq_double_operand(&mut seq, right, &ic.arg_cids(1)) else {
            return Ok(false);
        };
        let result = self.seq_def(&mut seq, Op::BinaryDoubleOp(op), vec![left, right]);
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    /// Lane-wise operators on a monomorphic SIMD receiver.
    fn try_inline_simd_operator(
        &mut self,
        call: InstId,
        selector: &str,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((cid, kind)) = monomorphic_recognized(ic, selector) else {
            return Ok(false);
        };
        if !cid.is_simd() {
            return Ok(false);
        }
        let receiver = self.graph.input(call, 0);
        Ok(self
            .try_inline_recognized_method(Some(cid), kind, call, Some(receiver), Some(ic))?
            .is_some())
    }

    pub fn try_replace_with_unary_op(
        &mut self,
        call: InstId,
        op: UnaryOp,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some(&value) = self.graph.inputs(call).first() else {
            return Ok(false);
        };
        let blacklisted = self.is_black_listed_for_inlining(self.graph.deopt_id(call));
        let mut seq = self.begin_sequence(call)?;
        let result = if ic.has_only(&[ClassId::SMI]) && !blacklisted {
            self.seq_check(&mut seq, value, &CidSet::single(ClassId::SMI));
            self.seq_def(&mut seq, Op::UnarySmiOp(op), vec![value])
        } else if ic.has_only(&[ClassId::SMI, ClassId::MINT]) {
            self.seq_def(&mut seq, Op::UnaryMintOp(op), vec![value])
        } else if ic.has_only(&[ClassId::DOUBLE]) && op == UnaryOp::Negate && !blacklisted {
            self.seq_check(&mut seq, value, &CidSet::single(ClassId::DOUBLE));
            self.seq_def(&mut seq, Op::UnaryDoubleOp(op), vec![value])
        } else {
            trace!(?op, "no unary specialization");
            return Ok(false);
        };
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    /// `==`: identity against `null`, one-character string comparisons, then
    /// numeric comparisons.
    pub fn try_replace_with_equality_op(
        &mut self,
        call: InstId,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((left, right)) = self.operands(call) else {
            return Ok(false);
        };
        let is_null = |v: ValueId| matches!(self.graph.constant(v), Some(Constant::Null));
        if is_null(left) || is_null(right) {
            let mut seq = self.begin_sequence(call)?;
            let result = self.seq_def(&mut seq, Op::StrictCompare { negate: false }, vec![left, right]);
            self.commit_sequence(seq, result)?;
            return Ok(true);
        }
        if self.try_string_length_one_equality(call, left, right, ic)? {
            return Ok(true);
        }
        self.replace_with_number_compare(call, left, right, ic, |operands| Op::EqualityCompare {
            kind: CompareKind::Eq,
            operands,
        })
    }

    pub fn try_replace_with_relational_op(
        &mut self,
        call: InstId,
        kind: CompareKind,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((left, right)) = self.operands(call) else {
            return Ok(false);
        };
        self.replace_with_number_compare(call, left, right, ic, |operands| Op::RelationalOp {
            kind,
            operands,
        })
    }

    fn replace_with_number_compare(
        &mut self,
        call: InstId,
        left: ValueId,
        right: ValueId,
        ic: &IcData,
        compare: impl FnOnce(NumberKind) -> Op,
    ) -> Result<bool, OptError> {
        let blacklisted = self.is_black_listed_for_inlining(self.graph.deopt_id(call));
        let mut seq = self.begin_sequence(call)?;
        let (left, right, operands) = if ic.has_two_smis() && !blacklisted {
            let smi = CidSet::single(ClassId::SMI);
            self.seq_check(&mut seq, left, &smi);
            self.seq_check(&mut seq, right, &smi);
            (left, right, NumberKind::Smi)
        } else if ic.has_two_mint_or_smi() {
            (left, right, NumberKind::Mint)
        } else if ic.should_specialize_for_double() && !blacklisted {
            let Some(l) = self.seq_double_operand(&mut seq, left, &ic.arg_cids(0)) else {
                return Ok(false);
            };
            let Some(r) = self.seq_double_operand(&mut seq, right, &ic.arg_cids(1)) else {
                return Ok(false);
            };
            (l, r, NumberKind::Double)
        } else {
            trace!(?call, "comparison operands are not numbers");
            return Ok(false);
        };
        let result = self.seq_def(&mut seq, compare(operands), vec![left, right]);
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    /// `s == "c"` on a one-byte string compares char codes instead. The
    /// string must be known or observed to be one-byte. For other lengths
    /// `StringToCharCode` yields -1, so the comparison is false.
    fn try_string_length_one_equality(
        &mut self,
        call: InstId,
        left: ValueId,
        right: ValueId,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let char_code = |v: ValueId| match self.graph.constant(v) {
            Some(Constant::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if u32::from(c) < 0x100 => Some(i64::from(u32::from(c))),
                    _ => None,
                }
            }
            _ => None,
        };
        let (string, code, index) = match (char_code(left), char_code(right)) {
            (None, Some(code)) => (left, code, 0),
            (Some(code), None) => (right, code, 1),
            _ => return Ok(false),
        };
        let one_byte = self.graph.known_cid(string) == Some(ClassId::ONE_BYTE_STRING)
            || ic.arg_cids(index).single_cid() == Some(ClassId::ONE_BYTE_STRING);
        if !one_byte || self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            return Ok(false);
        }

        let mut seq = self.begin_sequence(call)?;
        self.seq_check(&mut seq, string, &CidSet::single(ClassId::ONE_BYTE_STRING));
        let actual = self.seq_def(&mut seq, Op::StringToCharCode, vec![string]);
        let expected = self.seq_def(&mut seq, Op::Constant(Constant::Smi(code)), Vec::new());
        let result = self.seq_def(
            &mut seq,
            Op::EqualityCompare {
                kind: CompareKind::Eq,
                operands: NumberKind::Smi,
            },
            vec![actual, expected],
        );
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    /// `[]` and `[]=` on a single receiver class with a recognized
    /// implementation.
    pub fn try_replace_with_indexed_op(
        &mut self,
        call: InstId,
        selector: &str,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((cid, kind)) = monomorphic_recognized(ic, selector) else {
            return Ok(false);
        };
        if !kind.is_indexed_access() && kind != RecognizedKind::StringBaseCharAt {
            return Ok(false);
        }
        let receiver = self.graph.input(call, 0);
        Ok(self
            .try_inline_recognized_method(Some(cid), kind, call, Some(receiver), Some(ic))?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::CompilationUnit;
    use crate::ir::{
        BinaryOp, ClassId, CompareKind, Constant, FlowGraph, FlowGraphBuilder, IcData, NumberKind,
        Op, Representation, UnaryOp,
    };
    use crate::optimizer::test_helpers::{assert_well_formed, count, find, op_names, with_optimizer};

    fn binary(selector: &str, ic: IcData) -> FlowGraph {
        let mut b = FlowGraphBuilder::new("op", 2);
        let (x, y) = (b.param(0), b.param(1));
        let r = b.instance_call(selector, &[x, y], Some(ic));
        b.ret(r);
        b.build()
    }

    fn two(a: ClassId, b: ClassId) -> IcData {
        IcData::new(2).with_entry(&[a, b], 10, None)
    }

    fn apply(g: &mut FlowGraph, unit: &CompilationUnit) -> bool {
        with_optimizer(g, unit, |opt| opt.apply_ic_data().unwrap())
    }

    #[test]
    fn smi_division_produces_double() {
        let mut g = binary("/", two(ClassId::SMI, ClassId::SMI));
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(count(&g, |op| matches!(op, Op::SmiToDouble)), 2);
        assert_eq!(count(&g, |op| *op == Op::BinaryDoubleOp(BinaryOp::Div)), 1);
        assert_well_formed(&g);
    }

    #[test]
    fn blacklisted_smi_add_widens_to_mint() {
        let mut g = binary("+", two(ClassId::SMI, ClassId::SMI));
        let call = find(&g, |op| matches!(op, Op::InstanceCall(_))).unwrap();
        let mut unit = CompilationUnit::default();
        unit.black_list(g.deopt_id(call).unwrap());
        assert!(apply(&mut g, &unit));
        assert_eq!(count(&g, |op| op.is_check()), 0);
        let mint = find(&g, |op| matches!(op, Op::BinaryMintOp { .. })).unwrap();
        assert!(g.env(mint).is_some());
        assert_well_formed(&g);
    }

    #[test]
    fn mint_shift_guards_shift_count() {
        let mut g = binary(">>", two(ClassId::MINT, ClassId::SMI));
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(
            op_names(&g),
            vec!["Parameter", "Parameter", "CheckSmi", "BinaryMintOp", "Box", "Return"]
        );
        assert_well_formed(&g);
    }

    #[test]
    fn mixed_double_operands() {
        let mut g = binary("*", two(ClassId::DOUBLE, ClassId::SMI));
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(
            op_names(&g),
            vec![
                "Parameter",
                "Parameter",
                "CheckClass",
                "CheckSmi",
                "SmiToDouble",
                "BinaryDoubleOp",
                "Box",
                "Return"
            ]
        );
        let boxed = find(&g, |op| matches!(op, Op::Box(_))).unwrap();
        assert_eq!(g.op(boxed), &Op::Box(Representation::UnboxedDouble));
        assert_well_formed(&g);
    }

    #[test]
    fn string_modulo_is_left_alone() {
        let mut g = binary("%", two(ClassId::ONE_BYTE_STRING, ClassId::SMI));
        assert!(!apply(&mut g, &CompilationUnit::default()));
        assert_eq!(count(&g, |op| matches!(op, Op::InstanceCall(_))), 1);
    }

    #[test]
    fn smi_negation() {
        let mut b = FlowGraphBuilder::new("neg", 1);
        let x = b.param(0);
        let ic = IcData::new(1).with_entry(&[ClassId::SMI], 4, None);
        let r = b.instance_call("unary-", &[x], Some(ic));
        b.ret(r);
        let mut g = b.build();
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(op_names(&g), vec!["Parameter", "CheckSmi", "UnarySmiOp", "Return"]);
        let neg = find(&g, |op| matches!(op, Op::UnarySmiOp(_))).unwrap();
        assert_eq!(g.op(neg), &Op::UnarySmiOp(UnaryOp::Negate));
        assert_well_formed(&g);
    }

    #[test]
    fn null_comparison_is_identity() {
        let mut b = FlowGraphBuilder::new("eq", 1);
        let x = b.param(0);
        let null = b.constant(Constant::Null);
        let r = b.instance_call("==", &[x, null], None);
        b.ret(r);
        let mut g = b.build();
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(count(&g, |op| *op == Op::StrictCompare { negate: false }), 1);
        assert_eq!(count(&g, |op| op.is_check()), 0);
        assert_well_formed(&g);
    }

    #[test]
    fn one_char_string_equality_compares_codes() {
        let mut b = FlowGraphBuilder::new("eq", 1);
        let s = b.param(0);
        let a = b.constant(Constant::String("a".into()));
        let ic = two(ClassId::ONE_BYTE_STRING, ClassId::ONE_BYTE_STRING);
        let r = b.instance_call("==", &[s, a], Some(ic));
        b.ret(r);
        let mut g = b.build();
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(count(&g, |op| matches!(op, Op::StringToCharCode)), 1);
        assert!(find(&g, |op| *op == Op::Constant(Constant::Smi(97))).is_some());
        let cmp = find(&g, |op| matches!(op, Op::EqualityCompare { .. })).unwrap();
        assert_eq!(
            g.op(cmp),
            &Op::EqualityCompare {
                kind: CompareKind::Eq,
                operands: NumberKind::Smi
            }
        );
        let code = find(&g, |op| matches!(op, Op::StringToCharCode)).unwrap();
        assert!(!g.op(code).can_deoptimize());
        assert_well_formed(&g);
    }

    #[test]
    fn mint_relational_compare() {
        let mut g = binary("<", two(ClassId::MINT, ClassId::SMI));
        assert!(apply(&mut g, &CompilationUnit::default()));
        let cmp = find(&g, |op| matches!(op, Op::RelationalOp { .. })).unwrap();
        assert_eq!(
            g.op(cmp),
            &Op::RelationalOp {
                kind: CompareKind::Lt,
                operands: NumberKind::Mint
            }
        );
        assert_eq!(count(&g, |op| op.is_check()), 0);
        assert_well_formed(&g);
    }

    #[test]
    fn simd_addition_is_inlined() {
        let mut g = binary("+", two(ClassId::FLOAT32X4, ClassId::FLOAT32X4));
        assert!(apply(&mut g, &CompilationUnit::default()));
        assert_eq!(count(&g, |op| matches!(op, Op::SimdBinary { .. })), 1);
        assert_eq!(count(&g, |op| matches!(op, Op::CheckClass(_))), 2);
        assert_well_formed(&g);
    }
}
