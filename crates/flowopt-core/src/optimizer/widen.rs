use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use crate::error::OptError;
use crate::ir::{loop_blocks, BinaryOp, CidSet, ClassId, InstId, Op, Representation, ValueId};

use super::FlowGraphOptimizer;

/// Smi operations with an int32 form. Shifts qualify only by a constant
/// count below the word width.
fn can_be_widened(op: BinaryOp, count: Option<i64>) -> bool {
    match op {
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor => true,
        BinaryOp::Shl | BinaryOp::Shr => count.is_some_and(|c| (0..32).contains(&c)),
        _ => false,
    }
}

/// Int32 multiplication skips the untagging of one operand, and a right
/// shift skips re-tagging its result.
fn benefits_from_widening(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Mul | BinaryOp::Shr)
}

impl FlowGraphOptimizer<'_> {
    /// On targets whose Smis are narrower than 32 bits, move connected Smi
    /// arithmetic inside loops to unboxed int32 when it saves more
    /// conversions than it adds.
    pub fn widen_smi_to_int32(&mut self) -> Result<bool, OptError> {
        if self.config.target.smi_bits >= 32 {
            return Ok(false);
        }
        let in_loop = loop_blocks(&*self.graph);
        if in_loop.is_empty() {
            return Ok(false);
        }

        let candidates: HashSet<InstId> = self
            .instructions_in_rpo()
            .into_iter()
            .filter(|&i| {
                self.graph.block_of(i).is_some_and(|b| in_loop.contains(&b))
                    && self.is_widenable_op(i)
            })
            .collect();
        if candidates.is_empty() {
            return Ok(false);
        }
        let phis = self.smi_phis(&candidates);

        let mut members: HashSet<InstId> = candidates.union(&phis).copied().collect();
        let mut widened = 0usize;
        let mut order: Vec<InstId> = self
            .phis_in_rpo()
            .into_iter()
            .chain(self.instructions_in_rpo())
            .filter(|i| members.contains(i))
            .collect();
        order.reverse();
        while let Some(seed) = order.pop() {
            if !members.remove(&seed) {
                continue;
            }
            let group = self.collect_group(seed, &mut members);
            let gain = self.widening_gain(&group);
            if gain <= 0 {
                trace!(size = group.len(), gain, "int32 widening not profitable");
                continue;
            }
            if !self.group_is_safe(&group) {
                trace!(size = group.len(), "int32 widening would need a missing environment");
                continue;
            }
            self.widen_group(&group);
            widened += 1;
        }
        if widened > 0 {
            debug!(groups = widened, "widened smi arithmetic to int32");
        }
        Ok(widened > 0)
    }

    fn is_widenable_op(&self, inst: InstId) -> bool {
        let Op::BinarySmiOp { op, .. } = self.graph.op(inst) else {
            return false;
        };
        let count = self
            .graph
            .inputs(inst)
            .get(1)
            .and_then(|v| self.graph.smi_constant(*v));
        can_be_widened(*op, count)
    }

    /// Tagged phis that only ever merge Smis: known Smi values, widenable ops,
    /// or other such phis.
    fn smi_phis(&self, candidates: &HashSet<InstId>) -> HashSet<InstId> {
        let mut phis: HashSet<InstId> = self
            .phis_in_rpo()
            .into_iter()
            .filter(|&p| {
                self.graph
                    .result(p)
                    .is_some_and(|v| self.graph.rep(v) == Representation::Tagged)
            })
            .collect();
        let mut changed = true;
        while changed {
            changed = false;
            let rejected: Vec<InstId> = phis
                .iter()
                .copied()
                .filter(|&phi| {
                    !self.graph.inputs(phi).iter().all(|&v| {
                        let producer = self.graph.producer(v);
                        candidates.contains(&producer)
                            || phis.contains(&producer)
                            || self.graph.known_cid(v) == Some(ClassId::SMI)
                    })
                })
                .collect();
            for phi in rejected {
                phis.remove(&phi);
                changed = true;
            }
        }
        phis
    }

    /// The members reachable from `seed` through def-use edges between
    /// members. Collected members leave `pool`.
    fn collect_group(&self, seed: InstId, pool: &mut HashSet<InstId>) -> Vec<InstId> {
        let mut group = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(inst) = queue.pop_front() {
            let mut neighbours: Vec<InstId> = self
                .graph
                .inputs(inst)
                .iter()
                .map(|v| self.graph.producer(*v))
                .collect();
            if let Some(value) = self.graph.result(inst) {
                neighbours.extend(self.graph.uses(value).iter().map(|u| u.user));
            }
            for n in neighbours {
                if pool.remove(&n) {
                    group.push(n);
                    queue.push_back(n);
                }
            }
        }
        group
    }

    /// Benefiting operations minus the conversions needed where the group
    /// meets tagged code.
    fn widening_gain(&self, group: &[InstId]) -> i64 {
        let in_group = |i: InstId| group.contains(&i);
        let mut gain = 0i64;
        for &inst in group {
            if let Op::BinarySmiOp { op, .. } = self.graph.op(inst) {
                if benefits_from_widening(*op) {
                    gain += 1;
                }
            }
            for &input in self.graph.inputs(inst) {
                let producer = self.graph.producer(input);
                if !in_group(producer) && !matches!(self.graph.op(producer), Op::Constant(_)) {
                    gain -= 1;
                }
            }
            if let Some(value) = self.graph.result(inst) {
                gain -= self
                    .graph
                    .uses(value)
                    .iter()
                    .filter(|u| !in_group(u.user))
                    .count() as i64;
            }
        }
        gain
    }

    /// Operands entering the group from tagged code are unboxed in front of
    /// their reader. Unless they are proven Smis that unbox can deoptimize
    /// and needs the reader's environment.
    fn group_is_safe(&mut self, group: &[InstId]) -> bool {
        let smi = CidSet::single(ClassId::SMI);
        for &inst in group {
            if matches!(self.graph.op(inst), Op::Phi) || self.graph.env(inst).is_some() {
                continue;
            }
            let outside: Vec<ValueId> = self
                .graph
                .inputs(inst)
                .iter()
                .copied()
                .filter(|v| !group.contains(&self.graph.producer(*v)))
                .collect();
            for value in outside {
                if !self.is_proven(value, &smi, inst) {
                    return false;
                }
            }
        }
        true
    }

    fn widen_group(&mut self, group: &[InstId]) {
        for &inst in group {
            if let Op::BinarySmiOp { op, can_overflow } = *self.graph.op(inst) {
                *self.graph.op_mut(inst) = Op::BinaryInt32Op { op, can_overflow };
            }
            if let Some(value) = self.graph.result(inst) {
                self.graph.set_rep(value, Representation::UnboxedInt32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::CompilationUnit;
    use crate::ir::{
        verify, BinaryOp, Constant, FlowGraph, FlowGraphBuilder, Op, Representation, ValueId,
        VerifyLevel,
    };
    use crate::optimizer::test_helpers::{count, with_optimizer};
    use crate::optimizer::FlowGraphOptimizer;
    use crate::pipeline::{OptimizerConfig, TargetConfig};

    fn smi(op: BinaryOp) -> Op {
        Op::BinarySmiOp {
            op,
            can_overflow: op.can_overflow_smi(),
        }
    }

    /// `acc = 0; while (..) acc = (acc * 3) >> 1; return acc;`
    fn mul_shift_loop() -> (FlowGraph, ValueId) {
        let mut b = FlowGraphBuilder::new("f", 1);
        let header = b.create_join_block();
        let body = b.create_target_block();
        let exit = b.create_target_block();
        let zero = b.smi(0);
        b.goto(header);
        b.switch_to_block(header);
        let acc = b.phi(header, &[zero]);
        let cond = b.constant(Constant::Bool(true));
        b.branch(cond, body, exit);
        b.switch_to_block(body);
        let three = b.smi(3);
        let product = b.emit(smi(BinaryOp::Mul), &[acc, three]);
        let one = b.smi(1);
        let shifted = b.emit(smi(BinaryOp::Shr), &[product, one]);
        b.goto(header);
        b.set_phi_inputs(acc, &[zero, shifted]);
        b.switch_to_block(exit);
        b.ret(acc);
        (b.build(), acc)
    }

    /// `i = 0; while (..) i = i + 1; return i;`
    fn counting_loop() -> (FlowGraph, ValueId) {
        let mut b = FlowGraphBuilder::new("f", 0);
        let header = b.create_join_block();
        let body = b.create_target_block();
        let exit = b.create_target_block();
        let zero = b.smi(0);
        b.goto(header);
        b.switch_to_block(header);
        let i = b.phi(header, &[zero]);
        let cond = b.constant(Constant::Bool(true));
        b.branch(cond, body, exit);
        b.switch_to_block(body);
        let one = b.smi(1);
        let next = b.emit(smi(BinaryOp::Add), &[i, one]);
        b.goto(header);
        b.set_phi_inputs(i, &[zero, next]);
        b.switch_to_block(exit);
        b.ret(i);
        (b.build(), i)
    }

    #[test]
    fn profitable_group_becomes_int32() {
        let (mut g, acc) = mul_shift_loop();
        let unit = CompilationUnit::default();
        assert!(with_optimizer(&mut g, &unit, |opt| {
            let widened = opt.widen_smi_to_int32().unwrap();
            opt.select_representations().unwrap();
            widened
        }));
        assert_eq!(g.rep(acc), Representation::UnboxedInt32);
        assert_eq!(count(&g, |op| matches!(op, Op::BinaryInt32Op { .. })), 2);
        assert_eq!(count(&g, |op| matches!(op, Op::BinarySmiOp { .. })), 0);
        assert_eq!(
            count(&g, |op| matches!(op, Op::Box(Representation::UnboxedInt32))),
            1
        );
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn plain_counter_is_not_worth_widening() {
        let (mut g, i) = counting_loop();
        let unit = CompilationUnit::default();
        assert!(!with_optimizer(&mut g, &unit, |opt| opt.widen_smi_to_int32().unwrap()));
        assert_eq!(g.rep(i), Representation::Tagged);
    }

    #[test]
    fn wide_smis_are_left_alone() {
        let (mut g, acc) = mul_shift_loop();
        let unit = CompilationUnit::default();
        let config = OptimizerConfig {
            target: TargetConfig {
                word_size: 8,
                smi_bits: 63,
            },
            ..OptimizerConfig::default()
        };
        let mut opt = FlowGraphOptimizer::new(&mut g, &config, &unit);
        assert!(!opt.widen_smi_to_int32().unwrap());
        assert_eq!(g.rep(acc), Representation::Tagged);
    }

    #[test]
    fn code_outside_loops_is_untouched() {
        let mut b = FlowGraphBuilder::new("f", 0);
        let a = b.smi(6);
        let three = b.smi(3);
        let product = b.emit(smi(BinaryOp::Mul), &[a, three]);
        b.ret(product);
        let mut g = b.build();
        let unit = CompilationUnit::default();
        assert!(!with_optimizer(&mut g, &unit, |opt| opt.widen_smi_to_int32().unwrap()));
    }
}
