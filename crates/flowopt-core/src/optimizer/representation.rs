//! Representation selection: unboxed phis and constants, then explicit
//! conversions wherever a producer and a consumer disagree.

use std::collections::HashMap;

use tracing::debug;

use crate::error::OptError;
use crate::ir::{BlockId, CidSet, ClassId, InstId, Op, Representation, Use, UseSlot, ValueId};

use super::FlowGraphOptimizer;

/// Class lattice of a phi: unvisited, one class, or mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhiClass {
    Unknown,
    Known(ClassId),
    Conflict,
}

impl PhiClass {
    fn meet(self, other: PhiClass) -> PhiClass {
        match (self, other) {
            (PhiClass::Unknown, x) | (x, PhiClass::Unknown) => x,
            (PhiClass::Known(a), PhiClass::Known(b)) if a == b => self,
            _ => PhiClass::Conflict,
        }
    }
}

/// Classes a tagged value must have to be unboxed into `rep` without a check.
fn unboxable_cids(rep: Representation) -> Option<CidSet> {
    match rep {
        Representation::UnboxedInt64 => Some(CidSet::new([ClassId::SMI, ClassId::MINT])),
        Representation::UnboxedInt32 | Representation::UnboxedUint32 => {
            Some(CidSet::single(ClassId::SMI))
        }
        rep => ClassId::for_representation(rep).map(CidSet::single),
    }
}

impl FlowGraphOptimizer<'_> {
    pub fn select_representations(&mut self) -> Result<bool, OptError> {
        let classes = self.phi_classes();
        let mut changed = self.unbox_phis(&classes);
        changed |= self.unbox_constants();

        let defs: Vec<ValueId> = self
            .phis_in_rpo()
            .into_iter()
            .chain(self.instructions_in_rpo())
            .filter_map(|i| self.graph.result(i))
            .collect();
        let before = self.graph.instruction_count();
        for def in defs {
            self.insert_conversions_for(def)?;
        }
        let inserted = self.graph.instruction_count() - before;
        debug!(inserted, "representations selected");

        self.representations_selected = true;
        Ok(changed || inserted > 0)
    }

    /// Class of a phi input that is not itself a phi.
    fn value_class(&self, value: ValueId) -> Option<ClassId> {
        if matches!(
            self.graph.op(self.graph.producer(value)),
            Op::Box(Representation::UnboxedInt64)
        ) {
            return Some(ClassId::MINT);
        }
        match self.graph.rep(value) {
            Representation::UnboxedInt64 => Some(ClassId::MINT),
            Representation::Tagged => self.graph.known_cid(value),
            rep => ClassId::for_representation(rep),
        }
    }

    fn phi_classes(&self) -> HashMap<InstId, PhiClass> {
        let phis = self.phis_in_rpo();
        let mut classes: HashMap<InstId, PhiClass> =
            phis.iter().map(|&p| (p, PhiClass::Unknown)).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &phi in &phis {
                let mut class = PhiClass::Unknown;
                for &input in self.graph.inputs(phi) {
                    let producer = self.graph.producer(input);
                    let input_class = match classes.get(&producer) {
                        Some(c) => *c,
                        None => self
                            .value_class(input)
                            .map_or(PhiClass::Conflict, PhiClass::Known),
                    };
                    class = class.meet(input_class);
                }
                if classes.get(&phi) != Some(&class) {
                    classes.insert(phi, class);
                    changed = true;
                }
            }
        }
        classes
    }

    /// Unbox phis whose class has an unboxed form when at least as many
    /// readers want it unboxed as want it tagged. Environment reads are not
    /// counted; they are boxed afterwards.
    fn unbox_phis(&mut self, classes: &HashMap<InstId, PhiClass>) -> bool {
        let candidates: HashMap<InstId, Representation> = classes
            .iter()
            .filter_map(|(&phi, class)| match class {
                PhiClass::Known(cid) => cid.unboxed_representation().map(|r| (phi, r)),
                _ => None,
            })
            .filter(|(phi, _)| {
                self.graph
                    .result(*phi)
                    .is_some_and(|v| self.graph.rep(v) == Representation::Tagged)
            })
            .collect();

        let mut selected = Vec::new();
        for (&phi, &rep) in &candidates {
            let Some(value) = self.graph.result(phi) else {
                continue;
            };
            let (mut unboxed, mut tagged) = (0usize, 0usize);
            for u in self.graph.uses(value) {
                if u.is_environment_use() {
                    continue;
                }
                let wanted = if matches!(self.graph.op(u.user), Op::Phi) {
                    match candidates.get(&u.user) {
                        Some(r) => *r,
                        None => Representation::Tagged,
                    }
                } else {
                    self.graph.required_rep(*u)
                };
                if wanted == rep {
                    unboxed += 1;
                } else if wanted == Representation::Tagged {
                    tagged += 1;
                }
            }
            if unboxed > 0 && unboxed >= tagged {
                selected.push((value, rep));
            }
        }
        for &(value, rep) in &selected {
            debug!(?value, rep = rep.short_name(), "unboxing phi");
            self.graph.set_rep(value, rep);
        }
        !selected.is_empty()
    }

    /// Constants read only in one unboxed representation are materialized
    /// in it.
    fn unbox_constants(&mut self) -> bool {
        let mut changed = false;
        for inst in self.instructions_in_rpo() {
            let Op::Constant(constant) = self.graph.op(inst) else {
                continue;
            };
            let Some(value) = self.graph.result(inst) else {
                continue;
            };
            let uses = self.graph.uses(value);
            if uses.is_empty() || uses.iter().any(Use::is_environment_use) {
                continue;
            }
            let rep = self.graph.required_rep(uses[0]);
            if !rep.is_unboxed()
                || !constant.is_representable_in(rep)
                || uses.iter().any(|u| self.graph.required_rep(*u) != rep)
            {
                continue;
            }
            let constant = constant.clone();
            *self.graph.op_mut(inst) = Op::UnboxedConstant {
                value: constant,
                rep,
            };
            self.graph.set_rep(value, rep);
            changed = true;
        }
        changed
    }

    /// Make every read of `def` see the representation its reader requires.
    pub fn insert_conversions_for(&mut self, def: ValueId) -> Result<(), OptError> {
        let from = self.graph.rep(def);
        let uses: Vec<Use> = self.graph.uses(def).to_vec();
        // One conversion per reader and target representation.
        let mut converted: HashMap<(InstId, Representation), ValueId> = HashMap::new();
        for u in uses {
            let to = self.graph.required_rep(u);
            if to == from {
                continue;
            }
            let is_phi = matches!(self.graph.op(u.user), Op::Phi);
            if let Some(&value) = converted.get(&(u.user, to)) {
                if !is_phi {
                    self.rewire(u, value)?;
                    continue;
                }
            }
            let value = if u.is_environment_use() {
                self.convert_environment_use(u, from)?
            } else {
                self.convert_use(u, from)?
            };
            converted.insert((u.user, to), value);
        }
        Ok(())
    }

    pub fn convert_use(&mut self, u: Use, from: Representation) -> Result<ValueId, OptError> {
        let to = self.graph.required_rep(u);
        self.insert_conversion(from, to, u, false)
    }

    /// Environments only hold tagged values.
    pub fn convert_environment_use(
        &mut self,
        u: Use,
        from: Representation,
    ) -> Result<ValueId, OptError> {
        self.insert_conversion(from, Representation::Tagged, u, true)
    }

    /// Convert the value read at `u` from `from` to `to` and point the read at
    /// the result. Conversions feeding a phi go at the end of the matching
    /// predecessor; all others right before the reader.
    pub fn insert_conversion(
        &mut self,
        from: Representation,
        to: Representation,
        u: Use,
        is_environment_use: bool,
    ) -> Result<ValueId, OptError> {
        let value = self.read_at(u)?;
        if from == to {
            return Ok(value);
        }
        if !is_environment_use {
            let producer = self.graph.producer(value);
            if self.graph.op(producer) == &Op::Box(to) {
                let raw = self.graph.input(producer, 0);
                self.rewire(u, raw)?;
                return Ok(raw);
            }
        }

        let converted = if to == Representation::Tagged {
            if !from.is_unboxed() {
                return Err(OptError::Invariant(format!(
                    "cannot box {value:?} from {}",
                    from.short_name()
                )));
            }
            self.place_conversion(u, Op::Box(from), value, false)?
        } else if from == Representation::Tagged {
            self.unbox_for(u, value, to)?
        } else if from.is_unboxed_integer() && to.is_unboxed_integer() {
            let op = Op::IntConverter {
                from,
                to,
                truncating: false,
            };
            let deopts = op.can_deoptimize();
            self.place_conversion(u, op, value, deopts)?
        } else if from.is_unboxed_integer() && to == Representation::UnboxedDouble {
            self.place_conversion(u, Op::IntToDouble(from), value, false)?
        } else if from.is_unboxed() && to.is_unboxed() {
            let boxed = self.place_conversion(u, Op::Box(from), value, false)?;
            let unbox = Op::Unbox {
                to,
                speculative: true,
            };
            self.place_conversion(u, unbox, boxed, true)?
        } else {
            return Err(OptError::Invariant(format!(
                "no conversion from {} to {} for {value:?}",
                from.short_name(),
                to.short_name()
            )));
        };
        self.rewire(u, converted)?;
        Ok(converted)
    }

    /// Unbox a tagged `value` for the reader at `u`. Proven classes unbox
    /// without a check; anything else speculates against the reader's
    /// deoptimization point.
    fn unbox_for(
        &mut self,
        u: Use,
        value: ValueId,
        to: Representation,
    ) -> Result<ValueId, OptError> {
        let Some(cids) = unboxable_cids(to) else {
            return Err(OptError::Invariant(format!(
                "cannot unbox {value:?} to {}",
                to.short_name()
            )));
        };
        let at = self.proof_point(u)?;
        if to == Representation::UnboxedDouble
            && self.is_proven(value, &CidSet::single(ClassId::SMI), at)
        {
            return self.place_conversion(u, Op::SmiToDouble, value, false);
        }
        let speculative = !self.is_proven(value, &cids, at);
        self.place_conversion(u, Op::Unbox { to, speculative }, value, speculative)
    }

    /// Where a value read at `u` must be proven: the reader itself, or the
    /// predecessor's terminator for phi inputs.
    fn proof_point(&self, u: Use) -> Result<InstId, OptError> {
        match self.phi_predecessor(u)? {
            Some(pred) => self.graph.terminator(pred).ok_or_else(|| {
                OptError::Invariant(format!("predecessor {pred:?} has no terminator"))
            }),
            None => Ok(u.user),
        }
    }

    fn phi_predecessor(&self, u: Use) -> Result<Option<BlockId>, OptError> {
        if !matches!(self.graph.op(u.user), Op::Phi) {
            return Ok(None);
        }
        let UseSlot::Input(index) = u.slot else {
            return Ok(None);
        };
        let block = self
            .graph
            .block_of(u.user)
            .ok_or_else(|| OptError::Invariant(format!("phi {:?} is not linked", u.user)))?;
        self.graph
            .block(block)
            .preds
            .get(index as usize)
            .copied()
            .map(Some)
            .ok_or_else(|| {
                OptError::Invariant(format!("phi {:?} input {index} has no predecessor", u.user))
            })
    }

    /// Create and link a one-input conversion for the reader at `u`. A
    /// deoptimizing conversion replays to the reader's deoptimization point.
    fn place_conversion(
        &mut self,
        u: Use,
        op: Op,
        input: ValueId,
        deoptimizes: bool,
    ) -> Result<ValueId, OptError> {
        let (inst, value) = self.graph.create_def(op, vec![input]);
        if deoptimizes {
            let env = self
                .graph
                .env(u.user)
                .cloned()
                .ok_or(OptError::MissingEnvironment { inst: u.user })?;
            let deopt_id = self.graph.deopt_id(u.user).unwrap_or(env.deopt_id());
            self.graph.set_deopt_id(inst, Some(deopt_id));
            self.graph.set_env(inst, Some(env));
        }
        match self.phi_predecessor(u)? {
            Some(pred) => self.graph.insert_at_end(pred, inst),
            None => self.graph.insert_before(u.user, inst)?,
        }
        Ok(value)
    }

    fn read_at(&self, u: Use) -> Result<ValueId, OptError> {
        match u.slot {
            UseSlot::Input(i) => Ok(self.graph.input(u.user, i as usize)),
            UseSlot::Env(i) => self
                .graph
                .env(u.user)
                .and_then(|env| env.slots().get(i as usize).copied())
                .ok_or_else(|| {
                    OptError::Invariant(format!("{:?} has no environment slot {i}", u.user))
                }),
        }
    }

    fn rewire(&mut self, u: Use, value: ValueId) -> Result<(), OptError> {
        match u.slot {
            UseSlot::Input(i) => self.graph.set_input(u.user, i as usize, value),
            UseSlot::Env(i) => {
                let tagged = self.graph.tagged(value).ok_or_else(|| {
                    OptError::UntaggedEnvironmentSlot {
                        inst: u.user,
                        value,
                        rep: self.graph.rep(value),
                    }
                })?;
                self.graph.set_env_slot(u.user, i as usize, tagged);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::CompilationUnit;
    use crate::error::OptError;
    use crate::ir::{
        verify, BinaryOp, Constant, FlowGraph, FlowGraphBuilder, Op, Representation, UnaryOp,
        ValueId, VerifyLevel,
    };
    use crate::optimizer::test_helpers::{count, find, with_optimizer};

    fn select(g: &mut FlowGraph) -> Result<bool, OptError> {
        let unit = CompilationUnit::default();
        with_optimizer(g, &unit, |opt| opt.select_representations())
    }

    /// `d = 0.0; while (..) d = d + 1.0; return d;`, optionally reading `d`
    /// in the environment of a call after the loop.
    fn double_loop(env_read: bool) -> (FlowGraph, ValueId) {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        let header = b.create_join_block();
        let body = b.create_target_block();
        let exit = b.create_target_block();
        let zero = b.double(0.0);
        b.goto(header);
        b.switch_to_block(header);
        let d = b.phi(header, &[zero]);
        let cond = b.constant(Constant::Bool(true));
        b.branch(cond, body, exit);
        b.switch_to_block(body);
        let one = b.double(1.0);
        let next = b.emit(Op::BinaryDoubleOp(BinaryOp::Add), &[d, one]);
        b.goto(header);
        b.set_phi_inputs(d, &[zero, next]);
        b.switch_to_block(exit);
        if env_read {
            b.push_local(d);
            let r = b.instance_call("foo", &[x], None);
            b.ret(r);
        } else {
            b.ret(d);
        }
        (b.build(), d)
    }

    #[test]
    fn double_loop_phi_is_unboxed() {
        let (mut g, d) = double_loop(false);
        assert!(select(&mut g).unwrap());
        assert_eq!(g.rep(d), Representation::UnboxedDouble);
        assert_eq!(count(&g, |op| matches!(op, Op::Box(_))), 1);
        assert_eq!(count(&g, |op| matches!(op, Op::Unbox { .. })), 0);
        assert_eq!(count(&g, |op| matches!(op, Op::UnboxedConstant { .. })), 2);
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn unboxed_phi_in_environment_is_boxed() {
        let (mut g, d) = double_loop(true);
        select(&mut g).unwrap();
        assert_eq!(g.rep(d), Representation::UnboxedDouble);
        let call = find(&g, |op| matches!(op, Op::InstanceCall(_))).unwrap();
        let slot = *g.env(call).unwrap().slots().last().unwrap();
        assert_eq!(g.rep(slot), Representation::Tagged);
        assert!(matches!(g.op(g.producer(slot)), Op::Box(Representation::UnboxedDouble)));
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn phi_input_conversion_lands_in_predecessor() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let entry = b.entry_block();
        let header = b.create_join_block();
        let body = b.create_target_block();
        let exit = b.create_target_block();
        let zero = b.double(0.0);
        b.goto(header);
        b.switch_to_block(header);
        let d = b.phi(header, &[zero]);
        let cond = b.constant(Constant::Bool(true));
        b.branch(cond, body, exit);
        b.switch_to_block(body);
        let next = b.emit(Op::BinaryDoubleOp(BinaryOp::Mul), &[d, d]);
        b.goto(header);
        b.set_phi_inputs(d, &[zero, next]);
        b.switch_to_block(exit);
        // Keeps the constant tagged.
        b.ret(zero);
        let mut g = b.build();

        select(&mut g).unwrap();
        assert_eq!(g.rep(d), Representation::UnboxedDouble);
        let unbox = find(&g, |op| matches!(op, Op::Unbox { .. })).unwrap();
        assert_eq!(g.block_of(unbox), Some(entry));
        assert_eq!(
            g.op(unbox),
            &Op::Unbox {
                to: Representation::UnboxedDouble,
                speculative: false
            }
        );
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn speculative_unbox_replays_to_reader() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        let sum = b.emit(
            Op::BinaryMintOp {
                op: BinaryOp::Add,
                can_overflow: true,
            },
            &[x, y],
        );
        let boxed = b.emit(Op::Box(Representation::UnboxedInt64), &[sum]);
        b.ret(boxed);
        let mut g = b.build();
        let add = g.producer(sum);

        select(&mut g).unwrap();
        let unboxes: Vec<_> = g
            .linked_instructions()
            .into_iter()
            .filter(|i| matches!(g.op(*i), Op::Unbox { speculative: true, .. }))
            .collect();
        assert_eq!(unboxes.len(), 2);
        for unbox in unboxes {
            assert_eq!(g.deopt_id(unbox), g.deopt_id(add));
            assert_eq!(g.env(unbox), g.env(add));
        }
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn speculation_without_environment_is_fatal() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        let and = b.emit(
            Op::BinaryMintOp {
                op: BinaryOp::BitAnd,
                can_overflow: false,
            },
            &[x, y],
        );
        let boxed = b.emit(Op::Box(Representation::UnboxedInt64), &[and]);
        b.ret(boxed);
        let mut g = b.build();
        assert!(matches!(
            select(&mut g),
            Err(OptError::MissingEnvironment { .. })
        ));
    }

    #[test]
    fn checked_smi_converts_to_double_once() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        b.emit_void(Op::CheckSmi, &[x]);
        let sq = b.emit(Op::BinaryDoubleOp(BinaryOp::Mul), &[x, x]);
        let boxed = b.emit(Op::Box(Representation::UnboxedDouble), &[sq]);
        b.ret(boxed);
        let mut g = b.build();

        select(&mut g).unwrap();
        assert_eq!(count(&g, |op| matches!(op, Op::SmiToDouble)), 1);
        assert_eq!(count(&g, |op| matches!(op, Op::Unbox { .. })), 0);
        let mul = g.producer(sq);
        assert_eq!(g.inputs(mul)[0], g.inputs(mul)[1]);
        verify(&g, VerifyLevel::Output).unwrap();
    }

    #[test]
    fn box_feeding_matching_unboxed_reader_is_bypassed() {
        let mut b = FlowGraphBuilder::new("f", 0);
        let c = b.double(2.0);
        let root = b.emit(Op::UnaryDoubleOp(UnaryOp::Negate), &[c]);
        let boxed = b.emit(Op::Box(Representation::UnboxedDouble), &[root]);
        let neg = b.emit(Op::UnaryDoubleOp(UnaryOp::Negate), &[boxed]);
        let out = b.emit(Op::Box(Representation::UnboxedDouble), &[neg]);
        b.ret(out);
        let mut g = b.build();

        select(&mut g).unwrap();
        assert_eq!(g.inputs(g.producer(neg)), &[root]);
        assert!(!g.has_uses(boxed));
        verify(&g, VerifyLevel::Output).unwrap();
    }
}
