//! Feedback-driven specialization of calls and a few allocation/store
//! visitors that only make sense before representations are chosen.

use tracing::{debug, trace};

use crate::error::OptError;
use crate::ir::{
    ClassId, Constant, IcData, InstId, InstanceCall, MathKind, Op, RecognizedKind,
    SelectorKind, Slot, TypeTest,
};

use super::FlowGraphOptimizer;

/// Contexts with more variables stay a single runtime allocation.
const MAX_EXPANDED_CONTEXT_VARIABLES: u32 = 8;

impl FlowGraphOptimizer<'_> {
    /// Attach feedback to every call that has none: the stored record for
    /// its deopt id, or an empty one with the right number of tested
    /// arguments.
    pub fn populate_with_ic_data(&mut self) -> bool {
        let mut changed = false;
        let unit = self.unit;
        for inst in self.instructions_in_rpo() {
            let stored = self
                .graph
                .deopt_id(inst)
                .and_then(|d| unit.feedback.get(d))
                .cloned();
            match self.graph.op_mut(inst) {
                Op::InstanceCall(call) if call.ic_data.is_none() => {
                    let tested =
                        SelectorKind::classify(&call.selector, call.arg_count).num_args_tested();
                    call.ic_data = Some(stored.unwrap_or_else(|| IcData::new(tested)));
                    changed = true;
                }
                Op::StaticCall(call) if call.ic_data.is_none() => {
                    call.ic_data = Some(stored.unwrap_or_else(|| IcData::new(1)));
                    changed = true;
                }
                _ => {}
            }
        }
        changed
    }

    /// Rewrite calls according to their feedback. Calls without a safe
    /// specialization stay generic.
    pub fn apply_ic_data(&mut self) -> Result<bool, OptError> {
        let mut changed = false;
        for inst in self.instructions_in_rpo() {
            if !self.graph.is_linked(inst) {
                continue;
            }
            changed |= match self.graph.op(inst) {
                Op::InstanceCall(_) => self.visit_instance_call(inst)?,
                Op::StaticCall(_) => self.visit_static_call(inst)?,
                Op::StoreInstanceField { .. } => self.visit_store_instance_field(inst),
                Op::AllocateContext { .. } => self.visit_allocate_context(inst)?,
                Op::LoadCodeUnits { .. } => self.visit_load_code_units(inst)?,
                _ => false,
            };
        }
        debug!(changed, "applied feedback");
        Ok(changed)
    }

    pub(crate) fn visit_instance_call(&mut self, inst: InstId) -> Result<bool, OptError> {
        let Op::InstanceCall(call) = self.graph.op(inst) else {
            return Ok(false);
        };
        let call = call.clone();
        let ic = call.ic_data.clone().unwrap_or_else(|| IcData::new(1));
        let kind = SelectorKind::classify(&call.selector, call.arg_count);
        // Null comparisons need no feedback.
        if ic.is_empty() && kind != SelectorKind::Equality {
            trace!(selector = %call.selector, "no feedback");
            return Ok(false);
        }

        let replaced = match &kind {
            SelectorKind::Binary(op) => self.try_replace_with_binary_op(inst, *op, &ic)?,
            SelectorKind::Unary(op) => self.try_replace_with_unary_op(inst, *op, &ic)?,
            SelectorKind::Equality => self.try_replace_with_equality_op(inst, &ic)?,
            SelectorKind::Relational(cmp) => self.try_replace_with_relational_op(inst, *cmp, &ic)?,
            SelectorKind::IndexGet | SelectorKind::IndexSet => {
                self.try_replace_with_indexed_op(inst, &call.selector, &ic)?
            }
            SelectorKind::Getter(_) => self.try_inline_instance_getter(inst, &call, &ic)?,
            SelectorKind::Setter(_) => self.try_inline_instance_setter(inst, &call, &ic)?,
            SelectorKind::InstanceOf => match call.type_test {
                Some(test) => self.replace_with_instance_of(inst, test, &ic)?,
                None => false,
            },
            SelectorKind::TypeCast => match call.type_test {
                Some(test) => self.replace_with_type_cast(inst, test, &ic)?,
                None => false,
            },
            SelectorKind::Method(_) => self.try_inline_instance_method(inst, &call, &ic)?,
        };
        if replaced || ic.is_empty() {
            return Ok(replaced);
        }
        self.try_dispatch_by_feedback(inst, &call, &ic)
    }

    pub(crate) fn visit_static_call(&mut self, inst: InstId) -> Result<bool, OptError> {
        let Op::StaticCall(call) = self.graph.op(inst) else {
            return Ok(false);
        };
        let Some(kind) = call.target.recognized() else {
            return Ok(false);
        };
        let ic = call.ic_data.clone().filter(|ic| !ic.is_empty());

        if let RecognizedKind::Math(math) = kind {
            if math != MathKind::Sqrt {
                return self.replace_with_math_c_function(inst, math, ic.as_ref());
            }
        }
        let receiver = (!kind.is_static()).then(|| self.graph.input(inst, 0));
        let receiver_cid = ic
            .as_ref()
            .and_then(|ic| ic.receiver_cids().single_cid())
            .or_else(|| receiver.and_then(|r| self.graph.known_cid(r)));
        Ok(self
            .try_inline_recognized_method(receiver_cid, kind, inst, receiver, ic.as_ref())?
            .is_some())
    }

    /// Propagate statically known classes: drop proven checks, specialize
    /// calls whose argument classes are known, and narrow polymorphic calls
    /// on a proven receiver.
    pub fn apply_class_ids(&mut self) -> Result<bool, OptError> {
        let mut changed = false;
        for inst in self.instructions_in_rpo() {
            if !self.graph.is_linked(inst) {
                continue;
            }
            changed |= match self.graph.op(inst) {
                Op::CheckSmi | Op::CheckClass(_) => self.try_remove_redundant_check(inst)?,
                Op::InstanceCall(_) => self.visit_instance_call_with_class_ids(inst)?,
                Op::PolymorphicInstanceCall(_) => self.specialize_polymorphic_instance_call(inst)?,
                _ => false,
            };
        }
        debug!(changed, "applied class ids");
        Ok(changed)
    }

    fn try_remove_redundant_check(&mut self, check: InstId) -> Result<bool, OptError> {
        let Some(cids) = super::checks::checked_cids(self.graph.op(check)) else {
            return Ok(false);
        };
        let value = self.graph.input(check, 0);
        if !self.is_proven(value, &cids, check) {
            return Ok(false);
        }
        trace!(?check, "removing redundant check");
        self.graph.remove_instr(check)?;
        Ok(true)
    }

    fn visit_instance_call_with_class_ids(&mut self, inst: InstId) -> Result<bool, OptError> {
        let derived = match self.call_ic_data(inst) {
            Some(ic) if !ic.is_empty() => self.try_specialize_ic_data(inst, ic),
            _ => self.try_create_ic_data(inst),
        };
        let Some(ic) = derived else {
            return Ok(false);
        };
        self.set_call_ic_data(inst, ic);
        self.visit_instance_call(inst)
    }

    /// `x is C`: a constant when the class of `x` is known, otherwise a
    /// class-id table over the observed receivers. Declines when the class
    /// table cannot decide one of the answers.
    pub fn replace_with_instance_of(
        &mut self,
        call: InstId,
        test: TypeTest,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let value = self.graph.input(call, 0);
        let unit = self.unit;
        let table = &unit.class_table;
        if let Some(cid) = self.graph.known_cid(value) {
            let Some(is_subclass) = table.decide_subclass(cid, test.class) else {
                trace!(?call, ?cid, "class hierarchy unknown for instanceof");
                return Ok(false);
            };
            let result = is_subclass != test.negate;
            let constant = self.constant_before(call, Constant::Bool(result))?;
            self.replace_with_value(call, constant)?;
            return Ok(true);
        }
        if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            trace!(?call, "instanceof site is blacklisted");
            return Ok(false);
        }
        let cids = ic.as_unary().receiver_cids();
        if cids.is_empty() || cids.len() > self.config.max_polymorphic_checks {
            return Ok(false);
        }
        let Some(results) = cids
            .iter()
            .map(|cid| {
                let is_subclass = table.decide_subclass(cid, test.class)?;
                Some((cid, is_subclass != test.negate))
            })
            .collect::<Option<Vec<_>>>()
        else {
            trace!(?call, "class hierarchy unknown for instanceof");
            return Ok(false);
        };
        self.replace_with_op(
            call,
            Op::TestCids {
                table: results,
                default: None,
            },
            vec![value],
        )?;
        Ok(true)
    }

    /// `x as C` where every observed class passes: a class guard, and the
    /// cast's readers read `x` directly.
    pub fn replace_with_type_cast(
        &mut self,
        call: InstId,
        test: TypeTest,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let value = self.graph.input(call, 0);
        let unit = self.unit;
        let table = &unit.class_table;
        let passes = |cid: ClassId| cid == ClassId::NULL || table.is_subclass_of(cid, test.class);

        if self.graph.known_cid(value).is_some_and(passes) {
            self.replace_with_value(call, value)?;
            return Ok(true);
        }
        let cids = ic.as_unary().receiver_cids();
        if cids.is_empty() || !cids.iter().all(passes) {
            return Ok(false);
        }
        let deopt_id = self.graph.deopt_id(call);
        if self.is_black_listed_for_inlining(deopt_id) {
            trace!(?call, "cast site is blacklisted");
            return Ok(false);
        }
        let env = self.graph.env(call).cloned();
        self.add_check_class(value, &cids, deopt_id, env.as_ref(), call)?;
        self.replace_with_value(call, value)?;
        Ok(true)
    }

    /// Store doubles into double-guarded fields without boxing.
    pub(crate) fn visit_store_instance_field(&mut self, inst: InstId) -> bool {
        if self.representations_selected {
            return false;
        }
        let Op::StoreInstanceField { slot, unboxed } = self.graph.op(inst) else {
            return false;
        };
        if *unboxed || slot.cid != Some(ClassId::DOUBLE) {
            return false;
        }
        let value = self.graph.input(inst, 1);
        if self.graph.known_cid(value) != Some(ClassId::DOUBLE) {
            return false;
        }
        if let Op::StoreInstanceField { unboxed, .. } = self.graph.op_mut(inst) {
            *unboxed = true;
        }
        true
    }

    /// Expand a small context allocation into an uninitialized allocation
    /// followed by explicit null stores.
    pub(crate) fn visit_allocate_context(&mut self, inst: InstId) -> Result<bool, OptError> {
        let Op::AllocateContext { num_variables } = *self.graph.op(inst) else {
            return Ok(false);
        };
        if num_variables > MAX_EXPANDED_CONTEXT_VARIABLES {
            return Ok(false);
        }
        let null = self.constant_before(inst, Constant::Null)?;
        let (alloc, context) = self
            .graph
            .create_def(Op::AllocateUninitializedContext { num_variables }, Vec::new());
        self.graph.inherit_deopt_info(inst, alloc);
        self.graph.insert_before(inst, alloc)?;
        for index in 0..num_variables {
            let store = self.graph.create_inst(
                Op::StoreInstanceField {
                    slot: Slot::context_variable(index),
                    unboxed: false,
                },
                vec![context, null],
            );
            self.graph.insert_before(inst, store)?;
        }
        self.replace_with_value(inst, context)?;
        Ok(true)
    }

    /// Several code units read at once overflow a Smi on narrow targets;
    /// such loads produce a mint.
    pub(crate) fn visit_load_code_units(&mut self, inst: InstId) -> Result<bool, OptError> {
        if self.representations_selected {
            return Ok(false);
        }
        let Op::LoadCodeUnits {
            class_id,
            element_count,
            can_be_mint: false,
        } = *self.graph.op(inst)
        else {
            return Ok(false);
        };
        let bits_per_unit = if class_id.is_one_byte_string() { 8 } else { 16 };
        let payload_bits = self.config.target.smi_bits - 1;
        if u32::from(element_count) * bits_per_unit <= payload_bits {
            return Ok(false);
        }
        let inputs = self.graph.inputs(inst).to_vec();
        self.replace_with_op(
            inst,
            Op::LoadCodeUnits {
                class_id,
                element_count,
                can_be_mint: true,
            },
            inputs,
        )?;
        Ok(true)
    }

    pub(crate) fn set_call_ic_data(&mut self, call: InstId, ic: IcData) {
        match self.graph.op_mut(call) {
            Op::InstanceCall(InstanceCall { ic_data, .. }) => *ic_data = Some(ic),
            Op::StaticCall(c) => c.ic_data = Some(ic),
            _ => {}
        }
    }
}
