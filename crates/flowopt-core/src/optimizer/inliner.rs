//! Recognized-method inlining.
//!
//! Replacements are built as a detached [`Sequence`]: instructions are
//! created unlinked, so nothing in the graph changes until the sequence is
//! committed. A declined inline simply drops the sequence and leaves the call
//! as it was.

use tracing::{debug, trace};

use crate::error::OptError;
use crate::ir::{
    BinaryOp, CidSet, ClassId, Constant, DeoptId, ElementKind, Environment, IcData, InstId,
    InstanceCall, MathKind, MathUnaryKind, Op, RecognizedKind, Representation, SimdKind, Slot,
    Target, TargetKind, ValueId,
};

use super::FlowGraphOptimizer;

/// Word offset of the payload pointer in external typed data.
const EXTERNAL_DATA_OFFSET: u32 = 2;

/// First and last instruction of a committed inline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlinedSequence {
    pub entry: InstId,
    pub last: InstId,
}

/// Instructions replacing one call, not yet linked.
pub(crate) struct Sequence {
    call: InstId,
    deopt_id: Option<DeoptId>,
    env: Environment,
    insts: Vec<InstId>,
}

/// The class and recognized method of a monomorphic call site.
pub(crate) fn monomorphic_recognized(
    ic: &IcData,
    selector: &str,
) -> Option<(ClassId, RecognizedKind)> {
    let unary = ic.as_unary();
    let cid = unary.receiver_cids().single_cid()?;
    let kind = unary
        .unique_target()
        .and_then(Target::recognized)
        .or_else(|| RecognizedKind::for_receiver(cid, selector))?;
    Some((cid, kind))
}

/// Field every entry's implicit accessor targets, if they agree.
fn accessor_field(ic: &IcData, getter: bool) -> Option<String> {
    let mut name: Option<&String> = None;
    for entry in &ic.entries {
        let field = match entry.target.as_ref().map(|t| &t.kind) {
            Some(TargetKind::ImplicitGetter { field }) if getter => field,
            Some(TargetKind::ImplicitSetter { field }) if !getter => field,
            _ => return None,
        };
        match name {
            None => name = Some(field),
            Some(n) if n == field => {}
            Some(_) => return None,
        }
    }
    name.cloned()
}

struct FieldLayout {
    offset: u32,
    guarded_cid: Option<ClassId>,
    is_final: bool,
}

impl FlowGraphOptimizer<'_> {
    // -- sequences --

    pub(crate) fn begin_sequence(&self, call: InstId) -> Result<Sequence, OptError> {
        let env = self
            .graph
            .env(call)
            .cloned()
            .ok_or(OptError::MissingEnvironment { inst: call })?;
        Ok(Sequence {
            call,
            deopt_id: self.graph.deopt_id(call),
            env,
            insts: Vec::new(),
        })
    }

    /// Give `inst` the call's deopt point when it may need one: it can
    /// deoptimize itself, or its unboxed inputs may need a speculative unbox.
    fn attach(&mut self, seq: &mut Sequence, inst: InstId) {
        let op = self.graph.op(inst);
        let needs_env = op.can_deoptimize()
            || (0..self.graph.inputs(inst).len())
                .any(|i| op.required_input_representation(i).is_unboxed());
        if needs_env {
            self.graph.set_deopt_id(inst, seq.deopt_id);
            self.graph.set_env(inst, Some(seq.env.clone()));
        }
        seq.insts.push(inst);
    }

    pub(crate) fn seq_def(&mut self, seq: &mut Sequence, op: Op, inputs: Vec<ValueId>) -> ValueId {
        let (inst, value) = self.graph.create_def(op, inputs);
        self.attach(seq, inst);
        value
    }

    pub(crate) fn seq_void(&mut self, seq: &mut Sequence, op: Op, inputs: Vec<ValueId>) -> InstId {
        let inst = self.graph.create_inst(op, inputs);
        self.attach(seq, inst);
        inst
    }

    /// Guard `value` against `cids` unless already proven at the call or
    /// guarded earlier in the sequence.
    pub(crate) fn seq_check(&mut self, seq: &mut Sequence, value: ValueId, cids: &CidSet) {
        if self.is_proven(value, cids, seq.call) {
            return;
        }
        let pending = seq.insts.iter().any(|&i| {
            self.graph.inputs(i).first() == Some(&value)
                && super::checks::checked_cids(self.graph.op(i)).is_some_and(|s| s.is_subset_of(cids))
        });
        if pending {
            return;
        }
        let check = self.get_check_class(value, cids, seq.deopt_id);
        self.graph.set_env(check, Some(seq.env.clone()));
        seq.insts.push(check);
    }

    /// A double operand for `value`: doubles are guarded, Smis guarded and
    /// converted. `seen` are the classes feedback observed for it.
    pub(crate) fn seq_double_operand(
        &mut self,
        seq: &mut Sequence,
        value: ValueId,
        seen: &CidSet,
    ) -> Option<ValueId> {
        let cid = self.graph.known_cid(value).or_else(|| seen.single_cid())?;
        match cid {
            ClassId::DOUBLE => {
                self.seq_check(seq, value, &CidSet::single(ClassId::DOUBLE));
                Some(value)
            }
            ClassId::SMI => {
                self.seq_check(seq, value, &CidSet::single(ClassId::SMI));
                Some(self.seq_def(seq, Op::SmiToDouble, vec![value]))
            }
            _ => None,
        }
    }

    /// Link the sequence before its call and retire the call; readers of the
    /// call's result read `result`, boxed if needed.
    pub(crate) fn commit_sequence(
        &mut self,
        mut seq: Sequence,
        result: ValueId,
    ) -> Result<InlinedSequence, OptError> {
        let rep = self.graph.rep(result);
        let result = if rep == Representation::Tagged {
            result
        } else {
            self.seq_def(&mut seq, Op::Box(rep), vec![result])
        };
        let (Some(&entry), Some(&last)) = (seq.insts.first(), seq.insts.last()) else {
            return Err(OptError::Invariant(format!(
                "empty replacement for {:?}",
                seq.call
            )));
        };
        for &inst in &seq.insts {
            self.graph.insert_before(seq.call, inst)?;
        }
        self.replace_with_value(seq.call, result)?;
        Ok(InlinedSequence { entry, last })
    }

    // -- recognized methods --

    /// Replace `call` by an inline form of the recognized method `target`.
    ///
    /// `receiver` is `None` for static methods. Receiver methods need the
    /// receiver class; the receiver is guarded against it unless already
    /// proven. Returns `None`, with the graph untouched, when the method
    /// cannot be inlined for this receiver or the site is blacklisted.
    pub fn try_inline_recognized_method(
        &mut self,
        receiver_cid: Option<ClassId>,
        target: RecognizedKind,
        call: InstId,
        receiver: Option<ValueId>,
        ic_data: Option<&IcData>,
    ) -> Result<Option<InlinedSequence>, OptError> {
        if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            trace!(?target, "inlining blacklisted");
            return Ok(None);
        }
        let args = self.graph.inputs(call).to_vec();
        let mut seq = self.begin_sequence(call)?;
        if !target.is_static() {
            let (Some(cid), Some(receiver)) = (receiver_cid, receiver) else {
                trace!(?target, "receiver class unknown");
                return Ok(None);
            };
            self.seq_check(&mut seq, receiver, &CidSet::single(cid));
        }

        let Some(result) = self.inline_recognized(&mut seq, receiver_cid, target, &args, ic_data)
        else {
            trace!(?target, ?receiver_cid, "inline declined");
            return Ok(None);
        };
        let inlined = self.commit_sequence(seq, result)?;
        debug!(?target, "inlined recognized method");
        Ok(Some(inlined))
    }

    fn inline_recognized(
        &mut self,
        seq: &mut Sequence,
        cid: Option<ClassId>,
        kind: RecognizedKind,
        args: &[ValueId],
        ic: Option<&IcData>,
    ) -> Option<ValueId> {
        use RecognizedKind as K;
        match kind {
            K::ObjectArrayGetIndexed
            | K::ImmutableArrayGetIndexed
            | K::GrowableArrayGetIndexed
            | K::TypedDataGetIndexed => {
                let cid = cid.filter(|c| indexed_receiver_matches(kind, *c))?;
                self.inline_indexed_get(seq, cid, args)
            }
            K::ObjectArraySetIndexed | K::GrowableArraySetIndexed | K::TypedDataSetIndexed => {
                let cid = cid.filter(|c| indexed_receiver_matches(kind, *c))?;
                self.inline_indexed_set(seq, cid, args)
            }
            K::ByteArrayBaseGet(view) => self.inline_byte_view(seq, cid?, view, args, false),
            K::ByteArrayBaseSet(view) => self.inline_byte_view(seq, cid?, view, args, true),
            K::StringBaseCodeUnitAt | K::StringBaseCharAt => {
                self.inline_string_char(seq, cid?, kind == K::StringBaseCharAt, args)
            }
            K::StringBaseLength
            | K::ObjectArrayLength
            | K::ImmutableArrayLength
            | K::GrowableArrayLength
            | K::TypedDataLength => {
                let cid = cid?;
                let matches = match kind {
                    K::StringBaseLength => cid.is_string(),
                    K::ObjectArrayLength => cid == ClassId::ARRAY,
                    K::ImmutableArrayLength => cid == ClassId::IMMUTABLE_ARRAY,
                    K::GrowableArrayLength => cid == ClassId::GROWABLE_ARRAY,
                    _ => cid.is_typed_data() || cid.is_external_typed_data(),
                };
                let receiver = *args.first()?;
                matches.then(|| self.seq_def(seq, Op::LoadField(Slot::length()), vec![receiver]))
            }
            K::DoubleAdd | K::DoubleSub | K::DoubleMul | K::DoubleDiv => {
                if cid != Some(ClassId::DOUBLE) {
                    return None;
                }
                let op = match kind {
                    K::DoubleAdd => BinaryOp::Add,
                    K::DoubleSub => BinaryOp::Sub,
                    K::DoubleMul => BinaryOp::Mul,
                    _ => BinaryOp::Div,
                };
                let (receiver, arg) = (*args.first()?, *args.get(1)?);
                let seen = ic.map(|ic| ic.arg_cids(1)).unwrap_or_default();
                let arg = self.seq_double_operand(seq, arg, &seen)?;
                Some(self.seq_def(seq, Op::BinaryDoubleOp(op), vec![receiver, arg]))
            }
            K::Math(math) => self.inline_math(seq, math, args, ic),
            K::SimdConstructor(simd) => {
                if args.len() != usize::from(simd.lanes()) {
                    return None;
                }
                let mut lanes = Vec::with_capacity(args.len());
                for (i, &arg) in args.iter().enumerate() {
                    lanes.push(self.seq_lane_operand(seq, simd, arg, ic, i)?);
                }
                Some(self.seq_def(seq, Op::SimdConstruct(simd), lanes))
            }
            K::SimdZero(simd) => Some(self.seq_def(seq, Op::SimdZero(simd), Vec::new())),
            K::SimdSplat(simd) => {
                let lane = self.seq_lane_operand(seq, simd, *args.first()?, ic, 0)?;
                Some(self.seq_def(seq, Op::SimdSplat(simd), vec![lane]))
            }
            K::SimdGetLane(simd, lane) => {
                if cid != Some(simd.cid()) {
                    return None;
                }
                Some(self.seq_def(
                    seq,
                    Op::SimdGetLane { kind: simd, lane },
                    vec![*args.first()?],
                ))
            }
            K::SimdBinary(simd, op) => {
                if cid != Some(simd.cid()) {
                    return None;
                }
                let (receiver, arg) = (*args.first()?, *args.get(1)?);
                let seen = ic.map(|ic| ic.arg_cids(1)).unwrap_or_default();
                let arg_cid = self.graph.known_cid(arg).or_else(|| seen.single_cid());
                if arg_cid != Some(simd.cid()) {
                    return None;
                }
                self.seq_check(seq, arg, &CidSet::single(simd.cid()));
                Some(self.seq_def(seq, Op::SimdBinary { kind: simd, op }, vec![receiver, arg]))
            }
        }
    }

    /// `CheckSmi(index)`, the length and `CheckArrayBound`. A positive
    /// `reserve` shrinks the length for accesses wider than one element.
    fn seq_bounds_check(&mut self, seq: &mut Sequence, receiver: ValueId, index: ValueId, reserve: u32) {
        self.seq_check(seq, index, &CidSet::single(ClassId::SMI));
        let mut length = self.seq_def(seq, Op::LoadField(Slot::length()), vec![receiver]);
        if reserve > 0 {
            let reserved = self.seq_def(seq, Op::Constant(Constant::Smi(reserve.into())), Vec::new());
            length = self.seq_def(
                seq,
                Op::BinarySmiOp {
                    op: BinaryOp::Sub,
                    can_overflow: false,
                },
                vec![length, reserved],
            );
        }
        self.seq_void(seq, Op::CheckArrayBound, vec![length, index]);
    }

    /// Backing store of an indexable receiver and the class describing it.
    fn seq_elements(&mut self, seq: &mut Sequence, cid: ClassId, receiver: ValueId) -> (ValueId, ClassId) {
        if cid == ClassId::GROWABLE_ARRAY {
            let data = self.seq_def(seq, Op::LoadField(Slot::growable_data()), vec![receiver]);
            (data, ClassId::ARRAY)
        } else if cid.is_external_typed_data() {
            let data = self.seq_def(
                seq,
                Op::LoadUntagged {
                    offset: EXTERNAL_DATA_OFFSET,
                },
                vec![receiver],
            );
            (data, cid)
        } else {
            (receiver, cid)
        }
    }

    fn index_scale(&self, kind: ElementKind) -> u32 {
        kind.size_in_bytes(self.config.target.word_size)
    }

    fn inline_indexed_get(&mut self, seq: &mut Sequence, cid: ClassId, args: &[ValueId]) -> Option<ValueId> {
        let (receiver, index) = (*args.first()?, *args.get(1)?);
        let element = cid.element_kind()?;
        self.seq_bounds_check(seq, receiver, index, 0);
        let (elements, array_cid) = self.seq_elements(seq, cid, receiver);
        let index_scale = self.index_scale(element);
        Some(self.seq_def(
            seq,
            Op::LoadIndexed {
                class_id: array_cid,
                index_scale,
            },
            vec![elements, index],
        ))
    }

    fn inline_indexed_set(&mut self, seq: &mut Sequence, cid: ClassId, args: &[ValueId]) -> Option<ValueId> {
        let (receiver, index, value) = (*args.first()?, *args.get(1)?, *args.get(2)?);
        let element = cid.element_kind()?;
        self.seq_bounds_check(seq, receiver, index, 0);
        if let Some(value_cid) = element.store_value_cid() {
            self.seq_check(seq, value, &CidSet::single(value_cid));
        }
        let (elements, array_cid) = self.seq_elements(seq, cid, receiver);
        let index_scale = self.index_scale(element);
        self.seq_void(
            seq,
            Op::StoreIndexed {
                class_id: array_cid,
                index_scale,
            },
            vec![elements, index, value],
        );
        Some(value)
    }

    /// `_getXxx(offset)` / `_setXxx(offset, value)` on a byte-addressed
    /// internal typed-data receiver.
    fn inline_byte_view(
        &mut self,
        seq: &mut Sequence,
        cid: ClassId,
        view: ElementKind,
        args: &[ValueId],
        is_store: bool,
    ) -> Option<ValueId> {
        let receiver_element = cid.element_kind()?;
        if !cid.is_typed_data() || self.index_scale(receiver_element) != 1 {
            return None;
        }
        let view_cid = view.typed_data_class()?;
        let (receiver, offset) = (*args.first()?, *args.get(1)?);
        let value = if is_store { Some(*args.get(2)?) } else { None };

        let size = self.index_scale(view);
        self.seq_bounds_check(seq, receiver, offset, size - 1);
        match value {
            None => Some(self.seq_def(
                seq,
                Op::LoadIndexed {
                    class_id: view_cid,
                    index_scale: 1,
                },
                vec![receiver, offset],
            )),
            Some(value) => {
                if let Some(value_cid) = view.store_value_cid() {
                    self.seq_check(seq, value, &CidSet::single(value_cid));
                }
                self.seq_void(
                    seq,
                    Op::StoreIndexed {
                        class_id: view_cid,
                        index_scale: 1,
                    },
                    vec![receiver, offset, value],
                );
                Some(value)
            }
        }
    }

    fn inline_string_char(
        &mut self,
        seq: &mut Sequence,
        cid: ClassId,
        as_string: bool,
        args: &[ValueId],
    ) -> Option<ValueId> {
        if !cid.is_string() || cid.is_external_string() {
            return None;
        }
        if as_string && !cid.is_one_byte_string() {
            return None;
        }
        let (receiver, index) = (*args.first()?, *args.get(1)?);
        let element = cid.element_kind()?;
        self.seq_bounds_check(seq, receiver, index, 0);
        let index_scale = self.index_scale(element);
        let code = self.seq_def(
            seq,
            Op::LoadIndexed {
                class_id: cid,
                index_scale,
            },
            vec![receiver, index],
        );
        if as_string {
            Some(self.seq_def(seq, Op::OneByteStringFromCharCode, vec![code]))
        } else {
            Some(code)
        }
    }

    fn inline_math(
        &mut self,
        seq: &mut Sequence,
        kind: MathKind,
        args: &[ValueId],
        ic: Option<&IcData>,
    ) -> Option<ValueId> {
        if args.len() != kind.arity() {
            return None;
        }
        let mut operands = Vec::with_capacity(args.len());
        for (i, &arg) in args.iter().enumerate() {
            let seen = ic.map(|ic| ic.arg_cids(i)).unwrap_or_default();
            operands.push(self.seq_double_operand(seq, arg, &seen)?);
        }
        let op = match kind {
            MathKind::Sqrt => Op::MathUnary(MathUnaryKind::Sqrt),
            other => Op::InvokeMathCFunction(other),
        };
        Some(self.seq_def(seq, op, operands))
    }

    /// A lane value for a SIMD constructor or splat.
    fn seq_lane_operand(
        &mut self,
        seq: &mut Sequence,
        simd: SimdKind,
        value: ValueId,
        ic: Option<&IcData>,
        index: usize,
    ) -> Option<ValueId> {
        let seen = ic.map(|ic| ic.arg_cids(index)).unwrap_or_default();
        if simd.lane_representation() == Representation::UnboxedDouble {
            return self.seq_double_operand(seq, value, &seen);
        }
        let cid = self.graph.known_cid(value).or_else(|| seen.single_cid())?;
        if cid != ClassId::SMI {
            return None;
        }
        self.seq_check(seq, value, &CidSet::single(ClassId::SMI));
        Some(value)
    }

    /// Static math calls other than `sqrt` go straight to the runtime
    /// function, with double arguments.
    pub fn replace_with_math_c_function(
        &mut self,
        call: InstId,
        kind: MathKind,
        ic: Option<&IcData>,
    ) -> Result<bool, OptError> {
        if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            return Ok(false);
        }
        let args = self.graph.inputs(call).to_vec();
        let mut seq = self.begin_sequence(call)?;
        let Some(result) = self.inline_math(&mut seq, kind, &args, ic) else {
            trace!(?kind, "math arguments are not numbers");
            return Ok(false);
        };
        self.commit_sequence(seq, result)?;
        Ok(true)
    }

    // -- instance accessors and methods --

    /// Whether `receiver` still needs a guard against `cids` at `call`.
    pub fn instance_call_needs_class_check(
        &mut self,
        call: InstId,
        receiver: ValueId,
        cids: &CidSet,
    ) -> bool {
        !self.is_proven(receiver, cids, call)
    }

    fn field_layout(&self, cids: &CidSet, field: &str) -> Option<FieldLayout> {
        let table = &self.unit.class_table;
        let mut layout: Option<FieldLayout> = None;
        for cid in cids.iter() {
            let info = table.lookup_field(cid, field)?;
            match &mut layout {
                None => {
                    layout = Some(FieldLayout {
                        offset: info.offset,
                        guarded_cid: info.guarded_cid,
                        is_final: info.is_final,
                    })
                }
                Some(l) => {
                    if l.offset != info.offset {
                        return None;
                    }
                    if l.guarded_cid != info.guarded_cid {
                        l.guarded_cid = None;
                    }
                    l.is_final |= info.is_final;
                }
            }
        }
        layout
    }

    /// Inline a getter: recognized getters on a single receiver class, or
    /// implicit field getters sharing one field offset across the observed
    /// receivers.
    pub fn try_inline_instance_getter(
        &mut self,
        call: InstId,
        instance_call: &InstanceCall,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let receiver = self.graph.input(call, 0);
        if let Some((cid, kind)) = monomorphic_recognized(ic, &instance_call.selector) {
            return Ok(self
                .try_inline_recognized_method(Some(cid), kind, call, Some(receiver), Some(ic))?
                .is_some());
        }
        let Some(field) = accessor_field(ic, true) else {
            return Ok(false);
        };
        let cids = ic.receiver_cids();
        if cids.len() > self.config.max_polymorphic_checks {
            return Ok(false);
        }
        let Some(layout) = self.field_layout(&cids, &field) else {
            trace!(%field, "field layout differs between receivers");
            return Ok(false);
        };
        let needs_check = self.instance_call_needs_class_check(call, receiver, &cids);
        if needs_check && self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            return Ok(false);
        }

        let mut seq = self.begin_sequence(call)?;
        if needs_check {
            self.seq_check(&mut seq, receiver, &cids);
        }
        let slot = Slot::field(field, layout.offset, layout.guarded_cid);
        let value = self.seq_def(&mut seq, Op::LoadField(slot), vec![receiver]);
        self.commit_sequence(seq, value)?;
        Ok(true)
    }

    /// Inline an implicit field setter. The stored value is guarded against
    /// the field's class when one is tracked.
    pub fn try_inline_instance_setter(
        &mut self,
        call: InstId,
        instance_call: &InstanceCall,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some(field) = accessor_field(ic, false) else {
            trace!(selector = %instance_call.selector, "not an implicit setter");
            return Ok(false);
        };
        let (receiver, value) = (self.graph.input(call, 0), self.graph.input(call, 1));
        let cids = ic.receiver_cids();
        if cids.len() > self.config.max_polymorphic_checks {
            return Ok(false);
        }
        let Some(layout) = self.field_layout(&cids, &field) else {
            return Ok(false);
        };
        if layout.is_final {
            return Ok(false);
        }
        if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
            return Ok(false);
        }

        let mut seq = self.begin_sequence(call)?;
        if self.instance_call_needs_class_check(call, receiver, &cids) {
            self.seq_check(&mut seq, receiver, &cids);
        }
        if let Some(guarded) = layout.guarded_cid {
            self.seq_check(&mut seq, value, &CidSet::single(guarded));
        }
        let slot = Slot::field(field, layout.offset, layout.guarded_cid);
        self.seq_void(
            &mut seq,
            Op::StoreInstanceField {
                slot,
                unboxed: false,
            },
            vec![receiver, value],
        );
        self.commit_sequence(seq, value)?;
        Ok(true)
    }

    /// Inline a recognized instance method called on a single receiver
    /// class.
    pub fn try_inline_instance_method(
        &mut self,
        call: InstId,
        instance_call: &InstanceCall,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let Some((cid, kind)) = monomorphic_recognized(ic, &instance_call.selector) else {
            return Ok(false);
        };
        if kind.is_static() {
            return Ok(false);
        }
        let receiver = self.graph.input(call, 0);
        Ok(self
            .try_inline_recognized_method(Some(cid), kind, call, Some(receiver), Some(ic))?
            .is_some())
    }
}

fn indexed_receiver_matches(kind: RecognizedKind, cid: ClassId) -> bool {
    match kind {
        RecognizedKind::ObjectArrayGetIndexed | RecognizedKind::ObjectArraySetIndexed => {
            cid == ClassId::ARRAY
        }
        RecognizedKind::ImmutableArrayGetIndexed => cid == ClassId::IMMUTABLE_ARRAY,
        RecognizedKind::GrowableArrayGetIndexed | RecognizedKind::GrowableArraySetIndexed => {
            cid == ClassId::GROWABLE_ARRAY
        }
        RecognizedKind::TypedDataGetIndexed | RecognizedKind::TypedDataSetIndexed => {
            cid.is_typed_data() || cid.is_external_typed_data()
        }
        _ => false,
    }
}
