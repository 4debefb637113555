//! Dispatch on observed receiver classes: monomorphic calls become guarded
//! static calls, small polymorphic sites a class-ordered dispatch.

use tracing::trace;

use crate::error::OptError;
use crate::ir::{
    CidSet, IcData, InstId, InstanceCall, Op, PolymorphicCall, PolymorphicTarget, SelectorKind,
    StaticCall,
};

use super::FlowGraphOptimizer;

impl FlowGraphOptimizer<'_> {
    /// Replace an instance call by a static call (one receiver class with a
    /// resolved target) or by a polymorphic dispatch (up to
    /// `max_polymorphic_checks` classes, all resolved). Arms are ordered by
    /// descending count; ties go to the smaller class id.
    pub(crate) fn try_dispatch_by_feedback(
        &mut self,
        call: InstId,
        instance_call: &InstanceCall,
        ic: &IcData,
    ) -> Result<bool, OptError> {
        let unary = ic.as_unary();
        let classes = unary.num_receiver_classes();
        let inputs = self.graph.inputs(call).to_vec();

        if classes == 1 {
            let Some(target) = unary.unique_target().cloned() else {
                trace!(selector = %instance_call.selector, "monomorphic without target");
                return Ok(false);
            };
            if self.is_black_listed_for_inlining(self.graph.deopt_id(call)) {
                trace!(selector = %instance_call.selector, "receiver check blacklisted");
                return Ok(false);
            }
            self.add_receiver_check(call)?;
            let op = Op::StaticCall(StaticCall {
                target,
                arg_count: instance_call.arg_count,
                ic_data: Some(ic.clone()),
            });
            self.replace_with_op(call, op, inputs)?;
            return Ok(true);
        }

        if !(2..=self.config.max_polymorphic_checks).contains(&classes) {
            trace!(selector = %instance_call.selector, classes, "too many receiver classes");
            return Ok(false);
        }
        let mut targets = Vec::with_capacity(classes);
        for (cid, target, count) in ic.sorted_receiver_targets() {
            let Some(target) = target else {
                trace!(selector = %instance_call.selector, ?cid, "unresolved polymorphic target");
                return Ok(false);
            };
            targets.push(PolymorphicTarget { cid, target, count });
        }
        let op = Op::PolymorphicInstanceCall(PolymorphicCall {
            selector: instance_call.selector.clone(),
            arg_count: instance_call.arg_count,
            targets,
            has_fallback: true,
        });
        self.replace_with_op(call, op, inputs)?;
        Ok(true)
    }

    /// A polymorphic call whose receiver class is known or already checked
    /// calls the matching arm directly.
    pub fn specialize_polymorphic_instance_call(&mut self, call: InstId) -> Result<bool, OptError> {
        let Op::PolymorphicInstanceCall(poly) = self.graph.op(call) else {
            return Ok(false);
        };
        let poly = poly.clone();
        let receiver = self.graph.input(call, 0);

        let arm = match self.graph.known_cid(receiver) {
            Some(cid) => poly.targets.iter().find(|t| t.cid == cid),
            None => {
                let mut proven = None;
                for arm in &poly.targets {
                    if self.is_proven(receiver, &CidSet::single(arm.cid), call) {
                        proven = Some(arm);
                        break;
                    }
                }
                proven
            }
        };
        let Some(arm) = arm else {
            return Ok(false);
        };

        let ic = IcData::new(1).with_entry(&[arm.cid], arm.count, Some(arm.target.clone()));
        let op = Op::StaticCall(StaticCall {
            target: arm.target.clone(),
            arg_count: poly.arg_count,
            ic_data: Some(ic),
        });
        let inputs = self.graph.inputs(call).to_vec();
        self.replace_with_op(call, op, inputs)?;
        Ok(true)
    }

    /// Feedback for a call without any, built from the static classes of
    /// its tested arguments.
    pub fn try_create_ic_data(&self, call: InstId) -> Option<IcData> {
        let Op::InstanceCall(instance_call) = self.graph.op(call) else {
            return None;
        };
        let tested =
            SelectorKind::classify(&instance_call.selector, instance_call.arg_count).num_args_tested();
        let cids = self
            .graph
            .inputs(call)
            .iter()
            .take(tested as usize)
            .map(|v| self.graph.known_cid(*v))
            .collect::<Option<Vec<_>>>()?;
        if cids.len() != tested as usize {
            return None;
        }
        Some(IcData::new(tested).with_entry(&cids, 1, None))
    }

    /// Narrow polymorphic feedback to the statically known receiver class.
    pub fn try_specialize_ic_data(&self, call: InstId, ic: &IcData) -> Option<IcData> {
        if ic.num_receiver_classes() < 2 {
            return None;
        }
        let receiver = *self.graph.inputs(call).first()?;
        let cid = self.graph.known_cid(receiver)?;
        let narrowed = ic.specialize(cid);
        (!narrowed.is_empty()).then_some(narrowed)
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::CompilationUnit;
    use crate::ir::{
        CidSet, ClassId, Constant, FlowGraphBuilder, IcData, InstanceCall, Op, PolymorphicCall,
        PolymorphicTarget, StaticCall, Target,
    };
    use crate::optimizer::test_helpers::{assert_well_formed, find, with_optimizer};

    const A: ClassId = ClassId(100);
    const B: ClassId = ClassId(101);
    const C: ClassId = ClassId(102);

    #[test]
    fn polymorphic_arms_follow_counts() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        let ic = IcData::new(1)
            .with_entry(&[B], 5, Some(Target::regular("B.foo")))
            .with_entry(&[A], 5, Some(Target::regular("A.foo")))
            .with_entry(&[C], 9, Some(Target::regular("C.foo")));
        let r = b.instance_call("foo", &[x], Some(ic));
        b.ret(r);
        let mut g = b.build();
        let unit = CompilationUnit::default();
        assert!(with_optimizer(&mut g, &unit, |opt| opt.apply_ic_data().unwrap()));

        let poly = find(&g, |op| matches!(op, Op::PolymorphicInstanceCall(_))).unwrap();
        let Op::PolymorphicInstanceCall(call) = g.op(poly) else {
            unreachable!()
        };
        let order: Vec<ClassId> = call.targets.iter().map(|t| t.cid).collect();
        assert_eq!(order, vec![C, A, B]);
        assert!(call.has_fallback);
        assert!(g.env(poly).is_some());
        assert_well_formed(&g);
    }

    #[test]
    fn unresolved_arm_keeps_call_generic() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        let ic = IcData::new(1)
            .with_entry(&[A], 5, Some(Target::regular("A.foo")))
            .with_entry(&[B], 5, None);
        let r = b.instance_call("foo", &[x], Some(ic));
        b.ret(r);
        let mut g = b.build();
        let unit = CompilationUnit::default();
        assert!(!with_optimizer(&mut g, &unit, |opt| opt.apply_ic_data().unwrap()));
    }

    #[test]
    fn known_receiver_selects_polymorphic_arm() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        b.emit_void(Op::CheckClass(CidSet::single(B)), &[x]);
        let call = PolymorphicCall {
            selector: "foo".into(),
            arg_count: 1,
            targets: vec![
                PolymorphicTarget {
                    cid: A,
                    target: Target::regular("A.foo"),
                    count: 3,
                },
                PolymorphicTarget {
                    cid: B,
                    target: Target::regular("B.foo"),
                    count: 2,
                },
            ],
            has_fallback: true,
        };
        let r = b.emit(Op::PolymorphicInstanceCall(call), &[x]);
        b.ret(r);
        let mut g = b.build();
        let unit = CompilationUnit::default();
        assert!(with_optimizer(&mut g, &unit, |opt| opt.apply_class_ids().unwrap()));
        let call = find(&g, |op| matches!(op, Op::StaticCall(_))).unwrap();
        assert!(matches!(
            g.op(call),
            Op::StaticCall(StaticCall { target, .. }) if target.name == "B.foo"
        ));
        assert_well_formed(&g);
    }

    #[test]
    fn feedback_narrows_to_known_receiver() {
        let mut b = FlowGraphBuilder::new("f", 0);
        let s = b.constant(Constant::String("ab".into()));
        let ic = IcData::new(1)
            .with_entry(&[ClassId::ONE_BYTE_STRING], 3, Some(Target::regular("_StringBase.foo")))
            .with_entry(&[ClassId::TWO_BYTE_STRING], 3, Some(Target::regular("_StringBase.foo")));
        let call = InstanceCall {
            selector: "foo".into(),
            arg_count: 1,
            ic_data: Some(ic),
            type_test: None,
        };
        let r = b.instance_call_op(call, &[s]);
        b.ret(r);
        let mut g = b.build();
        let call = g.producer(r);
        let unit = CompilationUnit::default();
        let narrowed = with_optimizer(&mut g, &unit, |opt| {
            let ic = opt.call_ic_data(call).cloned().unwrap();
            opt.try_specialize_ic_data(call, &ic)
        })
        .unwrap();
        assert_eq!(narrowed.num_receiver_classes(), 1);
        assert_eq!(narrowed.receiver_cids().single_cid(), Some(ClassId::ONE_BYTE_STRING));
    }
}
