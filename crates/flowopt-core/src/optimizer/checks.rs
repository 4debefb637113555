//! Class and Smi guards.
//!
//! Every guard is tied to a deoptimization point: it carries the deopt id and
//! a copy of the environment of the instruction it protects, so a failed
//! check resumes unoptimized code exactly where the original call would have
//! run.

use tracing::trace;

use crate::error::OptError;
use crate::ir::{CidSet, ClassId, DeoptId, Environment, IcData, InstId, Op, UseSlot, ValueId};

use super::FlowGraphOptimizer;

impl FlowGraphOptimizer<'_> {
    /// Build, but do not link, a guard that `value` has one of `cids`.
    /// A Smi-only set yields a `CheckSmi`.
    pub fn get_check_class(
        &mut self,
        value: ValueId,
        cids: &CidSet,
        deopt_id: Option<DeoptId>,
    ) -> InstId {
        let op = if cids.is_smi_only() {
            Op::CheckSmi
        } else {
            Op::CheckClass(cids.clone())
        };
        let check = self.graph.create_inst(op, vec![value]);
        self.graph.set_deopt_id(check, deopt_id);
        check
    }

    /// Guard `value` against `cids` right before `insert_before`, unless the
    /// class is already proven there. Returns the inserted check.
    pub fn add_check_class(
        &mut self,
        value: ValueId,
        cids: &CidSet,
        deopt_id: Option<DeoptId>,
        env: Option<&Environment>,
        insert_before: InstId,
    ) -> Result<Option<InstId>, OptError> {
        if self.is_proven(value, cids, insert_before) {
            trace!(?value, ?cids, "check is redundant");
            return Ok(None);
        }
        let env = env.ok_or(OptError::MissingEnvironment {
            inst: insert_before,
        })?;
        let check = self.get_check_class(value, cids, deopt_id);
        self.graph.set_env(check, Some(env.clone()));
        self.graph.insert_before(insert_before, check)?;
        Ok(Some(check))
    }

    pub fn add_check_smi(
        &mut self,
        value: ValueId,
        deopt_id: Option<DeoptId>,
        env: Option<&Environment>,
        insert_before: InstId,
    ) -> Result<Option<InstId>, OptError> {
        self.add_check_class(
            value,
            &CidSet::single(ClassId::SMI),
            deopt_id,
            env,
            insert_before,
        )
    }

    /// Guard the receiver of `call` against the classes its feedback saw,
    /// reusing the call's deopt id and environment.
    pub fn add_receiver_check(&mut self, call: InstId) -> Result<Option<InstId>, OptError> {
        let Some(cids) = self.call_ic_data(call).map(|ic| ic.as_unary().receiver_cids()) else {
            return Ok(None);
        };
        if cids.is_empty() {
            return Ok(None);
        }
        let receiver = self.graph.input(call, 0);
        let deopt_id = self.graph.deopt_id(call);
        let env = self.graph.env(call).cloned();
        self.add_check_class(receiver, &cids, deopt_id, env.as_ref(), call)
    }

    /// Feedback attached to a call instruction.
    pub(crate) fn call_ic_data(&self, call: InstId) -> Option<&IcData> {
        match self.graph.op(call) {
            Op::InstanceCall(c) => c.ic_data.as_ref(),
            Op::StaticCall(c) => c.ic_data.as_ref(),
            _ => None,
        }
    }

    /// Whether `value` is known to have a class in `cids` when control
    /// reaches `at`: its producer fixes the class, or a check of the same
    /// definition against a subset of `cids` runs earlier in `at`'s block or
    /// in a dominating block.
    pub(crate) fn is_proven(&mut self, value: ValueId, cids: &CidSet, at: InstId) -> bool {
        if self
            .graph
            .known_cid(value)
            .is_some_and(|cid| cids.contains(cid))
        {
            return true;
        }
        let Some(at_block) = self.graph.block_of(at) else {
            return false;
        };
        let at_pos = self.graph.position(at);

        let checks: Vec<InstId> = self
            .graph
            .uses(value)
            .iter()
            .filter(|u| u.slot == UseSlot::Input(0) && u.user != at)
            .map(|u| u.user)
            .filter(|&user| checked_cids(self.graph.op(user)).is_some_and(|s| s.is_subset_of(cids)))
            .collect();

        for check in checks {
            let Some(block) = self.graph.block_of(check) else {
                continue;
            };
            if block == at_block {
                if let (Some(pos), Some(limit)) = (self.graph.position(check), at_pos) {
                    if pos < limit {
                        return true;
                    }
                }
            } else if self.dominators().dominates(block, at_block) {
                return true;
            }
        }
        false
    }
}

/// Classes a guard lets through.
pub(crate) fn checked_cids(op: &Op) -> Option<CidSet> {
    match op {
        Op::CheckSmi => Some(CidSet::single(ClassId::SMI)),
        Op::CheckClass(set) => Some(set.clone()),
        _ => None,
    }
}
