use serde::{Deserialize, Serialize};

use crate::entity::{EntitySet, PrimaryMap};
use crate::error::OptError;

use super::block::{Block, BlockId, BlockKind};
use super::class_id::ClassId;
use super::env::{Environment, TaggedValue};
use super::inst::{InstId, Instr, Op};
use super::value::{Constant, DeoptId, Definition, Representation, Use, UseSlot, ValueId};

/// SSA flow graph of one function.
///
/// All nodes live in arenas owned by the graph. Instructions are linked into
/// blocks or unlinked; only linked instructions contribute to use lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub name: String,
    pub entry: BlockId,
    pub blocks: PrimaryMap<BlockId, Block>,
    pub insts: PrimaryMap<InstId, Instr>,
    pub values: PrimaryMap<ValueId, Definition>,
    #[serde(default)]
    next_deopt_id: u32,
}

impl FlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(Block::new(BlockKind::Entry));
        Self {
            name: name.into(),
            entry,
            blocks,
            insts: PrimaryMap::new(),
            values: PrimaryMap::new(),
            next_deopt_id: 0,
        }
    }

    /// Parse a graph from JSON and rebuild its use lists. Handles that point
    /// outside their arena are rejected.
    pub fn from_json(json: &str) -> Result<Self, OptError> {
        let mut graph: FlowGraph = serde_json::from_str(json)?;
        graph.check_handles()?;
        let max_deopt = graph
            .insts
            .values()
            .flat_map(|i| {
                i.deopt_id
                    .into_iter()
                    .chain(i.env.as_ref().map(Environment::deopt_id))
            })
            .map(|d| d.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        graph.next_deopt_id = graph.next_deopt_id.max(max_deopt);
        graph.rebuild_use_lists();
        Ok(graph)
    }

    fn check_handles(&self) -> Result<(), OptError> {
        fn dangling(what: String, id: impl std::fmt::Debug) -> Result<(), OptError> {
            Err(OptError::Invariant(format!("{what} {id:?} is out of range")))
        }
        if !self.blocks.contains_key(self.entry) {
            return dangling("entry block".into(), self.entry);
        }
        for (block, b) in self.blocks.iter() {
            if let Some(pred) = b.preds.iter().find(|p| !self.blocks.contains_key(**p)) {
                return dangling(format!("predecessor of {block:?}"), pred);
            }
            let mut members = b.phis.iter().chain(&b.insts);
            if let Some(inst) = members.find(|i| !self.insts.contains_key(**i)) {
                return dangling(format!("instruction in {block:?}"), inst);
            }
        }
        for (inst, instr) in self.insts.iter() {
            let values = instr
                .inputs
                .iter()
                .chain(&instr.result)
                .chain(instr.env.iter().flat_map(|env| env.slots()));
            for value in values {
                if !self.values.contains_key(*value) {
                    return dangling(format!("value used or defined by {inst:?}"), value);
                }
            }
            let targets = match &instr.op {
                Op::Goto(target) => vec![*target],
                Op::Branch {
                    then_block,
                    else_block,
                } => vec![*then_block, *else_block],
                _ => Vec::new(),
            };
            for block in instr.block.iter().chain(&targets) {
                if !self.blocks.contains_key(*block) {
                    return dangling(format!("block named by {inst:?}"), block);
                }
            }
        }
        for (value, def) in self.values.iter() {
            if !self.insts.contains_key(def.inst) {
                return dangling(format!("producer of {value:?}"), def.inst);
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, OptError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // -- blocks --

    pub fn create_block(&mut self, kind: BlockKind) -> BlockId {
        self.blocks.push(Block::new(kind))
    }

    pub fn block(&self, block: BlockId) -> &Block {
        &self.blocks[block]
    }

    /// Record `from` as the next predecessor of `to`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to].preds.push(from);
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.blocks[block].insts.last()?;
        self.insts[last].op.is_terminator().then_some(last)
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block).map(|t| &self.insts[t].op) {
            Some(Op::Goto(target)) => vec![*target],
            Some(Op::Branch {
                then_block,
                else_block,
            }) => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }

    /// Blocks reachable from the entry, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited: EntitySet<BlockId> = EntitySet::new();
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
        visited.insert(self.entry);
        let mut succs = self.successors(self.entry);
        succs.reverse();
        stack.push((self.entry, succs));
        while let Some((block, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) => {
                    if visited.insert(next) {
                        let mut succs = self.successors(next);
                        succs.reverse();
                        stack.push((next, succs));
                    }
                }
                None => {
                    postorder.push(*block);
                    stack.pop();
                }
            }
        }
        postorder.reverse();
        postorder
    }

    // -- deopt ids --

    pub fn alloc_deopt_id(&mut self) -> DeoptId {
        let id = DeoptId(self.next_deopt_id);
        self.next_deopt_id += 1;
        id
    }

    // -- instruction creation and access --

    /// Create an unlinked instruction. A result definition is allocated when
    /// the operation produces one.
    pub fn create_inst(&mut self, op: Op, inputs: Vec<ValueId>) -> InstId {
        if op.has_result() {
            self.create_def(op, inputs).0
        } else {
            self.insts.push(Instr {
                op,
                inputs,
                result: None,
                block: None,
                deopt_id: None,
                env: None,
            })
        }
    }

    /// Create an unlinked instruction together with its result definition.
    pub fn create_def(&mut self, op: Op, inputs: Vec<ValueId>) -> (InstId, ValueId) {
        let inst = self.insts.next_key();
        let value = self.values.push(Definition {
            inst,
            rep: op.default_representation(),
            uses: Vec::new(),
        });
        self.insts.push(Instr {
            op,
            inputs,
            result: Some(value),
            block: None,
            deopt_id: None,
            env: None,
        });
        (inst, value)
    }

    pub fn inst(&self, inst: InstId) -> &Instr {
        &self.insts[inst]
    }

    pub fn op(&self, inst: InstId) -> &Op {
        &self.insts[inst].op
    }

    /// Mutable access to the operation. Operations hold no value references,
    /// so use lists are unaffected.
    pub fn op_mut(&mut self, inst: InstId) -> &mut Op {
        &mut self.insts[inst].op
    }

    pub fn inputs(&self, inst: InstId) -> &[ValueId] {
        &self.insts[inst].inputs
    }

    pub fn input(&self, inst: InstId, index: usize) -> ValueId {
        self.insts[inst].inputs[index]
    }

    pub fn result(&self, inst: InstId) -> Option<ValueId> {
        self.insts[inst].result
    }

    pub fn deopt_id(&self, inst: InstId) -> Option<DeoptId> {
        self.insts[inst].deopt_id
    }

    pub fn set_deopt_id(&mut self, inst: InstId, deopt_id: Option<DeoptId>) {
        self.insts[inst].deopt_id = deopt_id;
    }

    pub fn block_of(&self, inst: InstId) -> Option<BlockId> {
        self.insts[inst].block
    }

    pub fn is_linked(&self, inst: InstId) -> bool {
        self.insts[inst].is_linked()
    }

    /// Index of `inst` in its block's instruction list.
    pub fn position(&self, inst: InstId) -> Option<usize> {
        let block = self.insts[inst].block?;
        self.blocks[block].insts.iter().position(|i| *i == inst)
    }

    /// All linked instructions, phis first within each block.
    pub fn linked_instructions(&self) -> Vec<InstId> {
        self.blocks
            .values()
            .flat_map(|b| b.phis.iter().chain(b.insts.iter()).copied())
            .filter(|i| self.insts[*i].is_linked())
            .collect()
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks
            .values()
            .map(|b| b.phis.len() + b.insts.len())
            .sum()
    }

    // -- linking --

    pub fn append(&mut self, block: BlockId, inst: InstId) {
        self.blocks[block].insts.push(inst);
        self.link(block, inst);
    }

    pub fn append_phi(&mut self, block: BlockId, phi: InstId) {
        self.blocks[block].phis.push(phi);
        self.link(block, phi);
    }

    pub fn insert_before(&mut self, anchor: InstId, inst: InstId) -> Result<(), OptError> {
        let (block, pos) = self.anchor_position(anchor)?;
        self.blocks[block].insts.insert(pos, inst);
        self.link(block, inst);
        Ok(())
    }

    pub fn insert_after(&mut self, anchor: InstId, inst: InstId) -> Result<(), OptError> {
        let (block, pos) = self.anchor_position(anchor)?;
        self.blocks[block].insts.insert(pos + 1, inst);
        self.link(block, inst);
        Ok(())
    }

    /// Insert at the end of `block`, ahead of its terminator.
    pub fn insert_at_end(&mut self, block: BlockId, inst: InstId) {
        let pos = match self.terminator(block) {
            Some(_) => self.blocks[block].insts.len() - 1,
            None => self.blocks[block].insts.len(),
        };
        self.blocks[block].insts.insert(pos, inst);
        self.link(block, inst);
    }

    fn anchor_position(&self, anchor: InstId) -> Result<(BlockId, usize), OptError> {
        let block = self.insts[anchor]
            .block
            .ok_or_else(|| OptError::Invariant(format!("{anchor:?} is not linked")))?;
        let pos = self.blocks[block]
            .insts
            .iter()
            .position(|i| *i == anchor)
            .ok_or_else(|| {
                OptError::Invariant(format!("{anchor:?} is a phi or missing from {block:?}"))
            })?;
        Ok((block, pos))
    }

    fn link(&mut self, block: BlockId, inst: InstId) {
        self.insts[inst].block = Some(block);
        self.register_uses(inst);
    }

    fn register_uses(&mut self, inst: InstId) {
        let instr = &self.insts[inst];
        let inputs: Vec<_> = instr.inputs.iter().copied().enumerate().collect();
        let env: Vec<_> = instr
            .env
            .as_ref()
            .map(|e| e.slots().iter().copied().enumerate().collect())
            .unwrap_or_default();
        for (i, v) in inputs {
            self.values[v].uses.push(Use::input(inst, i));
        }
        for (i, v) in env {
            self.values[v].uses.push(Use::env(inst, i));
        }
    }

    fn unregister_uses(&mut self, inst: InstId) {
        let instr = &self.insts[inst];
        let mut reads: Vec<ValueId> = instr.inputs.clone();
        if let Some(env) = &instr.env {
            reads.extend_from_slice(env.slots());
        }
        reads.sort();
        reads.dedup();
        for v in reads {
            self.values[v].uses.retain(|u| u.user != inst);
        }
    }

    fn unregister_env_uses(&mut self, inst: InstId) {
        let Some(env) = &self.insts[inst].env else {
            return;
        };
        let mut reads: Vec<ValueId> = env.slots().to_vec();
        reads.sort();
        reads.dedup();
        for v in reads {
            self.values[v]
                .uses
                .retain(|u| !(u.user == inst && u.is_environment_use()));
        }
    }

    /// Unlink `inst`. Fails if its result is still read.
    pub fn remove_instr(&mut self, inst: InstId) -> Result<(), OptError> {
        self.remove_instrs(&[inst])
    }

    /// Unlink a group of instructions that may read each other's results
    /// (e.g. a cycle of dead phis). Fails if any result is read from outside
    /// the group.
    pub fn remove_instrs(&mut self, group: &[InstId]) -> Result<(), OptError> {
        for &inst in group {
            let Some(value) = self.insts[inst].result else {
                continue;
            };
            if let Some(u) = self.values[value]
                .uses
                .iter()
                .find(|u| !group.contains(&u.user))
            {
                return Err(OptError::DanglingUse {
                    value,
                    user: u.user,
                });
            }
        }
        for &inst in group {
            if self.insts[inst].is_linked() {
                self.unregister_uses(inst);
            }
        }
        for &inst in group {
            let Some(block) = self.insts[inst].block.take() else {
                continue;
            };
            let b = &mut self.blocks[block];
            b.insts.retain(|i| *i != inst);
            b.phis.retain(|i| *i != inst);
        }
        Ok(())
    }

    /// Redirect every read of `old` to `new`.
    pub fn replace_uses(&mut self, old: ValueId, new: ValueId) -> Result<(), OptError> {
        if old == new {
            return Ok(());
        }
        let tagged = self.tagged(new);
        if tagged.is_none() {
            if let Some(u) = self.values[old].uses.iter().find(|u| u.is_environment_use()) {
                return Err(OptError::UntaggedEnvironmentSlot {
                    inst: u.user,
                    value: new,
                    rep: self.values[new].rep,
                });
            }
        }
        let uses = std::mem::take(&mut self.values[old].uses);
        for u in &uses {
            match (u.slot, tagged) {
                (UseSlot::Input(i), _) => self.insts[u.user].inputs[i as usize] = new,
                (UseSlot::Env(i), Some(tv)) => {
                    if let Some(env) = self.insts[u.user].env.as_mut() {
                        env.set(i as usize, tv);
                    }
                }
                (UseSlot::Env(_), None) => {}
            }
        }
        self.values[new].uses.extend(uses);
        Ok(())
    }

    /// Point input `index` of `inst` at `value`.
    pub fn set_input(&mut self, inst: InstId, index: usize, value: ValueId) {
        let old = self.insts[inst].inputs[index];
        if old == value {
            return;
        }
        self.insts[inst].inputs[index] = value;
        if self.insts[inst].is_linked() {
            let u = Use::input(inst, index);
            self.values[old].uses.retain(|x| *x != u);
            self.values[value].uses.push(u);
        }
    }

    /// Replace the whole input list of `inst` (used for phis whose inputs
    /// are known only once every predecessor exists).
    pub fn set_inputs(&mut self, inst: InstId, inputs: Vec<ValueId>) {
        let linked = self.insts[inst].is_linked();
        if linked {
            let mut old: Vec<ValueId> = self.insts[inst].inputs.clone();
            old.sort();
            old.dedup();
            for v in old {
                self.values[v]
                    .uses
                    .retain(|u| !(u.user == inst && !u.is_environment_use()));
            }
        }
        self.insts[inst].inputs = inputs;
        if linked {
            let inputs: Vec<_> = self.insts[inst].inputs.iter().copied().enumerate().collect();
            for (i, v) in inputs {
                self.values[v].uses.push(Use::input(inst, i));
            }
        }
    }

    /// Copy `from`'s deopt id and environment onto `to` where `to` lacks them.
    /// Must run before `to` is linked. Environments of instructions that
    /// cannot deoptimize are dropped later by environment pruning.
    pub fn inherit_deopt_info(&mut self, from: InstId, to: InstId) {
        if self.insts[to].deopt_id.is_none() {
            self.insts[to].deopt_id = self.insts[from].deopt_id;
        }
        if self.insts[to].env.is_none() {
            self.insts[to].env = self.insts[from].env.clone();
        }
    }

    // -- environments --

    /// A tagged handle for `value`, if its representation is tagged.
    pub fn tagged(&self, value: ValueId) -> Option<TaggedValue> {
        (self.values[value].rep == Representation::Tagged)
            .then(|| TaggedValue::new_unchecked(value))
    }

    pub fn env(&self, inst: InstId) -> Option<&Environment> {
        self.insts[inst].env.as_ref()
    }

    pub fn set_env(&mut self, inst: InstId, env: Option<Environment>) {
        let linked = self.insts[inst].is_linked();
        if linked {
            self.unregister_env_uses(inst);
        }
        self.insts[inst].env = env;
        if linked {
            let slots: Vec<ValueId> = self.insts[inst]
                .env
                .as_ref()
                .map(|e| e.slots().to_vec())
                .unwrap_or_default();
            for (i, v) in slots.into_iter().enumerate() {
                self.values[v].uses.push(Use::env(inst, i));
            }
        }
    }

    pub fn detach_env(&mut self, inst: InstId) -> Option<Environment> {
        if self.insts[inst].is_linked() {
            self.unregister_env_uses(inst);
        }
        self.insts[inst].env.take()
    }

    pub fn set_env_slot(&mut self, inst: InstId, index: usize, value: TaggedValue) {
        let Some(env) = self.insts[inst].env.as_mut() else {
            return;
        };
        let old = env.slots()[index];
        env.set(index, value);
        if self.insts[inst].is_linked() && old != value.value() {
            let u = Use::env(inst, index);
            self.values[old].uses.retain(|x| *x != u);
            self.values[value.value()].uses.push(u);
        }
    }

    // -- values --

    pub fn def(&self, value: ValueId) -> &Definition {
        &self.values[value]
    }

    pub fn rep(&self, value: ValueId) -> Representation {
        self.values[value].rep
    }

    pub fn set_rep(&mut self, value: ValueId, rep: Representation) {
        self.values[value].rep = rep;
    }

    pub fn producer(&self, value: ValueId) -> InstId {
        self.values[value].inst
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        &self.values[value].uses
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.values[value].uses.is_empty()
    }

    /// Representation the reader at `u` requires.
    pub fn required_rep(&self, u: Use) -> Representation {
        match u.slot {
            UseSlot::Env(_) => Representation::Tagged,
            UseSlot::Input(i) => self.required_input_rep(u.user, i as usize),
        }
    }

    pub fn required_input_rep(&self, inst: InstId, index: usize) -> Representation {
        let instr = &self.insts[inst];
        match (&instr.op, instr.result) {
            (Op::Phi, Some(v)) => self.values[v].rep,
            (op, _) => op.required_input_representation(index),
        }
    }

    /// Static class of `value`, when its producer determines one.
    pub fn known_cid(&self, value: ValueId) -> Option<ClassId> {
        let instr = &self.insts[self.producer(value)];
        match &instr.op {
            Op::Box(_) => instr
                .inputs
                .first()
                .and_then(|v| self.known_cid(*v))
                .or_else(|| instr.op.result_cid()),
            op => op.result_cid(),
        }
    }

    pub fn constant(&self, value: ValueId) -> Option<&Constant> {
        match &self.insts[self.producer(value)].op {
            Op::Constant(c) | Op::UnboxedConstant { value: c, .. } => Some(c),
            _ => None,
        }
    }

    pub fn smi_constant(&self, value: ValueId) -> Option<i64> {
        self.constant(value).and_then(Constant::as_smi)
    }

    /// Recompute every use list from the linked instructions.
    pub fn rebuild_use_lists(&mut self) {
        for def in self.values.values_mut() {
            def.uses.clear();
        }
        for inst in self.linked_instructions() {
            self.register_uses(inst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::inst::BinaryOp;

    fn constant(g: &mut FlowGraph, v: i64) -> ValueId {
        let (inst, value) = g.create_def(Op::Constant(Constant::Smi(v)), vec![]);
        g.append(g.entry, inst);
        value
    }

    #[test]
    fn linking_registers_uses() {
        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 1);
        let b = constant(&mut g, 2);
        let add = g.create_inst(
            Op::BinarySmiOp {
                op: BinaryOp::Add,
                can_overflow: false,
            },
            vec![a, b],
        );
        assert!(g.uses(a).is_empty(), "unlinked instructions have no uses");
        g.append(g.entry, add);
        assert_eq!(g.uses(a), &[Use::input(add, 0)]);
        assert_eq!(g.uses(b), &[Use::input(add, 1)]);
    }

    #[test]
    fn remove_refuses_live_results() {
        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 1);
        let ret = g.create_inst(Op::Return, vec![a]);
        g.append(g.entry, ret);
        let producer = g.producer(a);
        assert!(matches!(
            g.remove_instr(producer),
            Err(OptError::DanglingUse { .. })
        ));
        g.remove_instr(ret).unwrap();
        g.remove_instr(producer).unwrap();
        assert!(!g.is_linked(producer));
        assert_eq!(g.instruction_count(), 0);
    }

    #[test]
    fn replace_uses_moves_environment_reads() {
        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 1);
        let b = constant(&mut g, 2);
        let d = g.alloc_deopt_id();
        let check = g.create_inst(Op::CheckSmi, vec![a]);
        let env = Environment::new(d, [g.tagged(a).unwrap()]);
        g.set_env(check, Some(env));
        g.append(g.entry, check);
        assert_eq!(g.uses(a).len(), 2);

        g.replace_uses(a, b).unwrap();
        assert!(g.uses(a).is_empty());
        assert_eq!(g.uses(b).len(), 2);
        assert_eq!(g.env(check).unwrap().slots(), &[b]);
        assert_eq!(g.inputs(check), &[b]);
    }

    #[test]
    fn replace_uses_rejects_untagged_environment_values() {
        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 1);
        let (unbox, raw) = g.create_def(
            Op::Unbox {
                to: Representation::UnboxedInt64,
                speculative: false,
            },
            vec![a],
        );
        g.append(g.entry, unbox);
        let d = g.alloc_deopt_id();
        let check = g.create_inst(Op::CheckSmi, vec![a]);
        g.set_env(check, Some(Environment::new(d, [g.tagged(a).unwrap()])));
        g.append(g.entry, check);
        assert!(g.tagged(raw).is_none());
        assert!(matches!(
            g.replace_uses(a, raw),
            Err(OptError::UntaggedEnvironmentSlot { .. })
        ));
    }

    #[test]
    fn reverse_postorder_visits_diamond() {
        let mut g = FlowGraph::new("f");
        let cond = constant(&mut g, 1);
        let then_b = g.create_block(BlockKind::Target);
        let else_b = g.create_block(BlockKind::Target);
        let join = g.create_block(BlockKind::Join);
        let br = g.create_inst(
            Op::Branch {
                then_block: then_b,
                else_block: else_b,
            },
            vec![cond],
        );
        g.append(g.entry, br);
        g.add_edge(g.entry, then_b);
        g.add_edge(g.entry, else_b);
        for b in [then_b, else_b] {
            let goto = g.create_inst(Op::Goto(join), vec![]);
            g.append(b, goto);
            g.add_edge(b, join);
        }
        let ret = g.create_inst(Op::Return, vec![cond]);
        g.append(join, ret);

        let rpo = g.reverse_postorder();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], g.entry);
        assert_eq!(rpo[3], join);
    }

    #[test]
    fn json_round_trip_rebuilds_uses() {
        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 7);
        let ret = g.create_inst(Op::Return, vec![a]);
        g.append(g.entry, ret);
        let json = g.to_json().unwrap();
        let back = FlowGraph::from_json(&json).unwrap();
        assert_eq!(back.uses(a), &[Use::input(ret, 0)]);
        assert_eq!(back.smi_constant(a), Some(7));
    }

    #[test]
    fn json_with_dangling_handles_is_rejected() {
        use crate::entity::EntityRef;

        let mut g = FlowGraph::new("f");
        let a = constant(&mut g, 7);
        let ret = g.create_inst(Op::Return, vec![a]);
        g.append(g.entry, ret);

        let mut bad_input = g.clone();
        bad_input.insts[ret].inputs = vec![ValueId::new(99)];
        let err = FlowGraph::from_json(&bad_input.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, OptError::Invariant(_)), "{err}");

        let mut bad_target = g.clone();
        bad_target.insts[ret].op = Op::Goto(BlockId::new(5));
        assert!(FlowGraph::from_json(&bad_target.to_json().unwrap()).is_err());

        let mut bad_block = g;
        bad_block.blocks[bad_block.entry].insts.push(InstId::new(40));
        assert!(FlowGraph::from_json(&bad_block.to_json().unwrap()).is_err());
    }
}
