use super::block::{BlockId, BlockKind};
use super::env::Environment;
use super::graph::FlowGraph;
use super::ic_data::{IcData, Target};
use super::inst::{InstId, InstanceCall, Op, StaticCall};
use super::value::{Constant, ValueId};

/// Builder for constructing a [`FlowGraph`].
///
/// Tracks a "current block" cursor and the set of live locals. Every
/// instruction that can deoptimize gets a fresh deopt id and an environment
/// capturing the locals at that point.
pub struct FlowGraphBuilder {
    graph: FlowGraph,
    current_block: BlockId,
    params: Vec<ValueId>,
    locals: Vec<ValueId>,
}

impl FlowGraphBuilder {
    /// Create a builder whose entry block defines `num_params` parameters.
    /// The parameters are the initial locals.
    pub fn new(name: impl Into<String>, num_params: u32) -> Self {
        let mut graph = FlowGraph::new(name);
        let entry = graph.entry;
        let mut params = Vec::with_capacity(num_params as usize);
        for i in 0..num_params {
            let (inst, value) = graph.create_def(Op::Parameter(i), Vec::new());
            graph.append(entry, inst);
            params.push(value);
        }
        Self {
            graph,
            current_block: entry,
            locals: params.clone(),
            params,
        }
    }

    pub fn create_join_block(&mut self) -> BlockId {
        self.graph.create_block(BlockKind::Join)
    }

    pub fn create_target_block(&mut self) -> BlockId {
        self.graph.create_block(BlockKind::Target)
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn entry_block(&self) -> BlockId {
        self.graph.entry
    }

    /// # Panics
    /// Panics if `index` is out of range.
    pub fn param(&self, index: usize) -> ValueId {
        self.params[index]
    }

    /// Append `value` to the captured locals.
    pub fn push_local(&mut self, value: ValueId) {
        self.locals.push(value);
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn build(self) -> FlowGraph {
        self.graph
    }

    // -- internal helpers --

    fn capture_env(&mut self) -> Environment {
        let deopt_id = self.graph.alloc_deopt_id();
        let mut slots = Vec::with_capacity(self.locals.len());
        for &local in &self.locals.clone() {
            let tagged = match self.graph.tagged(local) {
                Some(t) => t,
                None => {
                    // Unboxed locals are captured through a box.
                    let from = self.graph.rep(local);
                    let (inst, boxed) = self.graph.create_def(Op::Box(from), vec![local]);
                    self.graph.append(self.current_block, inst);
                    match self.graph.tagged(boxed) {
                        Some(t) => t,
                        None => continue,
                    }
                }
            };
            slots.push(tagged);
        }
        Environment::new(deopt_id, slots)
    }

    fn push(&mut self, op: Op, inputs: Vec<ValueId>) -> InstId {
        let inst = self.graph.create_inst(op, inputs);
        self.link_current(inst);
        inst
    }

    fn link_current(&mut self, inst: InstId) {
        if self.graph.op(inst).can_deoptimize() {
            let env = self.capture_env();
            self.graph.set_deopt_id(inst, Some(env.deopt_id()));
            self.graph.set_env(inst, Some(env));
        }
        self.graph.append(self.current_block, inst);
    }

    /// Emit a value-producing instruction into the current block.
    ///
    /// # Panics
    /// Panics if `op` produces no value; use [`emit_void`](Self::emit_void).
    pub fn emit(&mut self, op: Op, inputs: &[ValueId]) -> ValueId {
        assert!(op.has_result(), "{} produces no value", op.name());
        let (inst, value) = self.graph.create_def(op, inputs.to_vec());
        self.link_current(inst);
        value
    }

    /// Emit an instruction without using its result.
    pub fn emit_void(&mut self, op: Op, inputs: &[ValueId]) -> InstId {
        self.push(op, inputs.to_vec())
    }

    // ========================================================================
    // Constants
    // ========================================================================

    pub fn constant(&mut self, c: Constant) -> ValueId {
        self.emit(Op::Constant(c), &[])
    }

    pub fn smi(&mut self, value: i64) -> ValueId {
        self.constant(Constant::Smi(value))
    }

    pub fn double(&mut self, value: f64) -> ValueId {
        self.constant(Constant::Double(value))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Emit a dynamic call. `args` starts with the receiver.
    pub fn instance_call(
        &mut self,
        selector: &str,
        args: &[ValueId],
        ic_data: Option<IcData>,
    ) -> ValueId {
        let call = InstanceCall {
            selector: selector.to_string(),
            arg_count: args.len() as u32,
            ic_data,
            type_test: None,
        };
        self.emit(Op::InstanceCall(call), args)
    }

    pub fn instance_call_op(&mut self, call: InstanceCall, args: &[ValueId]) -> ValueId {
        self.emit(Op::InstanceCall(call), args)
    }

    pub fn static_call(&mut self, target: Target, args: &[ValueId]) -> ValueId {
        let call = StaticCall {
            target,
            arg_count: args.len() as u32,
            ic_data: None,
        };
        self.emit(Op::StaticCall(call), args)
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    pub fn goto(&mut self, target: BlockId) {
        let from = self.current_block;
        self.push(Op::Goto(target), Vec::new());
        self.graph.add_edge(from, target);
    }

    pub fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        let from = self.current_block;
        self.push(
            Op::Branch {
                then_block,
                else_block,
            },
            vec![cond],
        );
        self.graph.add_edge(from, then_block);
        self.graph.add_edge(from, else_block);
    }

    pub fn ret(&mut self, value: ValueId) {
        self.push(Op::Return, vec![value]);
    }

    /// Add a phi to `block` whose inputs follow the block's predecessor
    /// order.
    pub fn phi(&mut self, block: BlockId, inputs: &[ValueId]) -> ValueId {
        let (inst, value) = self.graph.create_def(Op::Phi, inputs.to_vec());
        self.graph.append_phi(block, inst);
        value
    }

    /// Set the inputs of a phi created before all its predecessors existed.
    pub fn set_phi_inputs(&mut self, phi: ValueId, inputs: &[ValueId]) {
        let inst = self.graph.producer(phi);
        self.graph.set_inputs(inst, inputs.to_vec());
    }
}
