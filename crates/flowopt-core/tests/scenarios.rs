//! End-to-end optimizer scenarios, driven through the public API.

use flowopt_core::compile::{optimize, CompilationUnit};
use flowopt_core::ir::{
    verify, BinaryOp, ClassId, ClassTable, Constant, FeedbackStore, FlowGraph, FlowGraphBuilder,
    IcData, Op, ValueId, VerifyLevel,
};
use flowopt_core::optimizer::FlowGraphOptimizer;
use flowopt_core::pipeline::OptimizerConfig;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Non-trivial instructions in block order.
fn op_names(graph: &FlowGraph) -> Vec<&'static str> {
    graph
        .reverse_postorder()
        .into_iter()
        .flat_map(|b| graph.block(b).insts.clone())
        .map(|i| graph.op(i).name())
        .filter(|name| !matches!(*name, "Parameter" | "Constant"))
        .collect()
}

fn count(graph: &FlowGraph, pred: impl Fn(&Op) -> bool) -> usize {
    graph
        .linked_instructions()
        .into_iter()
        .filter(|i| pred(graph.op(*i)))
        .count()
}

fn phi_count(graph: &FlowGraph) -> usize {
    graph
        .reverse_postorder()
        .into_iter()
        .map(|b| graph.block(b).phis.len())
        .sum()
}

/// Feedback recording `cids` for every instance call.
fn uniform_feedback(graph: &FlowGraph, cids: &[ClassId]) -> CompilationUnit {
    let mut feedback = FeedbackStore::new();
    for inst in graph.linked_instructions() {
        if let (Op::InstanceCall(_), Some(deopt_id)) = (graph.op(inst), graph.deopt_id(inst)) {
            feedback.insert(
                deopt_id,
                IcData::new(cids.len() as u32).with_entry(cids, 10, None),
            );
        }
    }
    CompilationUnit::new(feedback, ClassTable::new())
}

const SMIS: &[ClassId] = &[ClassId::SMI, ClassId::SMI];

#[test]
fn monomorphic_smi_add() {
    let mut b = FlowGraphBuilder::new("add", 2);
    let (x, y) = (b.param(0), b.param(1));
    let sum = b.instance_call("+", &[x, y], None);
    b.ret(sum);
    let graph = b.build();
    let call_deopt_id = graph.deopt_id(graph.producer(sum));
    let unit = uniform_feedback(&graph, SMIS);

    let config = OptimizerConfig::default();
    let mut optimized = optimize(&graph, &unit, &config).into_graph();
    assert_eq!(
        op_names(&optimized),
        vec!["CheckSmi", "CheckSmi", "BinarySmiOp", "Return"]
    );
    for inst in optimized.linked_instructions() {
        if matches!(optimized.op(inst), Op::CheckSmi | Op::BinarySmiOp { .. }) {
            assert_eq!(optimized.deopt_id(inst), call_deopt_id);
        }
    }
    let check_inputs: Vec<ValueId> = optimized
        .linked_instructions()
        .into_iter()
        .filter(|i| matches!(optimized.op(*i), Op::CheckSmi))
        .map(|i| optimized.input(i, 0))
        .collect();
    assert_eq!(check_inputs, vec![x, y]);

    // Nothing is left for a second specialization round.
    let mut opt = FlowGraphOptimizer::new(&mut optimized, &config, &unit);
    assert!(!opt.apply_ic_data().unwrap());
}

#[test]
fn shift_and_mask_fuse() {
    let mut b = FlowGraphBuilder::new("mask", 2);
    let (x, y) = (b.param(0), b.param(1));
    let shifted = b.instance_call("<<", &[x, y], None);
    let mask = b.smi(0xFF);
    let masked = b.instance_call("&", &[shifted, mask], None);
    b.ret(masked);
    let graph = b.build();
    let unit = uniform_feedback(&graph, SMIS);

    let outcome = optimize(&graph, &unit, &OptimizerConfig::default());
    assert!(outcome.is_optimized());
    let g = outcome.graph();
    assert_eq!(
        count(g, |op| matches!(op, Op::ShiftLeftMaskSmi { mask: 0xFF, .. })),
        1
    );
    assert_eq!(count(g, |op| matches!(op, Op::BinarySmiOp { .. })), 0);
    assert_eq!(count(g, Op::is_call), 0);
    verify(g, VerifyLevel::Output).unwrap();
}

#[test]
fn dead_phis_cascade() {
    let mut b = FlowGraphBuilder::new("phis", 3);
    let (cond, x, y) = (b.param(0), b.param(1), b.param(2));
    let (a1, a2, join1) = (
        b.create_target_block(),
        b.create_target_block(),
        b.create_join_block(),
    );
    let (c1, c2, join2) = (
        b.create_target_block(),
        b.create_target_block(),
        b.create_join_block(),
    );
    b.branch(cond, a1, a2);
    for block in [a1, a2] {
        b.switch_to_block(block);
        b.goto(join1);
    }
    b.switch_to_block(join1);
    let first = b.phi(join1, &[x, y]);
    b.branch(cond, c1, c2);
    for block in [c1, c2] {
        b.switch_to_block(block);
        b.goto(join2);
    }
    b.switch_to_block(join2);
    b.phi(join2, &[first, x]);
    b.ret(x);
    let mut graph = b.build();
    assert_eq!(phi_count(&graph), 2);

    let config = OptimizerConfig::default();
    let unit = CompilationUnit::default();
    let mut opt = FlowGraphOptimizer::new(&mut graph, &config, &unit);
    assert!(opt.eliminate_dead_phis().unwrap());
    assert!(!opt.eliminate_dead_phis().unwrap());
    assert_eq!(phi_count(&graph), 0);
    verify(&graph, VerifyLevel::Input).unwrap();
}

#[test]
fn dominated_checks_are_not_repeated() {
    // (x + y) + x
    let mut b = FlowGraphBuilder::new("twice", 2);
    let (x, y) = (b.param(0), b.param(1));
    let sum = b.instance_call("+", &[x, y], None);
    let again = b.instance_call("+", &[sum, x], None);
    b.ret(again);
    let graph = b.build();
    let unit = uniform_feedback(&graph, SMIS);

    let outcome = optimize(&graph, &unit, &OptimizerConfig::default());
    let g = outcome.graph();
    assert_eq!(count(g, |op| matches!(op, Op::CheckSmi)), 2);
    assert_eq!(count(g, |op| matches!(op, Op::BinarySmiOp { .. })), 2);
}

#[test]
fn declined_specialization_leaves_graph_untouched() {
    // The right operand contradicts its feedback, so the double compare is
    // abandoned after its left check was already built.
    let mut b = FlowGraphBuilder::new("cmp", 1);
    let x = b.param(0);
    let s = b.constant(Constant::String("a".into()));
    let less = b.instance_call("<", &[x, s], None);
    b.ret(less);
    let mut graph = b.build();
    let unit = uniform_feedback(&graph, &[ClassId::DOUBLE, ClassId::DOUBLE]);
    let before = graph.instruction_count();
    let call = graph.producer(less);

    let config = OptimizerConfig::default();
    let mut opt = FlowGraphOptimizer::new(&mut graph, &config, &unit);
    opt.populate_with_ic_data();
    assert!(!opt.apply_ic_data().unwrap());
    assert_eq!(graph.instruction_count(), before);
    assert!(graph.is_linked(call));
    assert_eq!(graph.inputs(call), &[x, s]);
    assert_eq!(count(&graph, Op::is_check), 0);
    verify(&graph, VerifyLevel::Input).unwrap();
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

const OPS: &[BinaryOp] = &[
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::BitAnd,
    BinaryOp::BitOr,
    BinaryOp::BitXor,
];

/// One step of a straight-line Smi computation: an operator and two operand
/// picks. A pick below the number of values so far reads that value, any
/// other pick is a fresh constant.
#[derive(Debug, Clone)]
struct Step {
    op: usize,
    left: (usize, i64),
    right: (usize, i64),
}

fn step() -> impl Strategy<Value = Step> {
    (
        0..OPS.len(),
        (0usize..12, -64i64..64),
        (0usize..12, -64i64..64),
    )
        .prop_map(|(op, left, right)| Step { op, left, right })
}

fn build_straight_line(steps: &[Step]) -> FlowGraph {
    let mut b = FlowGraphBuilder::new("prop", 2);
    let mut values = vec![b.param(0), b.param(1)];
    for step in steps {
        let operand = |b: &mut FlowGraphBuilder, (pick, constant): (usize, i64)| {
            values.get(pick).copied().unwrap_or_else(|| b.smi(constant))
        };
        let left = operand(&mut b, step.left);
        let right = operand(&mut b, step.right);
        let op = OPS[step.op];
        let result = b.emit(
            Op::BinarySmiOp {
                op,
                can_overflow: op.can_overflow_smi(),
            },
            &[left, right],
        );
        values.push(result);
    }
    let last = values[values.len() - 1];
    b.ret(last);
    b.build()
}

proptest! {
    #[test]
    fn canonicalize_reaches_a_fixpoint(steps in prop::collection::vec(step(), 1..10)) {
        let mut graph = build_straight_line(&steps);
        let config = OptimizerConfig::default();
        let unit = CompilationUnit::default();
        let mut opt = FlowGraphOptimizer::new(&mut graph, &config, &unit);
        opt.canonicalize().unwrap();
        prop_assert!(!opt.canonicalize().unwrap());
    }

    #[test]
    fn use_lists_stay_consistent(steps in prop::collection::vec(step(), 1..10)) {
        let graph = build_straight_line(&steps);
        let unit = CompilationUnit::default();
        let outcome = optimize(&graph, &unit, &OptimizerConfig::default());
        prop_assert!(outcome.is_optimized());
        prop_assert!(verify(outcome.graph(), VerifyLevel::Output).is_ok());
    }
}
