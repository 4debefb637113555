//! Stress tests: run the passes over generated graphs of varied shape and
//! feedback, then check:
//! 1. No panics
//! 2. Output is well-formed
//! 3. Local passes are idempotent (second run reports no changes)

use crate::compile::{optimize, CompilationUnit, CompileOutcome};
use crate::ir::{
    verify, ClassId, ClassTable, Constant, FeedbackStore, FlowGraph, FlowGraphBuilder, IcData,
    Op, SelectorKind, VerifyLevel,
};
use crate::optimizer::test_helpers::{assert_well_formed, with_optimizer};
use crate::optimizer::FlowGraphOptimizer;
use crate::pipeline::{OptimizerConfig, Transform};
use crate::transforms::{
    ApplyClassIds, ApplyIcData, Canonicalize, EliminateDeadPhis, EliminateEnvironments,
    OptimizePatterns, PopulateIcData, SelectRepresentations, WidenSmiToInt32,
};

/// What every call in a generated graph has observed.
#[derive(Debug, Clone, Copy)]
enum Seen {
    Smis,
    Doubles,
    Nothing,
}

const FEEDBACK: &[Seen] = &[Seen::Smis, Seen::Doubles, Seen::Nothing];

/// Record `seen` for every call in `graph`, keyed by the call's deopt id.
fn feedback_for(graph: &FlowGraph, seen: Seen) -> CompilationUnit {
    let cid = match seen {
        Seen::Smis => ClassId::SMI,
        Seen::Doubles => ClassId::DOUBLE,
        Seen::Nothing => return CompilationUnit::default(),
    };
    let mut feedback = FeedbackStore::new();
    for inst in graph.linked_instructions() {
        let Op::InstanceCall(call) = graph.op(inst) else {
            continue;
        };
        let tested = SelectorKind::classify(&call.selector, call.arg_count).num_args_tested();
        let cids = vec![cid; tested as usize];
        if let Some(deopt_id) = graph.deopt_id(inst) {
            feedback.insert(deopt_id, IcData::new(tested).with_entry(&cids, 10, None));
        }
    }
    CompilationUnit::new(feedback, ClassTable::default())
}

/// A chain of `n` blocks, each adding one to the running value.
fn build_linear_chain(n: usize) -> FlowGraph {
    let mut b = FlowGraphBuilder::new("chain", 1);
    let mut current = b.param(0);
    for _ in 0..n {
        let next = b.create_target_block();
        b.goto(next);
        b.switch_to_block(next);
        let one = b.smi(1);
        current = b.instance_call("+", &[current, one], None);
    }
    b.ret(current);
    b.build()
}

/// `cond ? val + 1 : val`, merged by a phi.
fn build_diamond() -> FlowGraph {
    let mut b = FlowGraphBuilder::new("diamond", 2);
    let (cond, val) = (b.param(0), b.param(1));
    let then_b = b.create_target_block();
    let else_b = b.create_target_block();
    let merge = b.create_join_block();
    b.branch(cond, then_b, else_b);

    b.switch_to_block(then_b);
    let one = b.smi(1);
    let sum = b.instance_call("+", &[val, one], None);
    b.goto(merge);

    b.switch_to_block(else_b);
    b.goto(merge);

    b.switch_to_block(merge);
    let merged = b.phi(merge, &[sum, val]);
    b.ret(merged);
    b.build()
}

/// `i = 0; while (i < n) i = i + 1; return i;`
fn build_counting_loop() -> FlowGraph {
    let mut b = FlowGraphBuilder::new("count", 1);
    let n = b.param(0);
    let header = b.create_join_block();
    let body = b.create_target_block();
    let exit = b.create_target_block();
    let zero = b.smi(0);
    b.goto(header);

    b.switch_to_block(header);
    let i = b.phi(header, &[zero]);
    let cmp = b.instance_call("<", &[i, n], None);
    b.branch(cmp, body, exit);

    b.switch_to_block(body);
    let one = b.smi(1);
    let next = b.instance_call("+", &[i, one], None);
    b.goto(header);
    b.set_phi_inputs(i, &[zero, next]);

    b.switch_to_block(exit);
    b.ret(i);
    b.build()
}

/// `acc = 1.0; while (..) acc = acc * x; return acc;`
fn build_product_loop() -> FlowGraph {
    let mut b = FlowGraphBuilder::new("product", 1);
    let x = b.param(0);
    let header = b.create_join_block();
    let body = b.create_target_block();
    let exit = b.create_target_block();
    let start = b.double(1.0);
    b.goto(header);

    b.switch_to_block(header);
    let acc = b.phi(header, &[start]);
    let cond = b.constant(Constant::Bool(true));
    b.branch(cond, body, exit);

    b.switch_to_block(body);
    let product = b.instance_call("*", &[acc, x], None);
    b.goto(header);
    b.set_phi_inputs(acc, &[start, product]);

    b.switch_to_block(exit);
    b.ret(acc);
    b.build()
}

/// `(x ~/ y) + (x % y)`
fn build_div_mod() -> FlowGraph {
    let mut b = FlowGraphBuilder::new("divmod", 2);
    let (x, y) = (b.param(0), b.param(1));
    let quotient = b.instance_call("~/", &[x, y], None);
    let remainder = b.instance_call("%", &[x, y], None);
    let sum = b.instance_call("+", &[quotient, remainder], None);
    b.ret(sum);
    b.build()
}

fn all_shapes() -> Vec<(&'static str, FlowGraph)> {
    let mut shapes: Vec<(&'static str, FlowGraph)> = [1, 3, 8]
        .into_iter()
        .map(|n| ("chain", build_linear_chain(n)))
        .collect();
    shapes.push(("diamond", build_diamond()));
    shapes.push(("counting loop", build_counting_loop()));
    shapes.push(("product loop", build_product_loop()));
    shapes.push(("div/mod", build_div_mod()));
    shapes
}

/// Feedback population and the specialization passes, once each.
fn specialize(opt: &mut FlowGraphOptimizer<'_>) {
    for pass in [
        &PopulateIcData as &dyn Transform,
        &ApplyIcData,
        &ApplyClassIds,
        &Canonicalize,
    ] {
        pass.apply(opt).unwrap();
    }
}

#[test]
fn full_pipeline_always_optimizes() {
    let config = OptimizerConfig::default();
    for (shape, graph) in all_shapes() {
        for &seen in FEEDBACK {
            let unit = feedback_for(&graph, seen);
            let outcome = optimize(&graph, &unit, &config);
            if let CompileOutcome::Unoptimized { reason, .. } = &outcome {
                panic!("{shape} with {seen:?} feedback was not optimized: {reason}");
            }
            verify(outcome.graph(), VerifyLevel::Output).unwrap();
        }
    }
}

#[test]
fn every_pass_leaves_a_well_formed_graph() {
    let passes: [&dyn Transform; 9] = [
        &PopulateIcData,
        &ApplyIcData,
        &ApplyClassIds,
        &Canonicalize,
        &OptimizePatterns,
        &EliminateDeadPhis,
        &WidenSmiToInt32,
        &SelectRepresentations,
        &EliminateEnvironments,
    ];
    for (shape, graph) in all_shapes() {
        for &seen in FEEDBACK {
            let unit = feedback_for(&graph, seen);
            let mut working = graph.clone();
            with_optimizer(&mut working, &unit, |opt| {
                for pass in passes {
                    if let Err(e) = pass.apply(opt) {
                        panic!("{} failed on {shape} with {seen:?}: {e}", pass.name());
                    }
                    assert_well_formed(opt.graph());
                }
            });
            verify(&working, VerifyLevel::Output).unwrap();
        }
    }
}

#[test]
fn canonicalize_is_idempotent() {
    for (shape, graph) in all_shapes() {
        for &seen in FEEDBACK {
            let unit = feedback_for(&graph, seen);
            let mut working = graph.clone();
            let again = with_optimizer(&mut working, &unit, |opt| {
                specialize(opt);
                Canonicalize.apply(opt).unwrap().changed
            });
            assert!(!again, "canonicalize not idempotent on {shape} with {seen:?}");
        }
    }
}

#[test]
fn dead_phi_elimination_is_idempotent() {
    for (shape, graph) in all_shapes() {
        for &seen in FEEDBACK {
            let unit = feedback_for(&graph, seen);
            let mut working = graph.clone();
            let again = with_optimizer(&mut working, &unit, |opt| {
                specialize(opt);
                EliminateDeadPhis.apply(opt).unwrap();
                EliminateDeadPhis.apply(opt).unwrap().changed
            });
            assert!(!again, "dead phi elimination not idempotent on {shape} with {seen:?}");
        }
    }
}

#[test]
fn pattern_optimization_is_idempotent() {
    for (shape, graph) in all_shapes() {
        for &seen in FEEDBACK {
            let unit = feedback_for(&graph, seen);
            let mut working = graph.clone();
            let again = with_optimizer(&mut working, &unit, |opt| {
                specialize(opt);
                OptimizePatterns.apply(opt).unwrap();
                OptimizePatterns.apply(opt).unwrap().changed
            });
            assert!(!again, "patterns not idempotent on {shape} with {seen:?}");
            assert_well_formed(&working);
        }
    }
}
