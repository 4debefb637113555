//! Dominance and loop structure over a flow graph's blocks.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::block::BlockId;
use super::graph::FlowGraph;

const UNDEFINED: usize = usize::MAX;

/// Dominator tree of the blocks reachable from the entry.
///
/// Blocks are numbered by reverse postorder; `parent[n]` is the RPO number
/// of block `n`'s immediate dominator, and the entry is its own parent.
#[derive(Debug, Clone)]
pub struct Dominators {
    rpo: Vec<BlockId>,
    number: HashMap<BlockId, usize>,
    parent: Vec<usize>,
}

impl Dominators {
    /// Iterative dataflow formulation of Cooper, Harvey and Kennedy.
    pub fn compute(graph: &FlowGraph) -> Self {
        let rpo = graph.reverse_postorder();
        let number: HashMap<BlockId, usize> =
            rpo.iter().copied().zip(0..).collect();
        let mut parent = vec![UNDEFINED; rpo.len()];
        if rpo.is_empty() {
            return Self { rpo, number, parent };
        }
        parent[0] = 0;

        let meet = |parent: &[usize], mut x: usize, mut y: usize| {
            while x != y {
                while x > y {
                    x = parent[x];
                }
                while y > x {
                    y = parent[y];
                }
            }
            x
        };

        loop {
            let mut stable = true;
            for n in 1..rpo.len() {
                let processed = graph.block(rpo[n]).preds.iter().filter_map(|p| {
                    number.get(p).copied().filter(|&m| parent[m] != UNDEFINED)
                });
                let Some(new_parent) = processed.reduce(|x, y| meet(&parent, x, y)) else {
                    continue;
                };
                if parent[n] != new_parent {
                    parent[n] = new_parent;
                    stable = false;
                }
            }
            if stable {
                break;
            }
        }

        Self { rpo, number, parent }
    }

    /// Whether every path from the entry to `b` passes through `a`.
    /// Unreachable blocks are dominated by nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(&a), Some(&b)) = (self.number.get(&a), self.number.get(&b)) else {
            return false;
        };
        // Dominators have smaller RPO numbers, so the climb stops at `a`.
        let mut n = b;
        while n > a {
            n = self.parent[n];
        }
        n == a
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let n = *self.number.get(&block)?;
        (n != 0).then(|| self.rpo[self.parent[n]])
    }

    /// Reverse postorder the tree was built over.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }
}

/// A loop header and the blocks that reach one of its back edges without
/// passing through it.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: BlockId,
    pub body: HashSet<BlockId>,
}

/// Natural loops keyed by header, one per header even with several back
/// edges. Sorted by header.
pub fn detect_loops(graph: &FlowGraph, doms: &Dominators) -> Vec<NaturalLoop> {
    let mut by_header: BTreeMap<BlockId, HashSet<BlockId>> = BTreeMap::new();

    for &latch in doms.rpo() {
        for header in graph.successors(latch) {
            if !doms.dominates(header, latch) {
                continue;
            }
            let body = by_header
                .entry(header)
                .or_insert_with(|| HashSet::from([header]));
            let mut stack = vec![latch];
            while let Some(block) = stack.pop() {
                if body.insert(block) {
                    stack.extend(graph.block(block).preds.iter().copied());
                }
            }
        }
    }

    by_header
        .into_iter()
        .map(|(header, body)| NaturalLoop { header, body })
        .collect()
}

/// Every block that sits inside some loop.
pub fn loop_blocks(graph: &FlowGraph) -> HashSet<BlockId> {
    let doms = Dominators::compute(graph);
    detect_loops(graph, &doms)
        .into_iter()
        .flat_map(|l| l.body)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FlowGraphBuilder;
    use crate::ir::value::Constant;

    /// entry -> header <-> body, header -> exit
    fn single_loop() -> (FlowGraph, [BlockId; 4]) {
        let mut b = FlowGraphBuilder::new("loop", 1);
        let entry = b.entry_block();
        let header = b.create_join_block();
        let body = b.create_target_block();
        let exit = b.create_target_block();
        b.goto(header);
        b.switch_to_block(header);
        let cond = b.constant(Constant::Bool(true));
        b.branch(cond, body, exit);
        b.switch_to_block(body);
        b.goto(header);
        b.switch_to_block(exit);
        let p = b.param(0);
        b.ret(p);
        (b.build(), [entry, header, body, exit])
    }

    #[test]
    fn header_dominates_body_and_exit() {
        let (g, [entry, header, body, exit]) = single_loop();
        let doms = Dominators::compute(&g);
        for b in [header, body, exit] {
            assert!(doms.dominates(entry, b));
        }
        assert!(doms.dominates(header, body));
        assert!(!doms.dominates(body, exit));
        assert!(!doms.dominates(body, header));
        assert_eq!(doms.idom(exit), Some(header));
        assert_eq!(doms.idom(entry), None);
    }

    #[test]
    fn back_edge_forms_loop() {
        let (g, [entry, header, body, exit]) = single_loop();
        let loops = detect_loops(&g, &Dominators::compute(&g));
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].header, header);
        assert_eq!(loops[0].body, HashSet::from([header, body]));
        assert!(!loop_blocks(&g).contains(&exit));
        assert!(!loop_blocks(&g).contains(&entry));
    }

    #[test]
    fn diamond_join_is_dominated_by_the_branch() {
        let mut b = FlowGraphBuilder::new("diamond", 1);
        let entry = b.entry_block();
        let cond = b.param(0);
        let (left, right, join) = (
            b.create_target_block(),
            b.create_target_block(),
            b.create_join_block(),
        );
        b.branch(cond, left, right);
        for block in [left, right] {
            b.switch_to_block(block);
            b.goto(join);
        }
        b.switch_to_block(join);
        b.ret(cond);
        let g = b.build();

        let doms = Dominators::compute(&g);
        assert_eq!(doms.idom(join), Some(entry));
        assert!(!doms.dominates(left, join));
        assert!(detect_loops(&g, &doms).is_empty());
    }
}
