//! Compilation driver: per-unit state, whole-unit rollback and batch
//! compilation.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info_span, warn};

use crate::error::OptError;
use crate::ir::{verify, ClassTable, DeoptId, FeedbackStore, FlowGraph, VerifyLevel};
use crate::optimizer::FlowGraphOptimizer;
use crate::pipeline::OptimizerConfig;
use crate::transforms::default_pipeline;

/// Everything the optimizer knows about one function besides its graph.
///
/// Owned by the caller and threaded explicitly through [`optimize`]; nothing
/// here is shared between units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationUnit {
    pub feedback: FeedbackStore,
    pub class_table: ClassTable,
    /// Deopt ids at which speculative inlining previously failed.
    blacklist: BTreeSet<DeoptId>,
    /// Deoptimizations observed per site.
    deopt_counts: BTreeMap<DeoptId, u32>,
    /// Set once a site deoptimized too often; the unit then stays
    /// unoptimized.
    disabled: Option<DeoptId>,
}

/// What the runtime should do after a deoptimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptAction {
    /// Recompile with the site blacklisted for speculation.
    Recompile,
    /// Stop optimizing the unit.
    DisableOptimization,
}

impl CompilationUnit {
    pub fn new(feedback: FeedbackStore, class_table: ClassTable) -> Self {
        Self {
            feedback,
            class_table,
            ..Self::default()
        }
    }

    pub fn is_black_listed(&self, deopt_id: DeoptId) -> bool {
        self.blacklist.contains(&deopt_id)
    }

    pub fn black_list(&mut self, deopt_id: DeoptId) {
        self.blacklist.insert(deopt_id);
    }

    pub fn deopt_count(&self, deopt_id: DeoptId) -> u32 {
        self.deopt_counts.get(&deopt_id).copied().unwrap_or(0)
    }

    pub fn disabled(&self) -> Option<DeoptId> {
        self.disabled
    }

    /// Record a deoptimization at `deopt_id`. The site is blacklisted; once a
    /// blacklisted site deoptimizes more than `max_retries` times the unit
    /// is no longer optimized.
    pub fn record_deopt(&mut self, deopt_id: DeoptId, max_retries: u32) -> DeoptAction {
        let was_black_listed = !self.blacklist.insert(deopt_id);
        let count = self.deopt_counts.entry(deopt_id).or_insert(0);
        *count = count.saturating_add(1);
        if was_black_listed && *count > max_retries {
            warn!(?deopt_id, count = *count, "disabling optimization");
            self.disabled = Some(deopt_id);
            DeoptAction::DisableOptimization
        } else {
            debug!(?deopt_id, count = *count, "blacklisted for speculation");
            DeoptAction::Recompile
        }
    }
}

/// Result of compiling one unit.
#[derive(Debug)]
pub enum CompileOutcome {
    Optimized(FlowGraph),
    /// The optimizer gave up; `graph` is the input graph, untouched.
    Unoptimized { graph: FlowGraph, reason: OptError },
}

impl CompileOutcome {
    pub fn graph(&self) -> &FlowGraph {
        match self {
            CompileOutcome::Optimized(graph) | CompileOutcome::Unoptimized { graph, .. } => graph,
        }
    }

    pub fn into_graph(self) -> FlowGraph {
        match self {
            CompileOutcome::Optimized(graph) | CompileOutcome::Unoptimized { graph, .. } => graph,
        }
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self, CompileOutcome::Optimized(_))
    }
}

/// Optimize `graph` with the default pipeline. Any error rolls the whole unit
/// back to the input graph.
pub fn optimize(graph: &FlowGraph, unit: &CompilationUnit, config: &OptimizerConfig) -> CompileOutcome {
    let span = info_span!("optimize", function = %graph.name);
    let _enter = span.enter();

    match try_optimize(graph, unit, config) {
        Ok(optimized) => CompileOutcome::Optimized(optimized),
        Err(reason) => {
            match &reason {
                OptError::OptimizationDisabled { .. } | OptError::TooManyInstructions { .. } => {
                    warn!(%reason, "keeping unoptimized graph");
                }
                _ => error!(%reason, "optimization aborted"),
            }
            CompileOutcome::Unoptimized {
                graph: graph.clone(),
                reason,
            }
        }
    }
}

fn try_optimize(
    graph: &FlowGraph,
    unit: &CompilationUnit,
    config: &OptimizerConfig,
) -> Result<FlowGraph, OptError> {
    if let Some(deopt_id) = unit.disabled() {
        return Err(OptError::OptimizationDisabled { deopt_id });
    }
    verify(graph, VerifyLevel::Input)?;

    let mut working = graph.clone();
    let pipeline = default_pipeline(config);
    let mut opt = FlowGraphOptimizer::new(&mut working, config, unit);
    pipeline.run(&mut opt)?;
    let selected = opt.representations_selected();

    let level = if selected {
        VerifyLevel::Output
    } else {
        VerifyLevel::Input
    };
    verify(&working, level)?;
    Ok(working)
}

/// Optimize independent units in parallel. Outcomes keep the input order.
pub fn optimize_batch(
    units: &[(FlowGraph, CompilationUnit)],
    config: &OptimizerConfig,
) -> Vec<CompileOutcome> {
    units
        .par_iter()
        .map(|(graph, unit)| optimize(graph, unit, config))
        .collect()
}
