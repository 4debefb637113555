pub mod fixpoint;
pub mod passes;

#[cfg(test)]
mod stress_tests;

pub use fixpoint::Specialize;
pub use passes::{
    ApplyClassIds, ApplyIcData, Canonicalize, EliminateDeadPhis, EliminateEnvironments,
    OptimizePatterns, PopulateIcData, SelectRepresentations, WidenSmiToInt32,
};

use crate::pipeline::{OptimizerConfig, Transform, TransformPipeline};

/// Build the optimizer pipeline, leaving out the passes `config` disables.
pub fn default_pipeline(config: &OptimizerConfig) -> TransformPipeline {
    let passes = &config.passes;
    let mut pipeline = TransformPipeline::new();
    if passes.populate_ic_data {
        pipeline.add(Box::new(PopulateIcData));
    }
    if passes.specialize {
        let mut members: Vec<Box<dyn Transform>> = Vec::new();
        if passes.apply_ic_data {
            members.push(Box::new(ApplyIcData));
        }
        if passes.apply_class_ids {
            members.push(Box::new(ApplyClassIds));
        }
        if passes.canonicalize {
            members.push(Box::new(Canonicalize));
        }
        if !members.is_empty() {
            pipeline.add(Box::new(Specialize::new(
                members,
                config.max_fixpoint_iterations,
            )));
        }
    }
    if passes.optimize_patterns {
        pipeline.add(Box::new(OptimizePatterns));
    }
    if passes.eliminate_dead_phis {
        pipeline.add(Box::new(EliminateDeadPhis));
    }
    if passes.widen_smi_to_int32 {
        pipeline.add(Box::new(WidenSmiToInt32));
    }
    if passes.select_representations {
        pipeline.add(Box::new(SelectRepresentations));
        if passes.canonicalize {
            pipeline.add(Box::new(Canonicalize));
        }
    }
    // Pruning is only legal once representations are fixed.
    if passes.eliminate_environments && passes.select_representations {
        pipeline.add(Box::new(EliminateEnvironments));
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PassConfig;

    #[test]
    fn default_order() {
        let pipeline = default_pipeline(&OptimizerConfig::default());
        assert_eq!(
            pipeline.names(),
            vec![
                "populate-ic-data",
                "specialize",
                "optimize-patterns",
                "eliminate-dead-phis",
                "widen-smi-to-int32",
                "select-representations",
                "canonicalize",
                "eliminate-environments",
            ]
        );
    }

    #[test]
    fn skipped_passes_are_left_out() {
        let config = OptimizerConfig {
            passes: PassConfig::from_skip_list(&["widen-smi-to-int32", "canonicalize"]),
            ..OptimizerConfig::default()
        };
        assert_eq!(
            default_pipeline(&config).names(),
            vec![
                "populate-ic-data",
                "specialize",
                "optimize-patterns",
                "eliminate-dead-phis",
                "select-representations",
                "eliminate-environments",
            ]
        );
    }

    #[test]
    fn pruning_needs_selection() {
        let config = OptimizerConfig {
            passes: PassConfig::from_skip_list(&["select-representations"]),
            ..OptimizerConfig::default()
        };
        let names = default_pipeline(&config).names();
        assert!(!names.contains(&"eliminate-environments"));
        assert!(!names.contains(&"select-representations"));
    }
}
