pub mod config;
pub mod transform;

pub use config::{OptimizerConfig, PassConfig, TargetConfig};
pub use transform::{Transform, TransformPipeline, TransformResult};
