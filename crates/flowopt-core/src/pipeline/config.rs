use serde::{Deserialize, Serialize};

use crate::error::OptError;

/// Configuration for which optimizer passes to run.
///
/// All passes are enabled by default. Disable individual passes by setting
/// their fields to `false`, or use `from_skip_list` with pass name strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub populate_ic_data: bool,
    pub apply_ic_data: bool,
    pub apply_class_ids: bool,
    /// The specialization fixpoint group as a whole.
    pub specialize: bool,
    pub optimize_patterns: bool,
    pub eliminate_dead_phis: bool,
    pub widen_smi_to_int32: bool,
    pub select_representations: bool,
    pub canonicalize: bool,
    pub eliminate_environments: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            populate_ic_data: true,
            apply_ic_data: true,
            apply_class_ids: true,
            specialize: true,
            optimize_patterns: true,
            eliminate_dead_phis: true,
            widen_smi_to_int32: true,
            select_representations: true,
            canonicalize: true,
            eliminate_environments: true,
        }
    }
}

impl PassConfig {
    /// Create a config with all passes enabled except those in the skip list.
    ///
    /// Pass names correspond to `Transform::name()` values:
    /// - `"populate-ic-data"`
    /// - `"apply-ic-data"`
    /// - `"apply-class-ids"`
    /// - `"specialize"`: the whole fixpoint group
    /// - `"optimize-patterns"`
    /// - `"eliminate-dead-phis"`
    /// - `"widen-smi-to-int32"`
    /// - `"select-representations"`
    /// - `"canonicalize"`: both inside and after the fixpoint group
    /// - `"eliminate-environments"`
    pub fn from_skip_list(skip: &[&str]) -> Self {
        let mut config = Self::default();
        config.skip(skip);
        config
    }

    /// Disable every pass named in `skip`. Unknown names are ignored.
    pub fn skip(&mut self, skip: &[&str]) {
        for name in skip {
            match *name {
                "populate-ic-data" => self.populate_ic_data = false,
                "apply-ic-data" => self.apply_ic_data = false,
                "apply-class-ids" => self.apply_class_ids = false,
                "specialize" => self.specialize = false,
                "optimize-patterns" => self.optimize_patterns = false,
                "eliminate-dead-phis" => self.eliminate_dead_phis = false,
                "widen-smi-to-int32" => self.widen_smi_to_int32 = false,
                "select-representations" => self.select_representations = false,
                "canonicalize" => self.canonicalize = false,
                "eliminate-environments" => self.eliminate_environments = false,
                _ => {}
            }
        }
    }
}

/// Machine parameters the optimizer specializes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Bytes per machine word.
    pub word_size: u32,
    /// Bits of a Smi payload, sign included.
    pub smi_bits: u32,
}

impl Default for TargetConfig {
    /// 32-bit ARM.
    fn default() -> Self {
        Self {
            word_size: 4,
            smi_bits: 31,
        }
    }
}

impl TargetConfig {
    pub fn smi_min(&self) -> i64 {
        -(1i64 << (self.smi_bits - 1))
    }

    pub fn smi_max(&self) -> i64 {
        (1i64 << (self.smi_bits - 1)) - 1
    }

    pub fn is_smi(&self, value: i64) -> bool {
        (self.smi_min()..=self.smi_max()).contains(&value)
    }

    /// Whether every Smi fits in an unboxed int32.
    pub fn smi_fits_int32(&self) -> bool {
        self.smi_bits <= 32
    }
}

/// Tunables of one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub passes: PassConfig,
    /// Largest number of receiver classes a call is specialized for.
    pub max_polymorphic_checks: usize,
    /// Abort the unit when the graph grows past this many instructions.
    pub max_instructions: usize,
    /// Bound on rounds of the specialization fixpoint group.
    pub max_fixpoint_iterations: usize,
    /// Bound on worklist rounds inside one canonicalize run.
    pub max_canonicalize_iterations: usize,
    /// When false, no transformation that relies on a deoptimizing guard is
    /// attempted for inlining.
    pub use_speculative_inlining: bool,
    /// Deoptimizations a blacklisted site may cause before the unit stops
    /// being optimized.
    pub max_deopt_retries: u32,
    pub target: TargetConfig,
    /// Verify graph structure after every pass.
    pub verify_each_pass: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            passes: PassConfig::default(),
            max_polymorphic_checks: 4,
            max_instructions: 20_000,
            max_fixpoint_iterations: 4,
            max_canonicalize_iterations: 16,
            use_speculative_inlining: true,
            max_deopt_retries: 3,
            target: TargetConfig::default(),
            verify_each_pass: false,
        }
    }
}

impl OptimizerConfig {
    pub fn from_json(json: &str) -> Result<Self, OptError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_all() {
        let config = PassConfig::default();
        assert!(config.populate_ic_data);
        assert!(config.specialize);
        assert!(config.optimize_patterns);
        assert!(config.select_representations);
        assert!(config.eliminate_environments);
    }

    #[test]
    fn skip_list_disables_passes() {
        let config = PassConfig::from_skip_list(&["widen-smi-to-int32", "optimize-patterns"]);
        assert!(!config.widen_smi_to_int32);
        assert!(!config.optimize_patterns);
        assert!(config.canonicalize);
        assert!(config.eliminate_dead_phis);
    }

    #[test]
    fn skip_list_unknown_ignored() {
        let config = PassConfig::from_skip_list(&["nonexistent-pass"]);
        assert_eq!(config, PassConfig::default());
    }

    #[test]
    fn arm32_smi_range() {
        let target = TargetConfig::default();
        assert_eq!(target.smi_max(), (1 << 30) - 1);
        assert_eq!(target.smi_min(), -(1 << 30));
        assert!(target.is_smi(-(1 << 30)));
        assert!(!target.is_smi(1 << 30));
        assert!(target.smi_fits_int32());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            OptimizerConfig::from_json(r#"{ "max_polymorphic_checks": 2, "passes": { "canonicalize": false } }"#)
                .unwrap();
        assert_eq!(config.max_polymorphic_checks, 2);
        assert!(!config.passes.canonicalize);
        assert!(config.passes.specialize);
        assert_eq!(config.target, TargetConfig::default());
    }
}
