use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::inst::InstId;

define_entity!(BlockId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Entry,
    /// Merge point; the only kind that may carry phis.
    Join,
    /// Single-predecessor branch target.
    Target,
}

/// A basic block. Phis are kept apart from the ordered instruction list,
/// whose last element is the terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default)]
    pub preds: Vec<BlockId>,
    #[serde(default)]
    pub phis: Vec<InstId>,
    #[serde(default)]
    pub insts: Vec<InstId>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            preds: Vec::new(),
            phis: Vec::new(),
            insts: Vec::new(),
        }
    }
}
