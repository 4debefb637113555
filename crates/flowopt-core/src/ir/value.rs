use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::class_id::ClassId;
use super::inst::InstId;

define_entity!(ValueId);

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    /// Integer known to fit the target's Smi range.
    Smi(i64),
    /// Integer outside the Smi range.
    Mint(i64),
    Double(f64),
    String(String),
}

impl Constant {
    /// Class id of the boxed constant.
    pub fn cid(&self) -> ClassId {
        match self {
            Constant::Null => ClassId::NULL,
            Constant::Bool(_) => ClassId::BOOL,
            Constant::Smi(_) => ClassId::SMI,
            Constant::Mint(_) => ClassId::MINT,
            Constant::Double(_) => ClassId::DOUBLE,
            Constant::String(s) => {
                if s.chars().all(|c| (c as u32) < 0x100) {
                    ClassId::ONE_BYTE_STRING
                } else {
                    ClassId::TWO_BYTE_STRING
                }
            }
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Smi(v) | Constant::Mint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_smi(&self) -> Option<i64> {
        match self {
            Constant::Smi(v) => Some(*v),
            _ => None,
        }
    }

    /// True if this constant can be materialized directly in `rep`.
    pub fn is_representable_in(&self, rep: Representation) -> bool {
        match rep {
            Representation::Tagged => true,
            Representation::UnboxedInt32 => self
                .as_int()
                .is_some_and(|v| i32::try_from(v).is_ok()),
            Representation::UnboxedUint32 => self
                .as_int()
                .is_some_and(|v| u32::try_from(v).is_ok()),
            Representation::UnboxedInt64 => self.as_int().is_some(),
            Representation::UnboxedDouble => {
                matches!(self, Constant::Double(_) | Constant::Smi(_))
            }
            _ => false,
        }
    }
}

/// How a value is encoded at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    /// Boxed heap object or tagged Smi; the only encoding deoptimization
    /// understands.
    Tagged,
    UnboxedInt32,
    UnboxedUint32,
    UnboxedInt64,
    UnboxedDouble,
    UnboxedFloat32x4,
    UnboxedInt32x4,
    UnboxedFloat64x2,
    /// Raw pointer into an object's payload (external data).
    Untagged,
    /// Two tagged outputs of a merged instruction.
    PairOfTagged,
    /// Two unboxed double outputs of a merged instruction.
    PairOfUnboxedDouble,
    /// No value (void instructions).
    None,
}

impl Representation {
    pub fn is_unboxed(self) -> bool {
        !matches!(
            self,
            Representation::Tagged
                | Representation::Untagged
                | Representation::PairOfTagged
                | Representation::PairOfUnboxedDouble
                | Representation::None
        )
    }

    pub fn is_unboxed_integer(self) -> bool {
        matches!(
            self,
            Representation::UnboxedInt32 | Representation::UnboxedUint32 | Representation::UnboxedInt64
        )
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Representation::Tagged => "tagged",
            Representation::UnboxedInt32 => "int32",
            Representation::UnboxedUint32 => "uint32",
            Representation::UnboxedInt64 => "int64",
            Representation::UnboxedDouble => "double",
            Representation::UnboxedFloat32x4 => "float32x4",
            Representation::UnboxedInt32x4 => "int32x4",
            Representation::UnboxedFloat64x2 => "float64x2",
            Representation::Untagged => "untagged",
            Representation::PairOfTagged => "pair<tagged>",
            Representation::PairOfUnboxedDouble => "pair<double>",
            Representation::None => "none",
        }
    }
}

/// Deoptimization id: the point in unoptimized code a failed speculation
/// resumes at.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeoptId(pub u32);

/// Which slot of the user reads the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UseSlot {
    /// Operand `i` of the user.
    Input(u32),
    /// Slot `i` of the user's deoptimization environment.
    Env(u32),
}

/// A use edge from a consuming instruction to a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Use {
    pub user: InstId,
    pub slot: UseSlot,
}

impl Use {
    pub fn input(user: InstId, index: usize) -> Self {
        Use {
            user,
            slot: UseSlot::Input(index as u32),
        }
    }

    pub fn env(user: InstId, index: usize) -> Self {
        Use {
            user,
            slot: UseSlot::Env(index as u32),
        }
    }

    pub fn is_environment_use(&self) -> bool {
        matches!(self.slot, UseSlot::Env(_))
    }
}

/// An SSA definition: the value an instruction produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    /// The producing instruction.
    pub inst: InstId,
    /// Selected representation.
    pub rep: Representation,
    /// Every live read of this value. Rebuilt on deserialization.
    #[serde(skip)]
    pub uses: Vec<Use>,
}
