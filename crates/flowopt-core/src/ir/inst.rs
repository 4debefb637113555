use serde::{Deserialize, Serialize};

use crate::define_entity;

use super::block::BlockId;
use super::class_id::{CidSet, ClassId, ElementKind};
use super::env::Environment;
use super::ic_data::{IcData, Target};
use super::recognized::{MathKind, SimdKind, SimdOp};
use super::value::{Constant, DeoptId, Representation, ValueId};

define_entity!(InstId);

/// An instruction: an operation over positional inputs with an optional
/// result definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instr {
    pub op: Op,
    #[serde(default)]
    pub inputs: Vec<ValueId>,
    #[serde(default)]
    pub result: Option<ValueId>,
    /// Owning block; `None` once unlinked.
    #[serde(default)]
    pub block: Option<BlockId>,
    #[serde(default)]
    pub deopt_id: Option<DeoptId>,
    #[serde(default)]
    pub env: Option<Environment>,
}

impl Instr {
    pub fn is_linked(&self) -> bool {
        self.block.is_some()
    }
}

/// Integer and double binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    TruncDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::TruncDiv => "~/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    /// Operators whose Smi result can leave the Smi range.
    pub fn can_overflow_smi(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::TruncDiv | BinaryOp::Shl
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    BitNot,
}

/// Comparison operators. `Eq`/`Ne` are equality; the rest relational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareKind {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareKind {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareKind::Eq => "==",
            CompareKind::Ne => "!=",
            CompareKind::Lt => "<",
            CompareKind::Gt => ">",
            CompareKind::Le => "<=",
            CompareKind::Ge => ">=",
        }
    }

    pub fn negate(self) -> Self {
        match self {
            CompareKind::Eq => CompareKind::Ne,
            CompareKind::Ne => CompareKind::Eq,
            CompareKind::Lt => CompareKind::Ge,
            CompareKind::Ge => CompareKind::Lt,
            CompareKind::Gt => CompareKind::Le,
            CompareKind::Le => CompareKind::Gt,
        }
    }

    /// Result of comparing a value with itself.
    pub fn reflexive_result(self) -> bool {
        matches!(self, CompareKind::Eq | CompareKind::Le | CompareKind::Ge)
    }
}

/// Operand class of a specialized comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberKind {
    Smi,
    Mint,
    Double,
}

impl NumberKind {
    pub fn operand_representation(self) -> Representation {
        match self {
            NumberKind::Smi => Representation::Tagged,
            NumberKind::Mint => Representation::UnboxedInt64,
            NumberKind::Double => Representation::UnboxedDouble,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathUnaryKind {
    Sqrt,
    DoubleSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergedMathKind {
    /// Outputs: 0 = sin, 1 = cos.
    SinCos,
}

/// Field or header slot of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    /// Offset in words from the object start.
    pub offset: u32,
    pub rep: Representation,
    #[serde(default)]
    pub cid: Option<ClassId>,
}

impl Slot {
    /// Length of arrays, typed data and strings.
    pub fn length() -> Self {
        Slot {
            name: "length".into(),
            offset: 1,
            rep: Representation::Tagged,
            cid: Some(ClassId::SMI),
        }
    }

    /// Backing array of a growable list.
    pub fn growable_data() -> Self {
        Slot {
            name: "data".into(),
            offset: 2,
            rep: Representation::Tagged,
            cid: Some(ClassId::ARRAY),
        }
    }

    /// Variable `index` of a context object.
    pub fn context_variable(index: u32) -> Self {
        Slot {
            name: format!("context[{index}]"),
            offset: 2 + index,
            rep: Representation::Tagged,
            cid: None,
        }
    }

    /// A user-class field at `offset`.
    pub fn field(name: impl Into<String>, offset: u32, cid: Option<ClassId>) -> Self {
        Slot {
            name: name.into(),
            offset,
            rep: Representation::Tagged,
            cid,
        }
    }
}

/// Static type test attached to `_instanceOf` / `_as` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTest {
    pub class: ClassId,
    #[serde(default)]
    pub negate: bool,
}

/// A dynamically dispatched call. Inputs: receiver, then arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCall {
    pub selector: String,
    /// Argument count including the receiver.
    pub arg_count: u32,
    #[serde(default)]
    pub ic_data: Option<IcData>,
    #[serde(default)]
    pub type_test: Option<TypeTest>,
}

/// One arm of a polymorphic dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicTarget {
    pub cid: ClassId,
    pub target: Target,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolymorphicCall {
    pub selector: String,
    pub arg_count: u32,
    /// Checked in order.
    pub targets: Vec<PolymorphicTarget>,
    /// Whether unmatched receivers fall back to a megamorphic lookup instead
    /// of deoptimizing.
    pub has_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticCall {
    pub target: Target,
    pub arg_count: u32,
    #[serde(default)]
    pub ic_data: Option<IcData>,
}

/// Instruction operations. Operands live in [`Instr::inputs`]; the input
/// layout of each variant is noted where it is not just "the operands".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Parameter(u32),
    Constant(Constant),
    /// A constant materialized directly in an unboxed representation.
    UnboxedConstant { value: Constant, rep: Representation },
    /// Inputs follow the owning block's predecessor order.
    Phi,

    Goto(BlockId),
    /// `[condition]`
    Branch { then_block: BlockId, else_block: BlockId },
    /// `[value]`
    Return,

    InstanceCall(InstanceCall),
    PolymorphicInstanceCall(PolymorphicCall),
    StaticCall(StaticCall),

    /// `[value]`
    CheckClass(CidSet),
    /// `[value]`
    CheckSmi,
    /// `[length, index]`
    CheckArrayBound,

    BinarySmiOp { op: BinaryOp, can_overflow: bool },
    BinaryInt32Op { op: BinaryOp, can_overflow: bool },
    BinaryMintOp { op: BinaryOp, can_overflow: bool },
    /// `(value << shift) & mask` without overflow check. `[value, shift]`
    /// With `check_count`, a shift count outside `0..smi_bits` deoptimizes.
    ShiftLeftMaskSmi { mask: i64, check_count: bool },
    UnarySmiOp(UnaryOp),
    UnaryMintOp(UnaryOp),
    /// Truncating division and modulo in one instruction. Outputs: 0 = `~/`,
    /// 1 = `%`.
    TruncDivMod,
    /// Projection of one output of a merged instruction. `[merged]`
    ExtractNthOutput {
        index: u8,
        rep: Representation,
        cid: ClassId,
    },
    BinaryDoubleOp(BinaryOp),
    UnaryDoubleOp(UnaryOp),
    MathUnary(MathUnaryKind),
    InvokeMathCFunction(MathKind),
    MergedMath(MergedMathKind),

    EqualityCompare { kind: CompareKind, operands: NumberKind },
    RelationalOp { kind: CompareKind, operands: NumberKind },
    /// Identity comparison of tagged values.
    StrictCompare { negate: bool },
    BooleanNegate,
    /// Class-id table lookup. With no default, unlisted classes deoptimize.
    /// `[value]`
    TestCids {
        table: Vec<(ClassId, bool)>,
        default: Option<bool>,
    },

    /// `[object]`
    LoadField(Slot),
    /// `[object, value]`
    StoreInstanceField { slot: Slot, unboxed: bool },
    /// `[array, index]`
    LoadIndexed { class_id: ClassId, index_scale: u32 },
    /// `[array, index, value]`
    StoreIndexed { class_id: ClassId, index_scale: u32 },
    /// `[string, index]`
    LoadCodeUnits {
        class_id: ClassId,
        element_count: u8,
        can_be_mint: bool,
    },
    /// `[char_code]`
    OneByteStringFromCharCode,
    /// Code unit of a one-character string, or -1 for any other length.
    /// `[string]`
    StringToCharCode,
    /// Payload pointer of an external object. `[object]`
    LoadUntagged { offset: u32 },
    AllocateContext { num_variables: u32 },
    AllocateUninitializedContext { num_variables: u32 },

    /// One input per lane.
    SimdConstruct(SimdKind),
    SimdZero(SimdKind),
    /// `[lane_value]`
    SimdSplat(SimdKind),
    /// `[simd]`
    SimdGetLane { kind: SimdKind, lane: u8 },
    SimdBinary { kind: SimdKind, op: SimdOp },

    /// Box an unboxed value. `[value]`
    Box(Representation),
    /// Unbox a tagged value. Speculative unboxes check the class and
    /// deoptimize on mismatch.
    Unbox { to: Representation, speculative: bool },
    IntConverter {
        from: Representation,
        to: Representation,
        truncating: bool,
    },
    IntToDouble(Representation),
    SmiToDouble,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Parameter(_) => "Parameter",
            Op::Constant(_) => "Constant",
            Op::UnboxedConstant { .. } => "UnboxedConstant",
            Op::Phi => "Phi",
            Op::Goto(_) => "Goto",
            Op::Branch { .. } => "Branch",
            Op::Return => "Return",
            Op::InstanceCall(_) => "InstanceCall",
            Op::PolymorphicInstanceCall(_) => "PolymorphicInstanceCall",
            Op::StaticCall(_) => "StaticCall",
            Op::CheckClass(_) => "CheckClass",
            Op::CheckSmi => "CheckSmi",
            Op::CheckArrayBound => "CheckArrayBound",
            Op::BinarySmiOp { .. } => "BinarySmiOp",
            Op::BinaryInt32Op { .. } => "BinaryInt32Op",
            Op::BinaryMintOp { .. } => "BinaryMintOp",
            Op::ShiftLeftMaskSmi { .. } => "ShiftLeftMaskSmi",
            Op::UnarySmiOp(_) => "UnarySmiOp",
            Op::UnaryMintOp(_) => "UnaryMintOp",
            Op::TruncDivMod => "TruncDivMod",
            Op::ExtractNthOutput { .. } => "ExtractNthOutput",
            Op::BinaryDoubleOp(_) => "BinaryDoubleOp",
            Op::UnaryDoubleOp(_) => "UnaryDoubleOp",
            Op::MathUnary(_) => "MathUnary",
            Op::InvokeMathCFunction(_) => "InvokeMathCFunction",
            Op::MergedMath(_) => "MergedMath",
            Op::EqualityCompare { .. } => "EqualityCompare",
            Op::RelationalOp { .. } => "RelationalOp",
            Op::StrictCompare { .. } => "StrictCompare",
            Op::BooleanNegate => "BooleanNegate",
            Op::TestCids { .. } => "TestCids",
            Op::LoadField(_) => "LoadField",
            Op::StoreInstanceField { .. } => "StoreInstanceField",
            Op::LoadIndexed { .. } => "LoadIndexed",
            Op::StoreIndexed { .. } => "StoreIndexed",
            Op::LoadCodeUnits { .. } => "LoadCodeUnits",
            Op::OneByteStringFromCharCode => "OneByteStringFromCharCode",
            Op::StringToCharCode => "StringToCharCode",
            Op::LoadUntagged { .. } => "LoadUntagged",
            Op::AllocateContext { .. } => "AllocateContext",
            Op::AllocateUninitializedContext { .. } => "AllocateUninitializedContext",
            Op::SimdConstruct(_) => "SimdConstruct",
            Op::SimdZero(_) => "SimdZero",
            Op::SimdSplat(_) => "SimdSplat",
            Op::SimdGetLane { .. } => "SimdGetLane",
            Op::SimdBinary { .. } => "SimdBinary",
            Op::Box(_) => "Box",
            Op::Unbox { .. } => "Unbox",
            Op::IntConverter { .. } => "IntConverter",
            Op::IntToDouble(_) => "IntToDouble",
            Op::SmiToDouble => "SmiToDouble",
        }
    }

    pub fn has_result(&self) -> bool {
        !matches!(
            self,
            Op::Goto(_)
                | Op::Branch { .. }
                | Op::Return
                | Op::CheckClass(_)
                | Op::CheckSmi
                | Op::CheckArrayBound
                | Op::StoreInstanceField { .. }
                | Op::StoreIndexed { .. }
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Goto(_) | Op::Branch { .. } | Op::Return)
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Op::InstanceCall(_) | Op::PolymorphicInstanceCall(_) | Op::StaticCall(_)
        )
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Op::CheckClass(_) | Op::CheckSmi)
    }

    /// Representation of the result when the instruction is created.
    pub fn default_representation(&self) -> Representation {
        match self {
            _ if !self.has_result() => Representation::None,
            Op::UnboxedConstant { rep, .. } => *rep,
            Op::BinaryInt32Op { .. } => Representation::UnboxedInt32,
            Op::BinaryMintOp { .. } | Op::UnaryMintOp(_) => Representation::UnboxedInt64,
            Op::TruncDivMod => Representation::PairOfTagged,
            Op::ExtractNthOutput { rep, .. } => *rep,
            Op::BinaryDoubleOp(_)
            | Op::UnaryDoubleOp(_)
            | Op::MathUnary(_)
            | Op::InvokeMathCFunction(_)
            | Op::IntToDouble(_)
            | Op::SmiToDouble => Representation::UnboxedDouble,
            Op::MergedMath(_) => Representation::PairOfUnboxedDouble,
            Op::LoadField(slot) => slot.rep,
            Op::LoadIndexed { class_id, .. } => class_id
                .element_kind()
                .map_or(Representation::Tagged, ElementKind::load_representation),
            Op::LoadCodeUnits { can_be_mint, .. } => {
                if *can_be_mint {
                    Representation::UnboxedInt64
                } else {
                    Representation::Tagged
                }
            }
            Op::LoadUntagged { .. } => Representation::Untagged,
            Op::SimdConstruct(kind)
            | Op::SimdZero(kind)
            | Op::SimdSplat(kind)
            | Op::SimdBinary { kind, .. } => kind.representation(),
            Op::SimdGetLane { kind, .. } => kind.lane_representation(),
            Op::Unbox { to, .. } => *to,
            Op::IntConverter { to, .. } => *to,
            _ => Representation::Tagged,
        }
    }

    /// Representation input `index` must arrive in. Phi inputs follow the
    /// phi's own representation and are resolved by the graph.
    pub fn required_input_representation(&self, index: usize) -> Representation {
        match self {
            Op::BinaryInt32Op { .. } => Representation::UnboxedInt32,
            Op::BinaryMintOp { .. } | Op::UnaryMintOp(_) => Representation::UnboxedInt64,
            Op::BinaryDoubleOp(_)
            | Op::UnaryDoubleOp(_)
            | Op::MathUnary(_)
            | Op::InvokeMathCFunction(_)
            | Op::MergedMath(_) => Representation::UnboxedDouble,
            Op::ExtractNthOutput { rep, .. } => {
                if *rep == Representation::UnboxedDouble {
                    Representation::PairOfUnboxedDouble
                } else {
                    Representation::PairOfTagged
                }
            }
            Op::EqualityCompare { operands, .. } | Op::RelationalOp { operands, .. } => {
                operands.operand_representation()
            }
            Op::StoreInstanceField { unboxed: true, .. } if index == 1 => {
                Representation::UnboxedDouble
            }
            Op::LoadIndexed { class_id, .. } | Op::StoreIndexed { class_id, .. }
                if index == 0 && class_id.is_external_typed_data() =>
            {
                Representation::Untagged
            }
            Op::StoreIndexed { class_id, .. } if index == 2 => class_id
                .element_kind()
                .map_or(Representation::Tagged, ElementKind::store_representation),
            Op::SimdConstruct(kind) | Op::SimdSplat(kind) => kind.lane_representation(),
            Op::SimdGetLane { kind, .. } | Op::SimdBinary { kind, .. } => kind.representation(),
            Op::Box(from) => *from,
            Op::IntConverter { from, .. } => *from,
            Op::IntToDouble(from) => *from,
            _ => Representation::Tagged,
        }
    }

    /// Whether the instruction can fail a speculation and resume in
    /// unoptimized code. Only these keep an environment in optimized code.
    pub fn can_deoptimize(&self) -> bool {
        match self {
            Op::InstanceCall(_) | Op::PolymorphicInstanceCall(_) | Op::StaticCall(_) => true,
            Op::CheckClass(_) | Op::CheckSmi | Op::CheckArrayBound => true,
            Op::BinarySmiOp { op, can_overflow }
            | Op::BinaryInt32Op { op, can_overflow }
            | Op::BinaryMintOp { op, can_overflow } => {
                *can_overflow || matches!(op, BinaryOp::TruncDiv | BinaryOp::Mod | BinaryOp::Shr)
            }
            Op::UnarySmiOp(UnaryOp::Negate) | Op::UnaryMintOp(UnaryOp::Negate) => true,
            Op::TruncDivMod => true,
            Op::ShiftLeftMaskSmi { check_count, .. } => *check_count,
            Op::TestCids { default, .. } => default.is_none(),
            Op::Unbox { speculative, .. } => *speculative,
            Op::IntConverter { to, truncating, .. } => {
                !*truncating && *to != Representation::UnboxedInt64
            }
            _ => false,
        }
    }

    /// Class of the result when it follows from the operation alone.
    pub fn result_cid(&self) -> Option<ClassId> {
        match self {
            Op::Constant(c) | Op::UnboxedConstant { value: c, .. } => Some(c.cid()),
            Op::BinarySmiOp { .. } | Op::ShiftLeftMaskSmi { .. } | Op::UnarySmiOp(_) => {
                Some(ClassId::SMI)
            }
            Op::BinaryDoubleOp(_)
            | Op::UnaryDoubleOp(_)
            | Op::MathUnary(_)
            | Op::InvokeMathCFunction(_)
            | Op::IntToDouble(_)
            | Op::SmiToDouble => Some(ClassId::DOUBLE),
            Op::EqualityCompare { .. }
            | Op::RelationalOp { .. }
            | Op::StrictCompare { .. }
            | Op::BooleanNegate
            | Op::TestCids { .. } => Some(ClassId::BOOL),
            Op::LoadField(slot) => slot.cid,
            Op::LoadIndexed { class_id, .. } => class_id.element_kind().and_then(ElementKind::load_cid),
            Op::LoadCodeUnits { can_be_mint, .. } => (!can_be_mint).then_some(ClassId::SMI),
            Op::OneByteStringFromCharCode => Some(ClassId::ONE_BYTE_STRING),
            Op::StringToCharCode => Some(ClassId::SMI),
            Op::AllocateContext { .. } | Op::AllocateUninitializedContext { .. } => {
                Some(ClassId::CONTEXT)
            }
            Op::SimdConstruct(kind)
            | Op::SimdZero(kind)
            | Op::SimdSplat(kind)
            | Op::SimdBinary { kind, .. } => Some(kind.cid()),
            Op::SimdGetLane { kind, .. } => match kind {
                SimdKind::Int32x4 => None,
                _ => Some(ClassId::DOUBLE),
            },
            Op::Box(rep) => ClassId::for_representation(*rep),
            Op::Unbox { to, .. } => ClassId::for_representation(*to),
            Op::ExtractNthOutput { cid, .. } => (*cid != ClassId::ILLEGAL).then_some(*cid),
            _ => None,
        }
    }

    /// Pure, value-producing operations that may be dropped once unused.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Op::Constant(_)
                | Op::UnboxedConstant { .. }
                | Op::ShiftLeftMaskSmi { check_count: false, .. }
                | Op::ExtractNthOutput { .. }
                | Op::BinaryDoubleOp(_)
                | Op::UnaryDoubleOp(_)
                | Op::MathUnary(_)
                | Op::StrictCompare { .. }
                | Op::BooleanNegate
                | Op::LoadField(_)
                | Op::LoadUntagged { .. }
                | Op::StringToCharCode
                | Op::Box(_)
                | Op::IntToDouble(_)
                | Op::SmiToDouble
                | Op::SimdZero(_)
                | Op::SimdSplat(_)
                | Op::SimdGetLane { .. }
        ) || (matches!(
            self,
            Op::BinarySmiOp { .. }
                | Op::BinaryInt32Op { .. }
                | Op::BinaryMintOp { .. }
                | Op::UnarySmiOp(_)
                | Op::Unbox { .. }
                | Op::IntConverter { .. }
        ) && !self.can_deoptimize())
    }
}

/// How an instance call's selector maps to an operator family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorKind {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Equality,
    Relational(CompareKind),
    IndexGet,
    IndexSet,
    Getter(String),
    Setter(String),
    InstanceOf,
    TypeCast,
    Method(String),
}

impl SelectorKind {
    /// Classify `selector`; `arg_count` includes the receiver.
    pub fn classify(selector: &str, arg_count: u32) -> SelectorKind {
        if let Some(field) = selector.strip_prefix("get:") {
            return SelectorKind::Getter(field.to_string());
        }
        if let Some(field) = selector.strip_prefix("set:") {
            return SelectorKind::Setter(field.to_string());
        }
        let binary = |op| {
            if arg_count == 2 {
                SelectorKind::Binary(op)
            } else {
                SelectorKind::Method(selector.to_string())
            }
        };
        match selector {
            "-" if arg_count == 1 => SelectorKind::Unary(UnaryOp::Negate),
            "unary-" => SelectorKind::Unary(UnaryOp::Negate),
            "~" => SelectorKind::Unary(UnaryOp::BitNot),
            "+" => binary(BinaryOp::Add),
            "-" => binary(BinaryOp::Sub),
            "*" => binary(BinaryOp::Mul),
            "/" => binary(BinaryOp::Div),
            "~/" => binary(BinaryOp::TruncDiv),
            "%" => binary(BinaryOp::Mod),
            "&" => binary(BinaryOp::BitAnd),
            "|" => binary(BinaryOp::BitOr),
            "^" => binary(BinaryOp::BitXor),
            "<<" => binary(BinaryOp::Shl),
            ">>" => binary(BinaryOp::Shr),
            "==" => SelectorKind::Equality,
            "<" => SelectorKind::Relational(CompareKind::Lt),
            ">" => SelectorKind::Relational(CompareKind::Gt),
            "<=" => SelectorKind::Relational(CompareKind::Le),
            ">=" => SelectorKind::Relational(CompareKind::Ge),
            "[]" => SelectorKind::IndexGet,
            "[]=" => SelectorKind::IndexSet,
            "_instanceOf" => SelectorKind::InstanceOf,
            "_as" => SelectorKind::TypeCast,
            _ => SelectorKind::Method(selector.to_string()),
        }
    }

    /// Number of arguments inline caches test for this selector.
    pub fn num_args_tested(&self) -> u32 {
        match self {
            SelectorKind::Binary(_) | SelectorKind::Equality | SelectorKind::Relational(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_classification() {
        assert_eq!(
            SelectorKind::classify("+", 2),
            SelectorKind::Binary(BinaryOp::Add)
        );
        assert_eq!(
            SelectorKind::classify("-", 1),
            SelectorKind::Unary(UnaryOp::Negate)
        );
        assert_eq!(
            SelectorKind::classify("get:length", 1),
            SelectorKind::Getter("length".into())
        );
        assert_eq!(SelectorKind::classify("[]=", 3), SelectorKind::IndexSet);
        assert_eq!(
            SelectorKind::classify("foo", 1),
            SelectorKind::Method("foo".into())
        );
        assert_eq!(SelectorKind::classify("==", 2).num_args_tested(), 2);
    }

    /// Overflow-free Smi arithmetic does not need an environment, but
    /// division still deoptimizes on a zero divisor.
    #[test]
    fn smi_op_deopt_capability() {
        let add = Op::BinarySmiOp {
            op: BinaryOp::Add,
            can_overflow: false,
        };
        assert!(!add.can_deoptimize());
        let div = Op::BinarySmiOp {
            op: BinaryOp::TruncDiv,
            can_overflow: false,
        };
        assert!(div.can_deoptimize());
        assert!(Op::CheckSmi.can_deoptimize());
        assert!(!Op::Box(Representation::UnboxedDouble).can_deoptimize());
    }

    #[test]
    fn input_representations() {
        let store = Op::StoreIndexed {
            class_id: ClassId::TYPED_DATA_FLOAT64,
            index_scale: 8,
        };
        assert_eq!(store.required_input_representation(0), Representation::Tagged);
        assert_eq!(store.required_input_representation(1), Representation::Tagged);
        assert_eq!(
            store.required_input_representation(2),
            Representation::UnboxedDouble
        );
        let ext = Op::LoadIndexed {
            class_id: ClassId::EXTERNAL_TYPED_DATA_UINT8,
            index_scale: 1,
        };
        assert_eq!(ext.required_input_representation(0), Representation::Untagged);
        let extract = Op::ExtractNthOutput {
            index: 1,
            rep: Representation::UnboxedDouble,
            cid: ClassId::DOUBLE,
        };
        assert_eq!(
            extract.required_input_representation(0),
            Representation::PairOfUnboxedDouble
        );
    }

    #[test]
    fn void_instructions_have_no_representation() {
        assert!(!Op::CheckSmi.has_result());
        assert_eq!(Op::CheckSmi.default_representation(), Representation::None);
        assert_eq!(
            Op::TruncDivMod.default_representation(),
            Representation::PairOfTagged
        );
    }
}
