use serde::{Deserialize, Serialize};

use super::class_id::{ClassId, ElementKind};
use super::value::Representation;

/// SIMD value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimdKind {
    Float32x4,
    Int32x4,
    Float64x2,
}

impl SimdKind {
    pub fn lanes(self) -> u8 {
        match self {
            SimdKind::Float32x4 | SimdKind::Int32x4 => 4,
            SimdKind::Float64x2 => 2,
        }
    }

    pub fn cid(self) -> ClassId {
        match self {
            SimdKind::Float32x4 => ClassId::FLOAT32X4,
            SimdKind::Int32x4 => ClassId::INT32X4,
            SimdKind::Float64x2 => ClassId::FLOAT64X2,
        }
    }

    pub fn representation(self) -> Representation {
        match self {
            SimdKind::Float32x4 => Representation::UnboxedFloat32x4,
            SimdKind::Int32x4 => Representation::UnboxedInt32x4,
            SimdKind::Float64x2 => Representation::UnboxedFloat64x2,
        }
    }

    /// Representation of a single lane.
    pub fn lane_representation(self) -> Representation {
        match self {
            SimdKind::Float32x4 | SimdKind::Float64x2 => Representation::UnboxedDouble,
            SimdKind::Int32x4 => Representation::UnboxedInt32,
        }
    }

    pub fn from_cid(cid: ClassId) -> Option<SimdKind> {
        match cid {
            ClassId::FLOAT32X4 => Some(SimdKind::Float32x4),
            ClassId::INT32X4 => Some(SimdKind::Int32x4),
            ClassId::FLOAT64X2 => Some(SimdKind::Float64x2),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            SimdKind::Float32x4 => "Float32x4",
            SimdKind::Int32x4 => "Int32x4",
            SimdKind::Float64x2 => "Float64x2",
        }
    }

    fn supports(self, op: SimdOp) -> bool {
        match self {
            SimdKind::Float32x4 | SimdKind::Float64x2 => {
                matches!(op, SimdOp::Add | SimdOp::Sub | SimdOp::Mul | SimdOp::Div)
            }
            SimdKind::Int32x4 => matches!(
                op,
                SimdOp::Add | SimdOp::Sub | SimdOp::And | SimdOp::Or | SimdOp::Xor
            ),
        }
    }
}

/// Lane-wise SIMD binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimdOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
}

impl SimdOp {
    pub fn from_operator(op: &str) -> Option<SimdOp> {
        Some(match op {
            "+" => SimdOp::Add,
            "-" => SimdOp::Sub,
            "*" => SimdOp::Mul,
            "/" => SimdOp::Div,
            "&" => SimdOp::And,
            "|" => SimdOp::Or,
            "^" => SimdOp::Xor,
            _ => return None,
        })
    }
}

/// Scalar math functions the inliner knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathKind {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Pow,
    Atan2,
}

impl MathKind {
    pub fn arity(self) -> usize {
        match self {
            MathKind::Pow | MathKind::Atan2 => 2,
            _ => 1,
        }
    }
}

/// The closed catalog of methods the optimizer can replace with inline
/// instruction sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecognizedKind {
    ObjectArrayGetIndexed,
    ImmutableArrayGetIndexed,
    GrowableArrayGetIndexed,
    TypedDataGetIndexed,
    ObjectArraySetIndexed,
    GrowableArraySetIndexed,
    TypedDataSetIndexed,
    /// `_TypedList._getXxx(byteOffset)`.
    ByteArrayBaseGet(ElementKind),
    /// `_TypedList._setXxx(byteOffset, value)`.
    ByteArrayBaseSet(ElementKind),
    StringBaseCodeUnitAt,
    StringBaseCharAt,
    StringBaseLength,
    ObjectArrayLength,
    ImmutableArrayLength,
    GrowableArrayLength,
    TypedDataLength,
    DoubleAdd,
    DoubleSub,
    DoubleMul,
    DoubleDiv,
    Math(MathKind),
    SimdConstructor(SimdKind),
    SimdZero(SimdKind),
    SimdSplat(SimdKind),
    SimdGetLane(SimdKind, u8),
    SimdBinary(SimdKind, SimdOp),
}

const BYTE_VIEW_ELEMENTS: &[(&str, ElementKind)] = &[
    ("Int8", ElementKind::Int8),
    ("Uint8", ElementKind::Uint8),
    ("Int16", ElementKind::Int16),
    ("Uint16", ElementKind::Uint16),
    ("Int32", ElementKind::Int32),
    ("Uint32", ElementKind::Uint32),
    ("Int64", ElementKind::Int64),
    ("Float32", ElementKind::Float32),
    ("Float64", ElementKind::Float64),
    ("Float32x4", ElementKind::Float32x4),
    ("Int32x4", ElementKind::Int32x4),
    ("Float64x2", ElementKind::Float64x2),
];

const LANE_NAMES: &[&str] = &["x", "y", "z", "w"];

impl RecognizedKind {
    /// Look up a recognized method by its qualified name
    /// (e.g. `"_GrowableList.[]"`, `"Math.sqrt"`, `"Float32x4.+"`).
    pub fn lookup(name: &str) -> Option<RecognizedKind> {
        let kind = match name {
            "_List.[]" => RecognizedKind::ObjectArrayGetIndexed,
            "_ImmutableList.[]" => RecognizedKind::ImmutableArrayGetIndexed,
            "_GrowableList.[]" => RecognizedKind::GrowableArrayGetIndexed,
            "_TypedList.[]" => RecognizedKind::TypedDataGetIndexed,
            "_List.[]=" => RecognizedKind::ObjectArraySetIndexed,
            "_GrowableList.[]=" => RecognizedKind::GrowableArraySetIndexed,
            "_TypedList.[]=" => RecognizedKind::TypedDataSetIndexed,
            "_StringBase.codeUnitAt" => RecognizedKind::StringBaseCodeUnitAt,
            "_StringBase.[]" => RecognizedKind::StringBaseCharAt,
            "_StringBase.length" => RecognizedKind::StringBaseLength,
            "_List.length" => RecognizedKind::ObjectArrayLength,
            "_ImmutableList.length" => RecognizedKind::ImmutableArrayLength,
            "_GrowableList.length" => RecognizedKind::GrowableArrayLength,
            "_TypedList.length" => RecognizedKind::TypedDataLength,
            "_Double.+" => RecognizedKind::DoubleAdd,
            "_Double.-" => RecognizedKind::DoubleSub,
            "_Double.*" => RecognizedKind::DoubleMul,
            "_Double./" => RecognizedKind::DoubleDiv,
            "Math.sqrt" => RecognizedKind::Math(MathKind::Sqrt),
            "Math.sin" => RecognizedKind::Math(MathKind::Sin),
            "Math.cos" => RecognizedKind::Math(MathKind::Cos),
            "Math.tan" => RecognizedKind::Math(MathKind::Tan),
            "Math.pow" => RecognizedKind::Math(MathKind::Pow),
            "Math.atan2" => RecognizedKind::Math(MathKind::Atan2),
            _ => return Self::lookup_byte_view(name).or_else(|| Self::lookup_simd(name)),
        };
        Some(kind)
    }

    fn lookup_byte_view(name: &str) -> Option<RecognizedKind> {
        let method = name.strip_prefix("_TypedList._")?;
        let (is_get, element) = if let Some(rest) = method.strip_prefix("get") {
            (true, rest)
        } else {
            (false, method.strip_prefix("set")?)
        };
        let (_, kind) = BYTE_VIEW_ELEMENTS.iter().find(|(n, _)| *n == element)?;
        Some(if is_get {
            RecognizedKind::ByteArrayBaseGet(*kind)
        } else {
            RecognizedKind::ByteArrayBaseSet(*kind)
        })
    }

    fn lookup_simd(name: &str) -> Option<RecognizedKind> {
        let (class, method) = name.split_once('.')?;
        let simd = [SimdKind::Float32x4, SimdKind::Int32x4, SimdKind::Float64x2]
            .into_iter()
            .find(|k| k.prefix() == class)?;
        match method {
            "" => return Some(RecognizedKind::SimdConstructor(simd)),
            "zero" => return Some(RecognizedKind::SimdZero(simd)),
            "splat" => return Some(RecognizedKind::SimdSplat(simd)),
            _ => {}
        }
        if let Some(lane) = LANE_NAMES
            .iter()
            .take(simd.lanes() as usize)
            .position(|l| *l == method)
        {
            return Some(RecognizedKind::SimdGetLane(simd, lane as u8));
        }
        let op = SimdOp::from_operator(method)?;
        simd.supports(op).then_some(RecognizedKind::SimdBinary(simd, op))
    }

    /// Recognized method implementing `selector` on receivers of class `cid`,
    /// for call sites whose feedback carries no resolved target.
    pub fn for_receiver(cid: ClassId, selector: &str) -> Option<RecognizedKind> {
        let kind = match selector {
            "[]" if cid == ClassId::ARRAY => RecognizedKind::ObjectArrayGetIndexed,
            "[]" if cid == ClassId::IMMUTABLE_ARRAY => RecognizedKind::ImmutableArrayGetIndexed,
            "[]" if cid == ClassId::GROWABLE_ARRAY => RecognizedKind::GrowableArrayGetIndexed,
            "[]" if cid.is_typed_data() || cid.is_external_typed_data() => {
                RecognizedKind::TypedDataGetIndexed
            }
            "[]" if cid.is_one_byte_string() => RecognizedKind::StringBaseCharAt,
            "[]=" if cid == ClassId::ARRAY => RecognizedKind::ObjectArraySetIndexed,
            "[]=" if cid == ClassId::GROWABLE_ARRAY => RecognizedKind::GrowableArraySetIndexed,
            "[]=" if cid.is_typed_data() || cid.is_external_typed_data() => {
                RecognizedKind::TypedDataSetIndexed
            }
            "codeUnitAt" if cid.is_string() => RecognizedKind::StringBaseCodeUnitAt,
            "get:length" if cid.is_string() => RecognizedKind::StringBaseLength,
            "get:length" if cid == ClassId::ARRAY => RecognizedKind::ObjectArrayLength,
            "get:length" if cid == ClassId::IMMUTABLE_ARRAY => RecognizedKind::ImmutableArrayLength,
            "get:length" if cid == ClassId::GROWABLE_ARRAY => RecognizedKind::GrowableArrayLength,
            "get:length" if cid.is_typed_data() => RecognizedKind::TypedDataLength,
            _ => {
                let simd = SimdKind::from_cid(cid)?;
                let method = selector.strip_prefix("get:").unwrap_or(selector);
                return Self::lookup_simd(&format!("{}.{}", simd.prefix(), method))
                    .filter(|k| {
                        matches!(
                            k,
                            RecognizedKind::SimdGetLane(..) | RecognizedKind::SimdBinary(..)
                        )
                    });
            }
        };
        Some(kind)
    }

    /// True for indexed loads/stores whose inline form needs an index bounds
    /// check against the receiver.
    pub fn is_indexed_access(self) -> bool {
        matches!(
            self,
            RecognizedKind::ObjectArrayGetIndexed
                | RecognizedKind::ImmutableArrayGetIndexed
                | RecognizedKind::GrowableArrayGetIndexed
                | RecognizedKind::TypedDataGetIndexed
                | RecognizedKind::ObjectArraySetIndexed
                | RecognizedKind::GrowableArraySetIndexed
                | RecognizedKind::TypedDataSetIndexed
        )
    }

    /// Methods called without a receiver.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            RecognizedKind::Math(_)
                | RecognizedKind::SimdConstructor(_)
                | RecognizedKind::SimdZero(_)
                | RecognizedKind::SimdSplat(_)
        )
    }
}
