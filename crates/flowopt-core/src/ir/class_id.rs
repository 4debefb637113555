use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Representation;

/// Runtime class identifier, as recorded by inline caches.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl ClassId {
    pub const ILLEGAL: ClassId = ClassId(0);
    pub const NULL: ClassId = ClassId(1);
    pub const BOOL: ClassId = ClassId(2);
    pub const SMI: ClassId = ClassId(3);
    pub const MINT: ClassId = ClassId(4);
    pub const DOUBLE: ClassId = ClassId(5);
    pub const FLOAT32X4: ClassId = ClassId(6);
    pub const INT32X4: ClassId = ClassId(7);
    pub const FLOAT64X2: ClassId = ClassId(8);

    pub const ONE_BYTE_STRING: ClassId = ClassId(10);
    pub const TWO_BYTE_STRING: ClassId = ClassId(11);
    pub const EXTERNAL_ONE_BYTE_STRING: ClassId = ClassId(12);
    pub const EXTERNAL_TWO_BYTE_STRING: ClassId = ClassId(13);

    pub const ARRAY: ClassId = ClassId(20);
    pub const IMMUTABLE_ARRAY: ClassId = ClassId(21);
    pub const GROWABLE_ARRAY: ClassId = ClassId(22);

    pub const TYPED_DATA_INT8: ClassId = ClassId(30);
    pub const TYPED_DATA_UINT8: ClassId = ClassId(31);
    pub const TYPED_DATA_UINT8_CLAMPED: ClassId = ClassId(32);
    pub const TYPED_DATA_INT16: ClassId = ClassId(33);
    pub const TYPED_DATA_UINT16: ClassId = ClassId(34);
    pub const TYPED_DATA_INT32: ClassId = ClassId(35);
    pub const TYPED_DATA_UINT32: ClassId = ClassId(36);
    pub const TYPED_DATA_INT64: ClassId = ClassId(37);
    pub const TYPED_DATA_FLOAT32: ClassId = ClassId(38);
    pub const TYPED_DATA_FLOAT64: ClassId = ClassId(39);
    pub const TYPED_DATA_FLOAT32X4: ClassId = ClassId(40);
    pub const TYPED_DATA_INT32X4: ClassId = ClassId(41);
    pub const TYPED_DATA_FLOAT64X2: ClassId = ClassId(42);

    pub const EXTERNAL_TYPED_DATA_UINT8: ClassId = ClassId(50);
    pub const EXTERNAL_TYPED_DATA_UINT8_CLAMPED: ClassId = ClassId(51);

    pub const CONTEXT: ClassId = ClassId(60);
    pub const CLOSURE: ClassId = ClassId(61);

    /// First id available to user-defined classes.
    pub const FIRST_USER: ClassId = ClassId(100);

    pub fn is_integer(self) -> bool {
        self == ClassId::SMI || self == ClassId::MINT
    }

    pub fn is_simd(self) -> bool {
        matches!(
            self,
            ClassId::FLOAT32X4 | ClassId::INT32X4 | ClassId::FLOAT64X2
        )
    }

    pub fn is_string(self) -> bool {
        (ClassId::ONE_BYTE_STRING.0..=ClassId::EXTERNAL_TWO_BYTE_STRING.0).contains(&self.0)
    }

    pub fn is_one_byte_string(self) -> bool {
        self == ClassId::ONE_BYTE_STRING || self == ClassId::EXTERNAL_ONE_BYTE_STRING
    }

    pub fn is_external_string(self) -> bool {
        self == ClassId::EXTERNAL_ONE_BYTE_STRING || self == ClassId::EXTERNAL_TWO_BYTE_STRING
    }

    pub fn is_typed_data(self) -> bool {
        (ClassId::TYPED_DATA_INT8.0..=ClassId::TYPED_DATA_FLOAT64X2.0).contains(&self.0)
    }

    pub fn is_external_typed_data(self) -> bool {
        self == ClassId::EXTERNAL_TYPED_DATA_UINT8
            || self == ClassId::EXTERNAL_TYPED_DATA_UINT8_CLAMPED
    }

    /// Element layout for indexed access on this class, if it supports any.
    pub fn element_kind(self) -> Option<ElementKind> {
        let kind = match self {
            ClassId::ARRAY | ClassId::IMMUTABLE_ARRAY | ClassId::GROWABLE_ARRAY => {
                ElementKind::Object
            }
            ClassId::TYPED_DATA_INT8 => ElementKind::Int8,
            ClassId::TYPED_DATA_UINT8 | ClassId::EXTERNAL_TYPED_DATA_UINT8 => ElementKind::Uint8,
            ClassId::TYPED_DATA_UINT8_CLAMPED | ClassId::EXTERNAL_TYPED_DATA_UINT8_CLAMPED => {
                ElementKind::Uint8Clamped
            }
            ClassId::TYPED_DATA_INT16 => ElementKind::Int16,
            ClassId::TYPED_DATA_UINT16 => ElementKind::Uint16,
            ClassId::TYPED_DATA_INT32 => ElementKind::Int32,
            ClassId::TYPED_DATA_UINT32 => ElementKind::Uint32,
            ClassId::TYPED_DATA_INT64 => ElementKind::Int64,
            ClassId::TYPED_DATA_FLOAT32 => ElementKind::Float32,
            ClassId::TYPED_DATA_FLOAT64 => ElementKind::Float64,
            ClassId::TYPED_DATA_FLOAT32X4 => ElementKind::Float32x4,
            ClassId::TYPED_DATA_INT32X4 => ElementKind::Int32x4,
            ClassId::TYPED_DATA_FLOAT64X2 => ElementKind::Float64x2,
            ClassId::ONE_BYTE_STRING | ClassId::EXTERNAL_ONE_BYTE_STRING => ElementKind::Uint8,
            ClassId::TWO_BYTE_STRING | ClassId::EXTERNAL_TWO_BYTE_STRING => ElementKind::Uint16,
            _ => return None,
        };
        Some(kind)
    }

    /// The class id a value unboxed into `rep` must have.
    pub fn for_representation(rep: Representation) -> Option<ClassId> {
        match rep {
            Representation::UnboxedDouble => Some(ClassId::DOUBLE),
            Representation::UnboxedFloat32x4 => Some(ClassId::FLOAT32X4),
            Representation::UnboxedInt32x4 => Some(ClassId::INT32X4),
            Representation::UnboxedFloat64x2 => Some(ClassId::FLOAT64X2),
            _ => None,
        }
    }

    /// Unboxed representation that values of this class are kept in when a
    /// phi merges only values of this class.
    pub fn unboxed_representation(self) -> Option<Representation> {
        match self {
            ClassId::DOUBLE => Some(Representation::UnboxedDouble),
            ClassId::MINT => Some(Representation::UnboxedInt64),
            ClassId::FLOAT32X4 => Some(Representation::UnboxedFloat32x4),
            ClassId::INT32X4 => Some(Representation::UnboxedInt32x4),
            ClassId::FLOAT64X2 => Some(Representation::UnboxedFloat64x2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassId::ILLEGAL => "Illegal",
            ClassId::NULL => "Null",
            ClassId::BOOL => "Bool",
            ClassId::SMI => "Smi",
            ClassId::MINT => "Mint",
            ClassId::DOUBLE => "Double",
            ClassId::FLOAT32X4 => "Float32x4",
            ClassId::INT32X4 => "Int32x4",
            ClassId::FLOAT64X2 => "Float64x2",
            ClassId::ONE_BYTE_STRING => "OneByteString",
            ClassId::TWO_BYTE_STRING => "TwoByteString",
            ClassId::EXTERNAL_ONE_BYTE_STRING => "ExternalOneByteString",
            ClassId::EXTERNAL_TWO_BYTE_STRING => "ExternalTwoByteString",
            ClassId::ARRAY => "Array",
            ClassId::IMMUTABLE_ARRAY => "ImmutableArray",
            ClassId::GROWABLE_ARRAY => "GrowableObjectArray",
            ClassId::TYPED_DATA_INT8 => "Int8List",
            ClassId::TYPED_DATA_UINT8 => "Uint8List",
            ClassId::TYPED_DATA_UINT8_CLAMPED => "Uint8ClampedList",
            ClassId::TYPED_DATA_INT16 => "Int16List",
            ClassId::TYPED_DATA_UINT16 => "Uint16List",
            ClassId::TYPED_DATA_INT32 => "Int32List",
            ClassId::TYPED_DATA_UINT32 => "Uint32List",
            ClassId::TYPED_DATA_INT64 => "Int64List",
            ClassId::TYPED_DATA_FLOAT32 => "Float32List",
            ClassId::TYPED_DATA_FLOAT64 => "Float64List",
            ClassId::TYPED_DATA_FLOAT32X4 => "Float32x4List",
            ClassId::TYPED_DATA_INT32X4 => "Int32x4List",
            ClassId::TYPED_DATA_FLOAT64X2 => "Float64x2List",
            ClassId::EXTERNAL_TYPED_DATA_UINT8 => "ExternalUint8Array",
            ClassId::EXTERNAL_TYPED_DATA_UINT8_CLAMPED => "ExternalUint8ClampedArray",
            ClassId::CONTEXT => "Context",
            ClassId::CLOSURE => "Closure",
            _ => "Instance",
        }
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < ClassId::FIRST_USER.0 {
            write!(f, "{}", self.name())
        } else {
            write!(f, "cid{}", self.0)
        }
    }
}

/// Element layout of an indexable class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Object,
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Float32,
    Float64,
    Float32x4,
    Int32x4,
    Float64x2,
}

impl ElementKind {
    /// The internal typed-data class storing elements of this kind.
    pub fn typed_data_class(self) -> Option<ClassId> {
        let cid = match self {
            ElementKind::Object => return None,
            ElementKind::Int8 => ClassId::TYPED_DATA_INT8,
            ElementKind::Uint8 => ClassId::TYPED_DATA_UINT8,
            ElementKind::Uint8Clamped => ClassId::TYPED_DATA_UINT8_CLAMPED,
            ElementKind::Int16 => ClassId::TYPED_DATA_INT16,
            ElementKind::Uint16 => ClassId::TYPED_DATA_UINT16,
            ElementKind::Int32 => ClassId::TYPED_DATA_INT32,
            ElementKind::Uint32 => ClassId::TYPED_DATA_UINT32,
            ElementKind::Int64 => ClassId::TYPED_DATA_INT64,
            ElementKind::Float32 => ClassId::TYPED_DATA_FLOAT32,
            ElementKind::Float64 => ClassId::TYPED_DATA_FLOAT64,
            ElementKind::Float32x4 => ClassId::TYPED_DATA_FLOAT32X4,
            ElementKind::Int32x4 => ClassId::TYPED_DATA_INT32X4,
            ElementKind::Float64x2 => ClassId::TYPED_DATA_FLOAT64X2,
        };
        Some(cid)
    }

    pub fn size_in_bytes(self, word_size: u32) -> u32 {
        match self {
            ElementKind::Object => word_size,
            ElementKind::Int8 | ElementKind::Uint8 | ElementKind::Uint8Clamped => 1,
            ElementKind::Int16 | ElementKind::Uint16 => 2,
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Float32 => 4,
            ElementKind::Int64 | ElementKind::Float64 => 8,
            ElementKind::Float32x4 | ElementKind::Int32x4 | ElementKind::Float64x2 => 16,
        }
    }

    /// Representation of a loaded element.
    pub fn load_representation(self) -> Representation {
        match self {
            ElementKind::Object
            | ElementKind::Int8
            | ElementKind::Uint8
            | ElementKind::Uint8Clamped
            | ElementKind::Int16
            | ElementKind::Uint16 => Representation::Tagged,
            ElementKind::Int32 => Representation::UnboxedInt32,
            ElementKind::Uint32 => Representation::UnboxedUint32,
            ElementKind::Int64 => Representation::UnboxedInt64,
            ElementKind::Float32 | ElementKind::Float64 => Representation::UnboxedDouble,
            ElementKind::Float32x4 => Representation::UnboxedFloat32x4,
            ElementKind::Int32x4 => Representation::UnboxedInt32x4,
            ElementKind::Float64x2 => Representation::UnboxedFloat64x2,
        }
    }

    /// Representation a stored element value must be in.
    pub fn store_representation(self) -> Representation {
        match self {
            ElementKind::Int32 => Representation::UnboxedInt32,
            ElementKind::Uint32 => Representation::UnboxedUint32,
            ElementKind::Int64 => Representation::UnboxedInt64,
            other => other.load_representation(),
        }
    }

    /// Class the stored value must be checked against before an inlined store,
    /// if any.
    pub fn store_value_cid(self) -> Option<ClassId> {
        match self {
            ElementKind::Object => None,
            ElementKind::Int8
            | ElementKind::Uint8
            | ElementKind::Uint8Clamped
            | ElementKind::Int16
            | ElementKind::Uint16 => Some(ClassId::SMI),
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Int64 => Some(ClassId::SMI),
            ElementKind::Float32 | ElementKind::Float64 => Some(ClassId::DOUBLE),
            ElementKind::Float32x4 => Some(ClassId::FLOAT32X4),
            ElementKind::Int32x4 => Some(ClassId::INT32X4),
            ElementKind::Float64x2 => Some(ClassId::FLOAT64X2),
        }
    }

    /// Static class of a loaded element, if known.
    pub fn load_cid(self) -> Option<ClassId> {
        match self {
            ElementKind::Object => None,
            ElementKind::Int8
            | ElementKind::Uint8
            | ElementKind::Uint8Clamped
            | ElementKind::Int16
            | ElementKind::Uint16 => Some(ClassId::SMI),
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Int64 => None,
            ElementKind::Float32 | ElementKind::Float64 => Some(ClassId::DOUBLE),
            ElementKind::Float32x4 => Some(ClassId::FLOAT32X4),
            ElementKind::Int32x4 => Some(ClassId::INT32X4),
            ElementKind::Float64x2 => Some(ClassId::FLOAT64X2),
        }
    }
}

/// A sorted, deduplicated set of class ids permitted by a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CidSet(Vec<ClassId>);

impl CidSet {
    pub fn new(cids: impl IntoIterator<Item = ClassId>) -> Self {
        let mut cids: Vec<ClassId> = cids.into_iter().collect();
        cids.sort();
        cids.dedup();
        Self(cids)
    }

    pub fn single(cid: ClassId) -> Self {
        Self(vec![cid])
    }

    pub fn contains(&self, cid: ClassId) -> bool {
        self.0.binary_search(&cid).is_ok()
    }

    pub fn is_subset_of(&self, other: &CidSet) -> bool {
        self.0.iter().all(|&cid| other.contains(cid))
    }

    pub fn is_smi_only(&self) -> bool {
        self.0 == [ClassId::SMI]
    }

    /// The only class in this set, if it has exactly one.
    pub fn single_cid(&self) -> Option<ClassId> {
        match self.0.as_slice() {
            [cid] => Some(*cid),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.0.iter().copied()
    }
}

/// A field slot of a user class, as the implicit getters and setters see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub offset: u32,
    /// Class every value stored so far had, when the runtime tracked one.
    #[serde(default)]
    pub guarded_cid: Option<ClassId>,
    #[serde(default)]
    pub is_final: bool,
}

/// One user class: its superclass and declared fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<ClassId>,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
}

/// Class hierarchy and field layout visible to the optimizer.
///
/// Built-in classes without an entry are treated as direct subclasses of the
/// root object class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassTable {
    #[serde(default)]
    classes: BTreeMap<ClassId, ClassInfo>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cid: ClassId, info: ClassInfo) {
        self.classes.insert(cid, info);
    }

    pub fn get(&self, cid: ClassId) -> Option<&ClassInfo> {
        self.classes.get(&cid)
    }

    /// True if `cid` is `ancestor` or transitively extends it.
    pub fn is_subclass_of(&self, cid: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(cid);
        let mut steps = 0;
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            // Integers are numbers: Smi and Mint share the `int` interface.
            if ancestor == ClassId::MINT && c == ClassId::SMI {
                return true;
            }
            steps += 1;
            if steps > self.classes.len() + 1 {
                return false;
            }
            current = self.classes.get(&c).and_then(|info| info.superclass);
        }
        false
    }

    /// Built-in classes are always known; user classes only with an entry.
    pub fn knows(&self, cid: ClassId) -> bool {
        cid < ClassId::FIRST_USER || self.classes.contains_key(&cid)
    }

    /// [`is_subclass_of`](Self::is_subclass_of) when the answer follows from
    /// the table. `None` if `ancestor` or any class on `cid`'s superclass
    /// chain is a user class without an entry.
    pub fn decide_subclass(&self, cid: ClassId, ancestor: ClassId) -> Option<bool> {
        if !self.knows(ancestor) {
            return None;
        }
        let mut current = Some(cid);
        let mut seen: HashSet<ClassId> = HashSet::new();
        while let Some(c) = current {
            if !self.knows(c) {
                return None;
            }
            if c == ancestor || (ancestor == ClassId::MINT && c == ClassId::SMI) {
                return Some(true);
            }
            if !seen.insert(c) {
                return Some(false);
            }
            current = self.classes.get(&c).and_then(|info| info.superclass);
        }
        Some(false)
    }

    /// Field named `name` on `cid` or one of its superclasses.
    pub fn lookup_field(&self, cid: ClassId, name: &str) -> Option<&FieldInfo> {
        let mut current = Some(cid);
        let mut seen: HashSet<ClassId> = HashSet::new();
        while let Some(c) = current {
            if !seen.insert(c) {
                return None;
            }
            let info = self.classes.get(&c)?;
            if let Some(field) = info.fields.iter().find(|f| f.name == name) {
                return Some(field);
            }
            current = info.superclass;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_set_is_sorted_and_deduplicated() {
        let set = CidSet::new([ClassId::DOUBLE, ClassId::SMI, ClassId::DOUBLE]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ClassId::SMI));
        assert!(CidSet::single(ClassId::SMI).is_subset_of(&set));
        assert!(!set.is_subset_of(&CidSet::single(ClassId::SMI)));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![ClassId::SMI, ClassId::DOUBLE]);
    }

    #[test]
    fn subclass_walks_superclass_chain() {
        let base = ClassId(100);
        let mid = ClassId(101);
        let leaf = ClassId(102);
        let mut table = ClassTable::new();
        table.insert(base, ClassInfo { name: "Base".into(), ..Default::default() });
        table.insert(
            mid,
            ClassInfo { name: "Mid".into(), superclass: Some(base), ..Default::default() },
        );
        table.insert(
            leaf,
            ClassInfo { name: "Leaf".into(), superclass: Some(mid), ..Default::default() },
        );
        assert!(table.is_subclass_of(leaf, base));
        assert!(!table.is_subclass_of(base, leaf));
        assert!(table.is_subclass_of(ClassId::SMI, ClassId::MINT));
    }

    #[test]
    fn missing_user_classes_leave_subclass_undecided() {
        let base = ClassId(100);
        let leaf = ClassId(101);
        let mut table = ClassTable::new();
        assert_eq!(table.decide_subclass(leaf, base), None);
        assert_eq!(table.decide_subclass(ClassId::SMI, base), None);
        assert_eq!(table.decide_subclass(ClassId::SMI, ClassId::MINT), Some(true));
        assert_eq!(table.decide_subclass(ClassId::DOUBLE, ClassId::MINT), Some(false));

        table.insert(base, ClassInfo { name: "Base".into(), ..Default::default() });
        assert_eq!(table.decide_subclass(leaf, base), None);
        table.insert(
            leaf,
            ClassInfo { name: "Leaf".into(), superclass: Some(base), ..Default::default() },
        );
        assert_eq!(table.decide_subclass(leaf, base), Some(true));
        assert_eq!(table.decide_subclass(base, leaf), Some(false));
    }

    #[test]
    fn field_lookup_searches_superclasses() {
        let base = ClassId(100);
        let leaf = ClassId(101);
        let mut table = ClassTable::new();
        table.insert(
            base,
            ClassInfo {
                name: "Base".into(),
                superclass: None,
                fields: vec![FieldInfo {
                    name: "x".into(),
                    offset: 8,
                    guarded_cid: None,
                    is_final: false,
                }],
            },
        );
        table.insert(
            leaf,
            ClassInfo { name: "Leaf".into(), superclass: Some(base), fields: vec![] },
        );
        assert_eq!(table.lookup_field(leaf, "x").map(|f| f.offset), Some(8));
        assert!(table.lookup_field(leaf, "y").is_none());
    }

    #[test]
    fn typed_data_elements() {
        assert_eq!(ClassId::TYPED_DATA_FLOAT64.element_kind(), Some(ElementKind::Float64));
        assert_eq!(
            ElementKind::Float64.load_representation(),
            Representation::UnboxedDouble
        );
        assert_eq!(ElementKind::Int16.size_in_bytes(4), 2);
        assert!(ClassId::DOUBLE.element_kind().is_none());
    }
}
