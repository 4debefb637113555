pub mod block;
pub mod builder;
pub mod cfg;
pub mod class_id;
pub mod env;
pub mod graph;
pub mod ic_data;
pub mod inst;
pub mod printer;
pub mod recognized;
pub mod value;
pub mod verify;

pub use block::{Block, BlockId, BlockKind};
pub use builder::FlowGraphBuilder;
pub use cfg::{detect_loops, loop_blocks, Dominators, NaturalLoop};
pub use class_id::{CidSet, ClassId, ClassInfo, ClassTable, ElementKind, FieldInfo};
pub use env::{Environment, TaggedValue};
pub use graph::FlowGraph;
pub use ic_data::{FeedbackStore, IcData, IcEntry, Target, TargetKind};
pub use inst::{
    BinaryOp, CompareKind, InstId, InstanceCall, Instr, MathUnaryKind, MergedMathKind, NumberKind,
    Op, PolymorphicCall, PolymorphicTarget, SelectorKind, Slot, StaticCall, TypeTest, UnaryOp,
};
pub use recognized::{MathKind, RecognizedKind, SimdKind, SimdOp};
pub use value::{Constant, DeoptId, Definition, Representation, Use, UseSlot, ValueId};
pub use verify::{verify, VerifyLevel};
