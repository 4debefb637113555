//! Call-site lowering for 32-bit ARM.
//!
//! Describes every call that survives optimization as a [`CallSiteInfo`] and
//! expands it into the short abstract instruction sequence the code emitter
//! produces for it. Stubs, inline-cache data and native entry points are
//! reached through the object pool, addressed relative to `pp`.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::ir::{DeoptId, FlowGraph, InstId, Op, TargetKind};

/// Pointers to heap objects carry this tag in their low bits.
pub const HEAP_OBJECT_TAG: i64 = 1;

/// Words before the first pool entry.
const POOL_HEADER_WORDS: i64 = 2;

/// Word index of the normal entry point inside a code object.
const CODE_ENTRY_POINT_WORD: i64 = 1;

// ---------------------------------------------------------------------------
// Registers and instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Reg {
    R(u8),
    /// Holds the code object of the callee.
    CodeReg,
    /// Object pool pointer.
    Pp,
    Sp,
    Lr,
}

impl Reg {
    pub const R2: Reg = Reg::R(2);
    pub const R9: Reg = Reg::R(9);
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::R(n) => write!(f, "r{n}"),
            Reg::CodeReg => f.write_str("r6"),
            Reg::Pp => f.write_str("r5"),
            Reg::Sp => f.write_str("sp"),
            Reg::Lr => f.write_str("lr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArmInstr {
    /// `add dst, src, #imm`
    AddImm { dst: Reg, src: Reg, imm: i64 },
    /// `ldr dst, [base, #offset]`
    Ldr { dst: Reg, base: Reg, offset: i64 },
    /// Branch with link and exchange.
    Blx(Reg),
    /// Branch and exchange; no return address is written.
    Bx(Reg),
}

impl fmt::Display for ArmInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmInstr::AddImm { dst, src, imm } => write!(f, "add {dst}, {src}, #{imm}"),
            ArmInstr::Ldr { dst, base, offset } => write!(f, "ldr {dst}, [{base}, #{offset}]"),
            ArmInstr::Blx(reg) => write!(f, "blx {reg}"),
            ArmInstr::Bx(reg) => write!(f, "bx {reg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Object pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stub {
    OneArgCheckInlineCache,
    TwoArgsCheckInlineCache,
    CallStaticFunction,
    CallNativeCFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PoolEntry {
    Stub(Stub),
    /// Feedback of the call at this deopt id.
    IcData(DeoptId),
    /// Entry point of the named runtime function.
    NativeEntry(String),
}

/// Deduplicating table of pool entries. Offsets are untagged byte offsets
/// from the start of the pool object.
#[derive(Debug, Clone)]
pub struct ObjectPool {
    word_size: u32,
    entries: Vec<PoolEntry>,
    index: HashMap<PoolEntry, usize>,
}

impl ObjectPool {
    pub fn new(word_size: u32) -> Self {
        Self {
            word_size,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn word_size(&self) -> u32 {
        self.word_size
    }

    /// Offset of `entry`, adding it on first request.
    pub fn offset_of(&mut self, entry: PoolEntry) -> i64 {
        let index = match self.index.get(&entry) {
            Some(&i) => i,
            None => {
                let i = self.entries.len();
                self.entries.push(entry.clone());
                self.index.insert(entry, i);
                i
            }
        };
        (POOL_HEADER_WORDS + index as i64) * i64::from(self.word_size)
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Call sites
// ---------------------------------------------------------------------------

/// How a call reaches its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallKind {
    /// The target code is already in a register.
    RegisterIndirect,
    /// Through the native call stub, with the runtime entry in r9.
    Native {
        native_entry_pool_offset: i64,
        stub_pool_offset: i64,
    },
    /// Through a patchable stub, with its inline-cache data in r9.
    Patchable {
        target_stub_pool_offset: i64,
        ic_pool_offset: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteInfo {
    pub inst: InstId,
    pub deopt_id: Option<DeoptId>,
    pub kind: CallKind,
    /// Arguments passed on the stack, receiver included.
    pub stack_parameter_count: u32,
    pub word_size: u32,
    /// The call's result is returned directly by the next instruction.
    pub is_tailcall: bool,
}

/// Describe every call left in `graph`, allocating its pool entries.
pub fn collect_call_sites(graph: &FlowGraph, pool: &mut ObjectPool) -> Vec<CallSiteInfo> {
    let mut sites = Vec::new();
    for block in graph.reverse_postorder() {
        for &inst in &graph.block(block).insts {
            let Some(kind) = call_kind(graph, inst, pool) else {
                continue;
            };
            let info = CallSiteInfo {
                inst,
                deopt_id: graph.deopt_id(inst),
                kind,
                stack_parameter_count: graph.inputs(inst).len() as u32,
                word_size: pool.word_size(),
                is_tailcall: is_tailcall(graph, inst),
            };
            trace!(?inst, kind = ?info.kind, tail = info.is_tailcall, "call site");
            sites.push(info);
        }
    }
    debug!(calls = sites.len(), pool = pool.len(), "collected call sites");
    sites
}

fn call_kind(graph: &FlowGraph, inst: InstId, pool: &mut ObjectPool) -> Option<CallKind> {
    let patchable = |pool: &mut ObjectPool, stub: Stub| {
        let deopt_id = graph.deopt_id(inst)?;
        Some(CallKind::Patchable {
            target_stub_pool_offset: pool.offset_of(PoolEntry::Stub(stub)),
            ic_pool_offset: pool.offset_of(PoolEntry::IcData(deopt_id)),
        })
    };
    match graph.op(inst) {
        Op::InstanceCall(call) => {
            let stub = match call.ic_data.as_ref().map(|ic| ic.num_args_tested) {
                Some(2) => Stub::TwoArgsCheckInlineCache,
                _ => Stub::OneArgCheckInlineCache,
            };
            patchable(pool, stub)
        }
        Op::StaticCall(call) if call.target.kind == TargetKind::Native => Some(CallKind::Native {
            native_entry_pool_offset: pool
                .offset_of(PoolEntry::NativeEntry(call.target.name.clone())),
            stub_pool_offset: pool.offset_of(PoolEntry::Stub(Stub::CallNativeCFunction)),
        }),
        Op::StaticCall(_) => patchable(pool, Stub::CallStaticFunction),
        // Dispatch has already loaded the selected target's code.
        Op::PolymorphicInstanceCall(_) => Some(CallKind::RegisterIndirect),
        _ => None,
    }
}

/// The call is followed by a return of its own result, which nothing else
/// reads.
fn is_tailcall(graph: &FlowGraph, inst: InstId) -> bool {
    let (Some(block), Some(pos), Some(result)) =
        (graph.block_of(inst), graph.position(inst), graph.result(inst))
    else {
        return false;
    };
    let Some(&next) = graph.block(block).insts.get(pos + 1) else {
        return false;
    };
    matches!(graph.op(next), Op::Return)
        && graph.inputs(next) == [result]
        && graph.uses(result).len() == 1
}

fn load_from_pool(dst: Reg, offset: i64) -> ArmInstr {
    ArmInstr::Ldr {
        dst,
        base: Reg::Pp,
        offset: offset - HEAP_OBJECT_TAG,
    }
}

/// The instructions that perform the call described by `info`. `call_reg`
/// holds the target for register-indirect calls and is ignored otherwise.
pub fn call_sequence(info: &CallSiteInfo, call_reg: Reg) -> Vec<ArmInstr> {
    let word = i64::from(info.word_size);
    match &info.kind {
        CallKind::RegisterIndirect if info.is_tailcall => vec![ArmInstr::Bx(call_reg)],
        CallKind::RegisterIndirect => vec![ArmInstr::Blx(call_reg)],
        CallKind::Native {
            native_entry_pool_offset,
            stub_pool_offset,
        } => vec![
            ArmInstr::AddImm {
                dst: Reg::R2,
                src: Reg::Sp,
                imm: i64::from(info.stack_parameter_count) * word,
            },
            load_from_pool(Reg::R9, *native_entry_pool_offset),
            load_from_pool(Reg::CodeReg, *stub_pool_offset),
            ArmInstr::Ldr {
                dst: Reg::Lr,
                base: Reg::CodeReg,
                offset: CODE_ENTRY_POINT_WORD * word - HEAP_OBJECT_TAG,
            },
            ArmInstr::Blx(Reg::Lr),
        ],
        CallKind::Patchable {
            target_stub_pool_offset,
            ic_pool_offset,
        } => vec![
            load_from_pool(Reg::Lr, *target_stub_pool_offset),
            load_from_pool(Reg::R9, *ic_pool_offset),
            ArmInstr::Blx(Reg::Lr),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::{FlowGraphBuilder, IcData, Target};

    fn asm(seq: &[ArmInstr]) -> Vec<String> {
        seq.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn pool_deduplicates_entries() {
        let mut pool = ObjectPool::new(4);
        let a = pool.offset_of(PoolEntry::Stub(Stub::CallStaticFunction));
        let b = pool.offset_of(PoolEntry::NativeEntry("print".into()));
        let again = pool.offset_of(PoolEntry::Stub(Stub::CallStaticFunction));
        assert_eq!(a, 8);
        assert_eq!(b, 12);
        assert_eq!(again, a);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn instance_call_is_patchable() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        let sum = b.instance_call("+", &[x, y], Some(IcData::new(2)));
        let one = b.smi(1);
        let next = b.instance_call("+", &[sum, one], Some(IcData::new(2)));
        b.ret(next);
        let g = b.build();

        let mut pool = ObjectPool::new(4);
        let sites = collect_call_sites(&g, &mut pool);
        assert_eq!(sites.len(), 2);
        assert!(!sites[0].is_tailcall);
        assert!(sites[1].is_tailcall);
        // Both calls share the stub; each has its own feedback.
        assert_eq!(pool.len(), 3);
        assert_eq!(
            asm(&call_sequence(&sites[0], Reg::R(0))),
            vec!["ldr lr, [r5, #7]", "ldr r9, [r5, #11]", "blx lr"]
        );
        assert_eq!(
            asm(&call_sequence(&sites[1], Reg::R(0))),
            vec!["ldr lr, [r5, #7]", "ldr r9, [r5, #15]", "blx lr"]
        );
    }

    #[test]
    fn native_call_passes_argument_area() {
        let mut b = FlowGraphBuilder::new("f", 2);
        let (x, y) = (b.param(0), b.param(1));
        b.static_call(Target::native("Object_hashCode"), &[x, y]);
        let zero = b.smi(0);
        b.ret(zero);
        let g = b.build();

        let mut pool = ObjectPool::new(4);
        let sites = collect_call_sites(&g, &mut pool);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].stack_parameter_count, 2);
        assert!(!sites[0].is_tailcall);
        assert_eq!(
            asm(&call_sequence(&sites[0], Reg::R(0))),
            vec![
                "add r2, sp, #8",
                "ldr r9, [r5, #7]",
                "ldr r6, [r5, #11]",
                "ldr lr, [r6, #3]",
                "blx lr",
            ]
        );
    }

    #[test]
    fn register_indirect_tail_call_uses_bx() {
        let info = CallSiteInfo {
            inst: InstId::new(0),
            deopt_id: None,
            kind: CallKind::RegisterIndirect,
            stack_parameter_count: 1,
            word_size: 4,
            is_tailcall: true,
        };
        assert_eq!(asm(&call_sequence(&info, Reg::R(3))), vec!["bx r3"]);
        let info = CallSiteInfo {
            is_tailcall: false,
            ..info
        };
        assert_eq!(asm(&call_sequence(&info, Reg::R(3))), vec!["blx r3"]);
    }

    #[test]
    fn graphs_without_calls_have_no_sites() {
        let mut b = FlowGraphBuilder::new("f", 1);
        let x = b.param(0);
        b.ret(x);
        let mut pool = ObjectPool::new(4);
        assert!(collect_call_sites(&b.build(), &mut pool).is_empty());
        assert!(pool.is_empty());
    }
}
