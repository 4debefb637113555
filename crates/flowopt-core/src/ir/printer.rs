use std::fmt::{self, Write};

use crate::entity::EntityRef;

use super::block::{BlockId, BlockKind};
use super::graph::FlowGraph;
use super::inst::{InstId, Op};
use super::value::{Constant, Representation, ValueId};

struct V(ValueId);

impl fmt::Display for V {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0.index())
    }
}

struct B(BlockId);

impl fmt::Display for B {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0.index())
    }
}

fn fmt_constant(c: &Constant) -> String {
    match c {
        Constant::Null => "null".into(),
        Constant::Bool(b) => b.to_string(),
        Constant::Smi(v) | Constant::Mint(v) => v.to_string(),
        Constant::Double(v) => format!("{v:?}"),
        Constant::String(s) => format!("{s:?}"),
    }
}

/// Operation name with its non-value attributes.
fn fmt_op(operation: &Op) -> String {
    match operation {
        Op::Parameter(i) => format!("Parameter({i})"),
        Op::Constant(c) => format!("Constant({})", fmt_constant(c)),
        Op::UnboxedConstant { value, rep } => {
            format!("UnboxedConstant:{}({})", rep.short_name(), fmt_constant(value))
        }
        Op::Goto(b) => format!("Goto {}", B(*b)),
        Op::Branch {
            then_block,
            else_block,
        } => format!("Branch {} / {}", B(*then_block), B(*else_block)),
        Op::InstanceCall(call) => {
            let ic = call
                .ic_data
                .as_ref()
                .map(|ic| format!(" ic[{}]", ic.number_of_checks()))
                .unwrap_or_default();
            format!("InstanceCall:{}{ic}", call.selector)
        }
        Op::PolymorphicInstanceCall(call) => {
            let targets: Vec<String> = call
                .targets
                .iter()
                .map(|t| format!("{:?}->{}", t.cid, t.target.name))
                .collect();
            let fallback = if call.has_fallback { " +fallback" } else { "" };
            format!(
                "PolymorphicInstanceCall:{} [{}]{fallback}",
                call.selector,
                targets.join(", ")
            )
        }
        Op::StaticCall(call) => format!("StaticCall:{}", call.target.name),
        Op::CheckClass(cids) => {
            let cids: Vec<String> = cids.iter().map(|c| format!("{c:?}")).collect();
            format!("CheckClass[{}]", cids.join(", "))
        }
        Op::BinarySmiOp { op, can_overflow }
        | Op::BinaryInt32Op { op, can_overflow }
        | Op::BinaryMintOp { op, can_overflow } => {
            let ovf = if *can_overflow { "" } else { " nooverflow" };
            format!("{}:{}{ovf}", operation.name(), op.symbol())
        }
        Op::ShiftLeftMaskSmi { mask, check_count } => {
            let checked = if *check_count { ", checked count" } else { "" };
            format!("ShiftLeftMaskSmi(mask {mask}{checked})")
        }
        Op::ExtractNthOutput { index, .. } => format!("ExtractNthOutput({index})"),
        Op::BinaryDoubleOp(op) => format!("BinaryDoubleOp:{}", op.symbol()),
        Op::EqualityCompare { kind, operands } | Op::RelationalOp { kind, operands } => {
            format!("{}:{}({operands:?})", operation.name(), kind.symbol())
        }
        Op::StrictCompare { negate } => {
            format!("StrictCompare:{}", if *negate { "!==" } else { "===" })
        }
        Op::LoadField(slot) => format!("LoadField({})", slot.name),
        Op::StoreInstanceField { slot, unboxed } => {
            let kind = if *unboxed { ":unboxed" } else { "" };
            format!("StoreInstanceField{kind}({})", slot.name)
        }
        Op::LoadIndexed { class_id, .. } => format!("LoadIndexed({class_id:?})"),
        Op::StoreIndexed { class_id, .. } => format!("StoreIndexed({class_id:?})"),
        Op::LoadCodeUnits {
            class_id,
            element_count,
            ..
        } => format!("LoadCodeUnits({class_id:?} x{element_count})"),
        Op::Box(rep) => format!("Box:{}", rep.short_name()),
        Op::Unbox { to, speculative } => {
            let mode = if *speculative { " speculative" } else { "" };
            format!("Unbox:{}{mode}", to.short_name())
        }
        Op::IntConverter { from, to, .. } => {
            format!("IntConverter:{}->{}", from.short_name(), to.short_name())
        }
        other => format!("{other:?}"),
    }
}

impl FlowGraph {
    /// Render one instruction on a single line.
    pub fn format_inst(&self, inst: InstId) -> String {
        let instr = self.inst(inst);
        let mut line = String::new();
        if let Some(v) = instr.result {
            let rep = self.rep(v);
            if rep == Representation::Tagged {
                let _ = write!(line, "{} <- ", V(v));
            } else {
                let _ = write!(line, "{}:{} <- ", V(v), rep.short_name());
            }
        }
        line.push_str(&fmt_op(&instr.op));
        if !instr.inputs.is_empty() {
            let inputs: Vec<String> = instr.inputs.iter().map(|v| V(*v).to_string()).collect();
            let _ = write!(line, "({})", inputs.join(", "));
        }
        if let Some(d) = instr.deopt_id {
            let _ = write!(line, " deopt={}", d.0);
        }
        if let Some(env) = &instr.env {
            let slots: Vec<String> = env.slots().iter().map(|v| V(*v).to_string()).collect();
            let _ = write!(line, " env=[{}]", slots.join(", "));
        }
        line
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        for block in self.reverse_postorder() {
            let b = self.block(block);
            let kind = match b.kind {
                BlockKind::Entry => "entry",
                BlockKind::Join => "join",
                BlockKind::Target => "target",
            };
            write!(f, "{} ({kind})", B(block))?;
            if !b.preds.is_empty() {
                let preds: Vec<String> = b.preds.iter().map(|p| B(*p).to_string()).collect();
                write!(f, " preds [{}]", preds.join(", "))?;
            }
            writeln!(f, ":")?;
            for &inst in b.phis.iter().chain(b.insts.iter()) {
                writeln!(f, "  {}", self.format_inst(inst))?;
            }
        }
        writeln!(f, "}}")
    }
}
