//! LLVM-flavoured textual rendering of values and instructions.

use std::fmt;

use super::module::Module;
use super::types::{BlockId, InstId, InstKind, Ty, ValueRef};

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => f.write_str("void"),
            Ty::Int(bits) => write!(f, "i{bits}"),
            Ty::Ptr => f.write_str("ptr"),
        }
    }
}

/// Renders one instruction, e.g. `store i64 %x, ptr %p`.
pub struct InstDisplay<'m> {
    module: &'m Module,
    inst: InstId,
}

/// Renders an operand reference, e.g. `@rdi` or `%arg0`.
pub struct ValueDisplay<'m> {
    module: &'m Module,
    value: ValueRef,
}

impl Module {
    pub fn display_inst(&self, inst: InstId) -> InstDisplay<'_> {
        InstDisplay { module: self, inst }
    }

    pub fn display_value(&self, value: ValueRef) -> ValueDisplay<'_> {
        ValueDisplay { module: self, value }
    }

    /// Full text of a value: the defining instruction for instructions, the
    /// label otherwise.
    pub fn value_text(&self, value: ValueRef) -> String {
        match value {
            ValueRef::Inst(id) => self.display_inst(id).to_string(),
            other => self.display_value(other).to_string(),
        }
    }

    fn block_label(&self, block: BlockId) -> String {
        match &self.block(block).name {
            Some(name) => format!("%{name}"),
            None => format!("%bb{}", block.0),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            ValueRef::Global(id) => write!(f, "@{}", self.module.global(id).name),
            ValueRef::Argument { index, .. } => match self.module.value_name(self.value) {
                Some(name) => write!(f, "%{name}"),
                None => write!(f, "%arg{index}"),
            },
            ValueRef::Inst(id) => match &self.module.inst(id).name {
                Some(name) => write!(f, "%{name}"),
                None => write!(f, "%{}", id.0),
            },
            ValueRef::Const(c) => write!(f, "{c}"),
        }
    }
}

impl InstDisplay<'_> {
    fn typed(&self, value: ValueRef) -> String {
        format!("{} {}", self.module.value_ty(value), self.module.display_value(value))
    }
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.module;
        let inst = m.inst(self.inst);
        if inst.ty != Ty::Void {
            write!(f, "{} = ", m.display_value(ValueRef::Inst(self.inst)))?;
        }
        match &inst.kind {
            InstKind::Load { ptr } => write!(f, "load {}, {}", inst.ty, self.typed(*ptr)),
            InstKind::Store { value, ptr } => {
                write!(f, "store {}, {}", self.typed(*value), self.typed(*ptr))
            }
            InstKind::Binary { bin, lhs, rhs } => write!(
                f,
                "{} {}, {}",
                bin.mnemonic(),
                self.typed(*lhs),
                m.display_value(*rhs)
            ),
            InstKind::Cmp { pred, lhs, rhs } => write!(
                f,
                "icmp {} {}, {}",
                pred.mnemonic(),
                self.typed(*lhs),
                m.display_value(*rhs)
            ),
            InstKind::Cast { cast, value } => {
                write!(f, "{} {} to {}", cast.mnemonic(), self.typed(*value), inst.ty)
            }
            InstKind::Phi { incoming } => {
                write!(f, "phi {}", inst.ty)?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}[ {}, {} ]", m.display_value(*value), m.block_label(*block))?;
                }
                Ok(())
            }
            InstKind::Select { cond, on_true, on_false } => write!(
                f,
                "select {}, {}, {}",
                self.typed(*cond),
                self.typed(*on_true),
                self.typed(*on_false)
            ),
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.typed(*a)).collect();
                write!(f, "call {} @{}({})", inst.ty, callee, args.join(", "))
            }
            InstKind::Br { target } => write!(f, "br label {}", m.block_label(*target)),
            InstKind::CondBr { cond, then_block, else_block } => write!(
                f,
                "br {}, label {}, label {}",
                self.typed(*cond),
                m.block_label(*then_block),
                m.block_label(*else_block)
            ),
            InstKind::Ret { value: Some(v) } => write!(f, "ret {}", self.typed(*v)),
            InstKind::Ret { value: None } => f.write_str("ret void"),
            InstKind::Unreachable => f.write_str("unreachable"),
        }
    }
}
