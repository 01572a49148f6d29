use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Position of this id in its owning arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Handle to a module-level global (CPU state variable, stack pointer, ...).
    GlobalId
);
define_id!(
    /// Handle to a function, defined or declared.
    FunctionId
);
define_id!(
    /// Handle to a basic block.
    BlockId
);
define_id!(
    /// Handle to an instruction.
    InstId
);

/// Anything that can appear as an operand.
///
/// Constants compare by value; every other variant compares by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
    Global(GlobalId),
    Argument { function: FunctionId, index: u32 },
    Inst(InstId),
    Const(i64),
}

impl ValueRef {
    pub fn as_inst(self) -> Option<InstId> {
        match self {
            ValueRef::Inst(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_global(self) -> Option<GlobalId> {
        match self {
            ValueRef::Global(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_const(self) -> Option<i64> {
        match self {
            ValueRef::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_const(self) -> bool {
        matches!(self, ValueRef::Const(_))
    }
}

impl From<InstId> for ValueRef {
    fn from(id: InstId) -> Self {
        ValueRef::Inst(id)
    }
}

impl From<GlobalId> for ValueRef {
    fn from(id: GlobalId) -> Self {
        ValueRef::Global(id)
    }
}

/// Result type of an instruction, argument or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ty {
    #[default]
    Void,
    Int(u32),
    Ptr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastOp {
    IntToPtr,
    PtrToInt,
    ZExt,
    SExt,
    Trunc,
    BitCast,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::IntToPtr => "inttoptr",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
            CastOp::BitCast => "bitcast",
        }
    }
}

/// Operation performed by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstKind {
    Load { ptr: ValueRef },
    Store { value: ValueRef, ptr: ValueRef },
    Binary { bin: BinOp, lhs: ValueRef, rhs: ValueRef },
    Cmp { pred: CmpPred, lhs: ValueRef, rhs: ValueRef },
    Cast { cast: CastOp, value: ValueRef },
    Phi { incoming: Vec<(ValueRef, BlockId)> },
    Select { cond: ValueRef, on_true: ValueRef, on_false: ValueRef },
    Call { callee: String, args: Vec<ValueRef> },
    Br { target: BlockId },
    CondBr { cond: ValueRef, then_block: BlockId, else_block: BlockId },
    Ret { value: Option<ValueRef> },
    Unreachable,
}

impl InstKind {
    /// Operands in slot order. Stores list the stored value first, then the address.
    pub fn operands(&self) -> Vec<ValueRef> {
        match self {
            InstKind::Load { ptr } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Cast { value, .. } => vec![*value],
            InstKind::Phi { incoming } => incoming.iter().map(|(v, _)| *v).collect(),
            InstKind::Select { cond, on_true, on_false } => vec![*cond, *on_true, *on_false],
            InstKind::Call { args, .. } => args.clone(),
            InstKind::CondBr { cond, .. } => vec![*cond],
            InstKind::Ret { value } => value.iter().copied().collect(),
            InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// Blocks this instruction refers to (branch targets, phi predecessors).
    pub fn referenced_blocks(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr { then_block, else_block, .. } => vec![*then_block, *else_block],
            InstKind::Phi { incoming } => incoming.iter().map(|(_, b)| *b).collect(),
            _ => Vec::new(),
        }
    }
}

/// Metadata operand attached to a function entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdNode {
    String(String),
    Value(ValueRef),
    Const(i64),
    Tuple(Vec<MdNode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    #[serde(default = "pointer_ty")]
    pub ty: Ty,
}

fn pointer_ty() -> Ty {
    Ty::Ptr
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default)]
    pub name: Option<String>,
    pub ty: Ty,
}

/// A loop as recognised by the host's loop analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    pub name: String,
    /// `None` when the CFG was not simplified into a single-header form.
    #[serde(default)]
    pub header: Option<BlockId>,
    pub blocks: Vec<BlockId>,
}

impl LoopInfo {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub ret: Ty,
    #[serde(default)]
    pub blocks: Vec<BlockId>,
    /// Entry record written by the lifter: name, address, clobbers, then arguments.
    #[serde(default)]
    pub entry_metadata: Option<Vec<MdNode>>,
    #[serde(default)]
    pub loops: Vec<LoopInfo>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(default)]
    pub name: Option<String>,
    pub function: FunctionId,
    #[serde(default)]
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ty: Ty,
    pub block: BlockId,
    pub function: FunctionId,
    #[serde(flatten)]
    pub kind: InstKind,
}

impl Instruction {
    pub fn is_store(&self) -> bool {
        matches!(self.kind, InstKind::Store { .. })
    }

    /// Address operand of a store, if this is one.
    pub fn store_address(&self) -> Option<ValueRef> {
        match self.kind {
            InstKind::Store { ptr, .. } => Some(ptr),
            _ => None,
        }
    }

    pub fn is_cmp(&self) -> bool {
        matches!(self.kind, InstKind::Cmp { .. })
    }

    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            InstKind::Call { callee, .. } => Some(callee.as_str()),
            _ => None,
        }
    }
}

/// One use-edge: `user` reads the value at operand position `operand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstId,
    pub operand: usize,
}
