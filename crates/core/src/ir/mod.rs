//! Lifted SSA IR as seen by the analyses.
//!
//! A [`Module`] owns arenas of globals, functions, blocks and instructions,
//! addressed through copyable ids. Operands are [`ValueRef`]s; use lists are
//! derived and kept in layout order so every traversal is deterministic.
//! Modules are loaded from JSON or assembled with [`ModuleBuilder`].

mod builder;
mod display;
mod module;
mod types;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use display::{InstDisplay, ValueDisplay};
pub use module::{collect_md_values, Module};
pub use types::{
    Argument, BinOp, Block, BlockId, CastOp, CmpPred, Function, FunctionId, Global, GlobalId,
    InstId, InstKind, Instruction, LoopInfo, MdNode, Ty, Use, ValueRef,
};
