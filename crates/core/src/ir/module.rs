use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IrError;

use super::types::{
    Block, BlockId, Function, FunctionId, Global, GlobalId, InstId, InstKind, Instruction, Ty,
    Use, ValueRef,
};

/// A lifted module: globals, functions, blocks and instructions held in arenas.
///
/// Use lists and name lookups are derived data. They are rebuilt by
/// [`Module::reindex`] whenever the arenas change (after loading or building).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default)]
    pub(crate) globals: Vec<Global>,
    #[serde(default)]
    pub(crate) functions: Vec<Function>,
    #[serde(default)]
    pub(crate) blocks: Vec<Block>,
    #[serde(default)]
    pub(crate) insts: Vec<Instruction>,
    #[serde(skip)]
    index: ModuleIndex,
}

#[derive(Debug, Clone, Default)]
struct ModuleIndex {
    uses: HashMap<ValueRef, Vec<Use>>,
    functions_by_name: HashMap<String, FunctionId>,
    globals_by_name: HashMap<String, GlobalId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Load a module from its JSON serialization on disk.
    pub fn load(path: &Path) -> Result<Self, IrError> {
        let text = fs::read_to_string(path)
            .map_err(|source| IrError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, IrError> {
        let mut module: Module = serde_json::from_str(text)?;
        module.validate()?;
        module.reindex();
        debug!(
            module = %module.name,
            functions = module.functions.len(),
            instructions = module.insts.len(),
            "module loaded"
        );
        Ok(module)
    }

    pub fn to_json_string(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.iter()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions.iter().map(|f| f.id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.index.functions_by_name.get(name).copied()
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.index.globals_by_name.get(name).copied()
    }

    /// Every use of `value`, in layout order of the users.
    pub fn uses(&self, value: ValueRef) -> &[Use] {
        self.index.uses.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn users(&self, value: ValueRef) -> impl Iterator<Item = InstId> + '_ {
        self.uses(value).iter().map(|u| u.user)
    }

    /// Instructions of `function` in layout order.
    pub fn function_insts(&self, function: FunctionId) -> impl Iterator<Item = InstId> + '_ {
        self.function(function)
            .blocks
            .iter()
            .flat_map(move |b| self.block(*b).insts.iter().copied())
    }

    /// The instruction following `id` in its block, if any.
    pub fn next_inst(&self, id: InstId) -> Option<InstId> {
        let block = self.block(self.inst(id).block);
        let pos = block.insts.iter().position(|i| *i == id)?;
        block.insts.get(pos + 1).copied()
    }

    /// The instruction preceding `id` in its block, if any.
    pub fn prev_inst(&self, id: InstId) -> Option<InstId> {
        let block = self.block(self.inst(id).block);
        let pos = block.insts.iter().position(|i| *i == id)?;
        pos.checked_sub(1).map(|p| block.insts[p])
    }

    /// Last instruction of `block` when it is a terminator.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.block(block).insts.last()?;
        self.inst(last).kind.is_terminator().then_some(last)
    }

    /// The function a value lives in. Globals and constants belong to none.
    pub fn value_function(&self, value: ValueRef) -> Option<FunctionId> {
        match value {
            ValueRef::Inst(id) => Some(self.inst(id).function),
            ValueRef::Argument { function, .. } => Some(function),
            ValueRef::Global(_) | ValueRef::Const(_) => None,
        }
    }

    /// Source-level name of a value, when it has one.
    pub fn value_name(&self, value: ValueRef) -> Option<&str> {
        match value {
            ValueRef::Global(id) => Some(self.global(id).name.as_str()),
            ValueRef::Argument { function, index } => self
                .function(function)
                .args
                .get(index as usize)
                .and_then(|a| a.name.as_deref()),
            ValueRef::Inst(id) => self.inst(id).name.as_deref(),
            ValueRef::Const(_) => None,
        }
    }

    pub fn value_ty(&self, value: ValueRef) -> Ty {
        match value {
            ValueRef::Global(id) => self.global(id).ty,
            ValueRef::Argument { function, index } => self
                .function(function)
                .args
                .get(index as usize)
                .map(|a| a.ty)
                .unwrap_or(Ty::Int(64)),
            ValueRef::Inst(id) => self.inst(id).ty,
            ValueRef::Const(_) => Ty::Int(64),
        }
    }

    /// Formal arguments of `function` as operand references.
    pub fn arguments(&self, function: FunctionId) -> impl Iterator<Item = ValueRef> {
        let count = self.function(function).args.len() as u32;
        (0..count).map(move |index| ValueRef::Argument { function, index })
    }

    /// Rebuild use lists and name lookups from the arenas.
    pub fn reindex(&mut self) {
        let mut index = ModuleIndex::default();
        for function in &self.functions {
            // First definition wins when names collide.
            index.functions_by_name.entry(function.name.clone()).or_insert(function.id);
            for block in &function.blocks {
                for inst in &self.blocks[block.index()].insts {
                    let operands = self.insts[inst.index()].kind.operands();
                    for (operand, value) in operands.into_iter().enumerate() {
                        if value.is_const() {
                            continue;
                        }
                        index.uses.entry(value).or_default().push(Use { user: *inst, operand });
                    }
                }
            }
        }
        for global in &self.globals {
            index.globals_by_name.entry(global.name.clone()).or_insert(global.id);
        }
        self.index = index;
    }

    /// Check that every cross reference points inside the arenas and that
    /// ownership links agree with each other.
    pub fn validate(&self) -> Result<(), IrError> {
        for (pos, g) in self.globals.iter().enumerate() {
            check_position("global", g.id.0, pos)?;
        }
        for (pos, f) in self.functions.iter().enumerate() {
            check_position("function", f.id.0, pos)?;
            for b in &f.blocks {
                let block = self.blocks.get(b.index()).ok_or(IrError::Dangling { kind: "block", id: b.0 })?;
                if block.function != f.id {
                    return Err(IrError::Inconsistent(format!(
                        "block {} listed in function `{}` but owned by function {}",
                        b.0, f.name, block.function.0
                    )));
                }
            }
            for l in &f.loops {
                for b in l.header.iter().chain(l.blocks.iter()) {
                    self.check_block(*b)?;
                }
            }
            if let Some(md) = &f.entry_metadata {
                let mut values = Vec::new();
                for node in md {
                    collect_md_values(node, &mut values);
                }
                for v in values {
                    self.check_value(v)?;
                }
            }
        }
        let mut listed = vec![0usize; self.insts.len()];
        for (pos, b) in self.blocks.iter().enumerate() {
            check_position("block", b.id.0, pos)?;
            if b.function.index() >= self.functions.len() {
                return Err(IrError::Dangling { kind: "function", id: b.function.0 });
            }
            for i in &b.insts {
                let inst = self.insts.get(i.index()).ok_or(IrError::Dangling { kind: "instruction", id: i.0 })?;
                if inst.block != b.id || inst.function != b.function {
                    return Err(IrError::Inconsistent(format!(
                        "instruction {} listed in block {} but owned by block {}",
                        i.0, b.id.0, inst.block.0
                    )));
                }
                listed[i.index()] += 1;
            }
        }
        for (pos, inst) in self.insts.iter().enumerate() {
            check_position("instruction", inst.id.0, pos)?;
            if listed[pos] != 1 {
                return Err(IrError::Inconsistent(format!(
                    "instruction {} is listed {} times in block {}",
                    inst.id.0, listed[pos], inst.block.0
                )));
            }
            for v in inst.kind.operands() {
                self.check_value(v)?;
            }
            for b in inst.kind.referenced_blocks() {
                self.check_block(b)?;
            }
            if let InstKind::Call { callee, .. } = &inst.kind {
                if callee.is_empty() {
                    return Err(IrError::Inconsistent(format!("call {} has an empty callee", inst.id.0)));
                }
            }
        }
        Ok(())
    }

    fn check_block(&self, id: BlockId) -> Result<(), IrError> {
        if id.index() >= self.blocks.len() {
            return Err(IrError::Dangling { kind: "block", id: id.0 });
        }
        Ok(())
    }

    fn check_value(&self, value: ValueRef) -> Result<(), IrError> {
        match value {
            ValueRef::Global(id) if id.index() >= self.globals.len() => {
                Err(IrError::Dangling { kind: "global", id: id.0 })
            }
            ValueRef::Inst(id) if id.index() >= self.insts.len() => {
                Err(IrError::Dangling { kind: "instruction", id: id.0 })
            }
            ValueRef::Argument { function, index } => {
                let f = self
                    .functions
                    .get(function.index())
                    .ok_or(IrError::Dangling { kind: "function", id: function.0 })?;
                if index as usize >= f.args.len() {
                    return Err(IrError::Dangling { kind: "argument", id: index });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn check_position(kind: &'static str, id: u32, pos: usize) -> Result<(), IrError> {
    if id as usize != pos {
        return Err(IrError::Inconsistent(format!("{kind} at position {pos} carries id {id}")));
    }
    Ok(())
}

/// Flatten every value reference out of a metadata node, depth first.
pub fn collect_md_values(node: &super::types::MdNode, out: &mut Vec<ValueRef>) {
    use super::types::MdNode;
    match node {
        MdNode::Value(v) => out.push(*v),
        MdNode::Tuple(items) => {
            for item in items {
                collect_md_values(item, out);
            }
        }
        MdNode::String(_) | MdNode::Const(_) => {}
    }
}
