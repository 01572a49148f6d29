//! Programmatic construction of modules, mostly for tests and fixtures.

use super::module::Module;
use super::types::{
    Argument, BinOp, Block, BlockId, CastOp, CmpPred, Function, FunctionId, Global, GlobalId,
    InstId, InstKind, Instruction, LoopInfo, MdNode, Ty, ValueRef,
};

#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { module: Module::new(name) }
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.module.arch = Some(arch.into());
        self
    }

    /// Add a pointer-typed global and return it as an operand.
    pub fn global(&mut self, name: &str) -> ValueRef {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global { id, name: name.to_string(), ty: Ty::Ptr });
        ValueRef::Global(id)
    }

    /// Add a bodiless function such as `newpc`.
    pub fn declare(&mut self, name: &str, ret: Ty) -> FunctionId {
        let id = FunctionId(self.module.functions.len() as u32);
        self.module.functions.push(Function {
            id,
            name: name.to_string(),
            args: Vec::new(),
            ret,
            blocks: Vec::new(),
            entry_metadata: None,
            loops: Vec::new(),
        });
        id
    }

    /// Start a new function. The returned builder borrows the module until dropped.
    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        let id = self.declare(name, Ty::Void);
        FunctionBuilder { module: &mut self.module, function: id, current: None }
    }

    pub fn build(mut self) -> Module {
        self.module.reindex();
        self.module
    }
}

#[derive(Debug)]
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    function: FunctionId,
    current: Option<BlockId>,
}

impl FunctionBuilder<'_> {
    pub fn id(&self) -> FunctionId {
        self.function
    }

    pub fn arg(&mut self, name: &str) -> ValueRef {
        let f = &mut self.module.functions[self.function.index()];
        let index = f.args.len() as u32;
        f.args.push(Argument { name: Some(name.to_string()), ty: Ty::Int(64) });
        ValueRef::Argument { function: self.function, index }
    }

    pub fn returns(&mut self, ty: Ty) -> &mut Self {
        self.module.functions[self.function.index()].ret = ty;
        self
    }

    /// Attach a lifter entry record. The first three operands are bookkeeping
    /// (name, address, clobbers); `arguments` follow as a tuple.
    pub fn entry_metadata(&mut self, arguments: Vec<ValueRef>) -> &mut Self {
        let name = self.module.functions[self.function.index()].name.clone();
        let md = vec![
            MdNode::String(name),
            MdNode::Const(0),
            MdNode::Tuple(Vec::new()),
            MdNode::Tuple(arguments.into_iter().map(MdNode::Value).collect()),
        ];
        self.module.functions[self.function.index()].entry_metadata = Some(md);
        self
    }

    pub fn raw_entry_metadata(&mut self, md: Vec<MdNode>) -> &mut Self {
        self.module.functions[self.function.index()].entry_metadata = Some(md);
        self
    }

    pub fn block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.module.blocks.len() as u32);
        self.module.blocks.push(Block {
            id,
            name: Some(name.to_string()),
            function: self.function,
            insts: Vec::new(),
        });
        self.module.functions[self.function.index()].blocks.push(id);
        id
    }

    pub fn switch_to(&mut self, block: BlockId) -> &mut Self {
        self.current = Some(block);
        self
    }

    pub fn add_loop(&mut self, name: &str, header: Option<BlockId>, blocks: Vec<BlockId>) -> &mut Self {
        self.module.functions[self.function.index()]
            .loops
            .push(LoopInfo { name: name.to_string(), header, blocks });
        self
    }

    fn push(&mut self, name: Option<&str>, ty: Ty, kind: InstKind) -> InstId {
        let block = match self.current {
            Some(b) => b,
            None => self.block("entry"),
        };
        self.current = Some(block);
        let id = InstId(self.module.insts.len() as u32);
        self.module.insts.push(Instruction {
            id,
            name: name.map(str::to_string),
            ty,
            block,
            function: self.function,
            kind,
        });
        self.module.blocks[block.index()].insts.push(id);
        id
    }

    pub fn load(&mut self, name: &str, ptr: ValueRef) -> ValueRef {
        self.push(Some(name), Ty::Int(64), InstKind::Load { ptr }).into()
    }

    pub fn store(&mut self, value: ValueRef, ptr: ValueRef) -> InstId {
        self.push(None, Ty::Void, InstKind::Store { value, ptr })
    }

    pub fn binary(&mut self, name: &str, bin: BinOp, lhs: ValueRef, rhs: ValueRef) -> ValueRef {
        self.push(Some(name), Ty::Int(64), InstKind::Binary { bin, lhs, rhs }).into()
    }

    pub fn add(&mut self, name: &str, lhs: ValueRef, rhs: ValueRef) -> ValueRef {
        self.binary(name, BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, name: &str, lhs: ValueRef, rhs: ValueRef) -> ValueRef {
        self.binary(name, BinOp::Sub, lhs, rhs)
    }

    pub fn cmp(&mut self, name: &str, pred: CmpPred, lhs: ValueRef, rhs: ValueRef) -> ValueRef {
        self.push(Some(name), Ty::Int(1), InstKind::Cmp { pred, lhs, rhs }).into()
    }

    pub fn cast(&mut self, name: &str, cast: CastOp, value: ValueRef) -> ValueRef {
        let ty = match cast {
            CastOp::IntToPtr => Ty::Ptr,
            _ => Ty::Int(64),
        };
        self.push(Some(name), ty, InstKind::Cast { cast, value }).into()
    }

    pub fn int_to_ptr(&mut self, name: &str, value: ValueRef) -> ValueRef {
        self.cast(name, CastOp::IntToPtr, value)
    }

    /// An empty phi; fill it with [`FunctionBuilder::add_incoming`] once the
    /// incoming values exist.
    pub fn phi(&mut self, name: &str) -> ValueRef {
        self.push(Some(name), Ty::Int(64), InstKind::Phi { incoming: Vec::new() }).into()
    }

    pub fn add_incoming(&mut self, phi: ValueRef, value: ValueRef, from: BlockId) -> &mut Self {
        if let Some(id) = phi.as_inst() {
            if let InstKind::Phi { incoming } = &mut self.module.insts[id.index()].kind {
                incoming.push((value, from));
            }
        }
        self
    }

    pub fn select(&mut self, name: &str, cond: ValueRef, on_true: ValueRef, on_false: ValueRef) -> ValueRef {
        self.push(Some(name), Ty::Int(64), InstKind::Select { cond, on_true, on_false }).into()
    }

    /// A call producing a 64-bit result.
    pub fn call(&mut self, name: &str, callee: &str, args: Vec<ValueRef>) -> ValueRef {
        self.push(Some(name), Ty::Int(64), InstKind::Call { callee: callee.to_string(), args })
            .into()
    }

    pub fn call_void(&mut self, callee: &str, args: Vec<ValueRef>) -> InstId {
        self.push(None, Ty::Void, InstKind::Call { callee: callee.to_string(), args })
    }

    pub fn br(&mut self, target: BlockId) -> InstId {
        self.push(None, Ty::Void, InstKind::Br { target })
    }

    pub fn cond_br(&mut self, cond: ValueRef, then_block: BlockId, else_block: BlockId) -> InstId {
        self.push(None, Ty::Void, InstKind::CondBr { cond, then_block, else_block })
    }

    pub fn ret(&mut self, value: Option<ValueRef>) -> InstId {
        self.push(None, Ty::Void, InstKind::Ret { value })
    }

    pub fn unreachable(&mut self) -> InstId {
        self.push(None, Ty::Void, InstKind::Unreachable)
    }
}
