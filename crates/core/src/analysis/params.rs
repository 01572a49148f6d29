//! Function parameter extraction.
//!
//! Register parameters come from the lifter's entry metadata. Stack
//! parameters are recovered by walking forward from every use of the stack
//! pointer global to the first integer-to-pointer conversion.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::ir::{
    collect_md_values, BinOp, CastOp, FunctionId, GlobalId, InstId, InstKind, Module, ValueRef,
};

/// A value materialised as a pointer into the virtual stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackParameter {
    pub value: ValueRef,
    /// 1-based discovery order.
    pub index: u32,
    /// Constant displacement from the stack pointer along the def-use path.
    pub offset: i64,
}

impl StackParameter {
    pub fn name(&self) -> String {
        format!("sp{}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub function: FunctionId,
    pub name: String,
    pub isolated: bool,
    /// Deduplicated, in metadata order.
    pub register_params: Vec<ValueRef>,
    pub stack_params: Vec<StackParameter>,
    pub stack_pointer: Option<GlobalId>,
}

impl FunctionDescriptor {
    fn not_isolated(function: FunctionId, name: &str) -> Self {
        Self {
            function,
            name: name.to_string(),
            isolated: false,
            register_params: Vec::new(),
            stack_params: Vec::new(),
            stack_pointer: None,
        }
    }

    /// Position of a register parameter in the descriptor.
    pub fn register_position(&self, value: ValueRef) -> Option<usize> {
        self.register_params.iter().position(|v| *v == value)
    }
}

pub struct ParameterExtractor<'a> {
    module: &'a Module,
    config: &'a AnalysisConfig,
    stack_pointer: Option<GlobalId>,
}

impl<'a> ParameterExtractor<'a> {
    pub fn new(module: &'a Module, config: &'a AnalysisConfig) -> Self {
        let stack_pointer = module
            .globals()
            .find(|g| config.is_stack_pointer(&g.name))
            .map(|g| g.id);
        if stack_pointer.is_none() {
            warn!(module = %module.name, "no stack pointer global; stack parameters disabled");
        }
        Self { module, config, stack_pointer }
    }

    pub fn stack_pointer(&self) -> Option<GlobalId> {
        self.stack_pointer
    }

    pub fn extract(&self, function: FunctionId) -> FunctionDescriptor {
        let f = self.module.function(function);
        let md = match &f.entry_metadata {
            Some(md) if !f.is_declaration() && f.name.starts_with(&self.config.isolated_prefix) => md,
            _ => {
                debug!(function = %f.name, "not an isolated function");
                return FunctionDescriptor::not_isolated(function, &f.name);
            }
        };

        let mut candidates = Vec::new();
        for node in md.iter().skip(self.config.entry_metadata_skip) {
            collect_md_values(node, &mut candidates);
        }
        let mut seen = HashSet::new();
        let register_params: Vec<ValueRef> = candidates
            .into_iter()
            .filter(|v| !v.is_const())
            .filter(|v| {
                let name = self.module.value_name(*v).unwrap_or("");
                !self.config.is_denied(name)
            })
            .filter(|v| seen.insert(*v))
            .collect();

        let stack_params = match self.stack_pointer {
            Some(sp) => self.scan_virtual_stack(function, sp),
            None => Vec::new(),
        };

        debug!(
            function = %f.name,
            registers = register_params.len(),
            stack = stack_params.len(),
            "extracted parameters"
        );
        FunctionDescriptor {
            function,
            name: f.name.clone(),
            isolated: true,
            register_params,
            stack_params,
            stack_pointer: self.stack_pointer,
        }
    }

    fn scan_virtual_stack(&self, function: FunctionId, sp: GlobalId) -> Vec<StackParameter> {
        let mut found: Vec<StackParameter> = Vec::new();
        for user in self.module.users(ValueRef::Global(sp)) {
            if self.module.inst(user).function != function {
                continue;
            }
            let Some((value, offset)) = self.find_stack_pointer_cast(user, function) else {
                continue;
            };
            if found.iter().any(|p| p.value == value) {
                continue;
            }
            let index = found.len() as u32 + 1;
            found.push(StackParameter { value, index, offset });
        }
        found
    }

    /// Breadth-first walk from a stack pointer use to the nearest
    /// integer-to-pointer cast, accumulating constant displacements.
    fn find_stack_pointer_cast(
        &self,
        start: InstId,
        function: FunctionId,
    ) -> Option<(ValueRef, i64)> {
        let mut queue = VecDeque::from([(start, 0i64)]);
        let mut visited = HashSet::from([start]);
        while let Some((current, offset)) = queue.pop_front() {
            let inst = self.module.inst(current);
            if matches!(inst.kind, InstKind::Cast { cast: CastOp::IntToPtr, .. }) {
                return Some((ValueRef::Inst(current), offset));
            }
            let here = ValueRef::Inst(current);
            for user in self.module.users(here) {
                if self.module.inst(user).function != function || !visited.insert(user) {
                    continue;
                }
                let next = offset + displacement(&self.module.inst(user).kind, here);
                queue.push_back((user, next));
            }
        }
        None
    }
}

/// Constant added to `base` by `kind`, zero for anything but `add`/`sub`
/// with a constant operand.
fn displacement(kind: &InstKind, base: ValueRef) -> i64 {
    match kind {
        InstKind::Binary { bin: BinOp::Add, lhs, rhs } => match (*lhs, *rhs) {
            (l, ValueRef::Const(c)) if l == base => c,
            (ValueRef::Const(c), r) if r == base => c,
            _ => 0,
        },
        InstKind::Binary { bin: BinOp::Sub, lhs, rhs: ValueRef::Const(c) } if *lhs == base => -c,
        _ => 0,
    }
}
