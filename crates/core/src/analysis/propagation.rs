//! Backward input propagation.
//!
//! Starting from functions known to deliver external input, walk call sites
//! backwards: a caller that forwards the input through its own return value
//! or one of its parameters becomes an input function itself, and its
//! callers are examined in the next round. The number of rounds is bounded
//! by [`CallGraph::max_path_length`](super::callgraph::CallGraph::max_path_length).

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::ir::{FunctionId, InstId, InstKind, Module, Ty, ValueRef};
use crate::seeds::ResolvedSeed;

use super::callgraph::CallGraph;
use super::context::AnalysisContext;
use super::params::ParameterExtractor;

/// Where a function delivers its input: through its return value or a
/// 1-based argument slot. Serialized as `-1` or the slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ArgPosition {
    Return,
    Argument(u32),
}

impl From<ArgPosition> for i64 {
    fn from(position: ArgPosition) -> Self {
        match position {
            ArgPosition::Return => -1,
            ArgPosition::Argument(n) => i64::from(n),
        }
    }
}

impl TryFrom<i64> for ArgPosition {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ArgPosition::Return),
            n if n >= 1 && n <= i64::from(u32::MAX) => Ok(ArgPosition::Argument(n as u32)),
            n => Err(format!("invalid argument position {n}")),
        }
    }
}

impl fmt::Display for ArgPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

/// How a marked function hands input to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkedFunctionInfo {
    /// Name of the input function as it appears at call sites.
    pub callee: String,
    pub position: ArgPosition,
    /// Register or parameter name carrying the input.
    pub arg_name: String,
}

pub struct BackwardPropagation<'a> {
    module: &'a Module,
    callgraph: &'a CallGraph,
    config: &'a AnalysisConfig,
    extractor: ParameterExtractor<'a>,
    max_steps: usize,
}

impl<'a> BackwardPropagation<'a> {
    pub fn new(
        module: &'a Module,
        callgraph: &'a CallGraph,
        config: &'a AnalysisConfig,
        max_steps: usize,
    ) -> Self {
        let extractor = ParameterExtractor::new(module, config);
        Self { module, callgraph, config, extractor, max_steps }
    }

    /// Propagate from `seeds` and record marks in `ctx`. Returns the number
    /// of rounds run.
    pub fn run(&self, ctx: &mut AnalysisContext, seeds: &[ResolvedSeed]) -> usize {
        let mut pending: BTreeSet<(FunctionId, MarkedFunctionInfo)> = BTreeSet::new();
        for seed in seeds {
            ctx.mark_input_function(seed.function);
            for caller in self.callgraph.callers(seed.function) {
                ctx.mark_reached(caller, seed.info.clone());
                pending.insert((caller, seed.info.clone()));
            }
        }

        let mut processed = HashSet::new();
        let mut rounds = 0;
        while rounds < self.max_steps && !pending.is_empty() {
            rounds += 1;
            let current = std::mem::take(&mut pending);
            debug!(round = rounds, pending = current.len(), "propagation round");
            for (caller, info) in current {
                if !processed.insert((caller, info.clone())) {
                    continue;
                }
                self.visit_call_site(ctx, caller, &info, &mut pending);
            }
        }

        let marked = ctx.marked_functions().count();
        let inputs = ctx.input_functions().count();
        let stats = ctx.stats_mut();
        stats.propagation_rounds = rounds;
        stats.max_call_graph_length = self.max_steps;
        stats.marked_functions = marked;
        stats.input_functions = inputs;
        info!(rounds, bound = self.max_steps, "backward propagation finished");
        rounds
    }

    fn visit_call_site(
        &self,
        ctx: &mut AnalysisContext,
        caller: FunctionId,
        info: &MarkedFunctionInfo,
        pending: &mut BTreeSet<(FunctionId, MarkedFunctionInfo)>,
    ) {
        let caller_name = &self.module.function(caller).name;
        let Some(input) = self.input_value(caller, info) else {
            warn!(caller = %caller_name, callee = %info.callee, "no input value at call site");
            return;
        };
        if self.is_returned(caller, input) {
            let register = self.config.return_register().to_string();
            self.mark_input(ctx, caller, ArgPosition::Return, register, pending);
        } else if let Some((index, name)) = self.reached_param(caller, input) {
            self.mark_input(ctx, caller, ArgPosition::Argument(index), name, pending);
        } else {
            debug!(caller = %caller_name, callee = %info.callee, "input absorbed");
        }
    }

    fn mark_input(
        &self,
        ctx: &mut AnalysisContext,
        function: FunctionId,
        position: ArgPosition,
        arg_name: String,
        pending: &mut BTreeSet<(FunctionId, MarkedFunctionInfo)>,
    ) {
        let name = self.module.function(function).name.clone();
        debug!(function = %name, %position, arg = %arg_name, "new input function");
        ctx.mark_input_function(function);
        let info = MarkedFunctionInfo { callee: name, position, arg_name };
        for caller in self.callgraph.callers(function) {
            ctx.mark_reached(caller, info.clone());
            pending.insert((caller, info.clone()));
        }
    }

    /// The value in `caller` that receives the callee's input at the first
    /// call to it.
    fn input_value(&self, caller: FunctionId, info: &MarkedFunctionInfo) -> Option<ValueRef> {
        let call = self
            .module
            .function_insts(caller)
            .find(|i| self.module.inst(*i).callee() == Some(info.callee.as_str()))?;
        let inst = self.module.inst(call);
        let InstKind::Call { args, .. } = &inst.kind else {
            return None;
        };
        match info.position {
            ArgPosition::Argument(n) => match (n as usize).checked_sub(1).and_then(|i| args.get(i)) {
                Some(arg) => Some(*arg),
                None => self.search_named_value(caller, call, &info.arg_name),
            },
            ArgPosition::Return if inst.ty != Ty::Void => Some(ValueRef::Inst(call)),
            ArgPosition::Return => {
                let register = if info.arg_name.is_empty() {
                    self.config.return_register()
                } else {
                    info.arg_name.as_str()
                };
                self.search_register_read(caller, call, register)
            }
        }
    }

    /// Locate the value carried in a named register at `call`: first among
    /// the call's transitive operands, then as the last value stored to the
    /// register before the call. A register the caller never writes yields
    /// nothing.
    fn search_named_value(&self, caller: FunctionId, call: InstId, name: &str) -> Option<ValueRef> {
        let mut queue: VecDeque<ValueRef> = self.module.inst(call).kind.operands().into();
        let mut visited = HashSet::new();
        while let Some(value) = queue.pop_front() {
            if !visited.insert(value) {
                continue;
            }
            if self.module.value_name(value) == Some(name) {
                return Some(value);
            }
            if let Some(id) = value.as_inst() {
                queue.extend(self.module.inst(id).kind.operands());
            }
        }

        let register = self.module.global_by_name(name)?;
        let before: Vec<InstId> =
            self.module.function_insts(caller).take_while(|i| *i != call).collect();
        for id in before.into_iter().rev() {
            if let InstKind::Store { value, ptr } = self.module.inst(id).kind {
                if ptr == ValueRef::Global(register) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// First read of `register` after a void call.
    fn search_register_read(&self, caller: FunctionId, call: InstId, register: &str) -> Option<ValueRef> {
        let register = self.module.global_by_name(register)?;
        self.module
            .function_insts(caller)
            .skip_while(|i| *i != call)
            .find(|i| {
                matches!(self.module.inst(*i).kind, InstKind::Load { ptr } if ptr == ValueRef::Global(register))
            })
            .map(ValueRef::Inst)
    }

    /// Whether `value` flows to a return or into the return register.
    fn is_returned(&self, caller: FunctionId, value: ValueRef) -> bool {
        let return_register = self
            .module
            .global_by_name(self.config.return_register())
            .map(ValueRef::Global);
        let mut queue = VecDeque::from([value]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for user in self.module.users(current) {
                let inst = self.module.inst(user);
                if inst.function != caller {
                    continue;
                }
                match inst.kind {
                    InstKind::Ret { .. } => return true,
                    InstKind::Store { value: stored, ptr } => {
                        if stored == current && Some(ptr) == return_register {
                            return true;
                        }
                    }
                    _ => queue.push_back(ValueRef::Inst(user)),
                }
            }
        }
        false
    }

    /// The caller parameter `value` derives from, as a 1-based slot and a
    /// name. Register parameters are numbered after the formal arguments.
    fn reached_param(&self, caller: FunctionId, value: ValueRef) -> Option<(u32, String)> {
        let descriptor = self.extractor.extract(caller);
        let formal_count = self.module.function(caller).args.len();
        let mut queue = VecDeque::from([value]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            match current {
                ValueRef::Argument { function, index } if function == caller => {
                    let name = self
                        .module
                        .value_name(current)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("arg{index}"));
                    return Some((index + 1, name));
                }
                ValueRef::Global(_) => {
                    if let Some(pos) = descriptor.register_position(current) {
                        let name = self.module.value_name(current).unwrap_or_default().to_string();
                        return Some(((formal_count + pos + 1) as u32, name));
                    }
                }
                ValueRef::Inst(id) => queue.extend(self.module.inst(id).kind.operands()),
                _ => {}
            }
        }
        None
    }
}
