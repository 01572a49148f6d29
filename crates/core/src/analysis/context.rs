//! Per-run analysis state.
//!
//! Marks live in a side table keyed by function id instead of being
//! attached to IR objects, so a module can be analysed any number of times.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ir::FunctionId;

use super::propagation::MarkedFunctionInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionState {
    /// Calls a function that delivers external input.
    pub reached_by_input: bool,
    /// Delivers external input itself: a seed or a propagating caller.
    pub input_function: bool,
    /// Call-site descriptions this function was enqueued with.
    pub infos: Vec<MarkedFunctionInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub overall_functions: usize,
    pub skipped_functions: usize,
    pub var_chains: usize,
    pub stack_chains: usize,
    pub total_stores: usize,
    pub total_loops: usize,
    pub candidate_loops: usize,
    pub filtered_stores: usize,
    pub vulnerable_functions: usize,
    pub input_vulnerable_functions: usize,
    pub marked_functions: usize,
    pub input_functions: usize,
    pub propagation_rounds: usize,
    pub max_call_graph_length: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    states: BTreeMap<FunctionId, FunctionState>,
    stats: Statistics,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn mark_reached(&mut self, function: FunctionId, info: MarkedFunctionInfo) {
        let state = self.states.entry(function).or_default();
        state.reached_by_input = true;
        if !state.infos.contains(&info) {
            state.infos.push(info);
        }
    }

    pub fn mark_input_function(&mut self, function: FunctionId) {
        self.states.entry(function).or_default().input_function = true;
    }

    /// The "marked" flag of the report, also the filter for marked-only runs.
    pub fn is_marked(&self, function: FunctionId) -> bool {
        self.states.get(&function).is_some_and(|s| s.reached_by_input)
    }

    pub fn is_input_function(&self, function: FunctionId) -> bool {
        self.states.get(&function).is_some_and(|s| s.input_function)
    }

    pub fn state(&self, function: FunctionId) -> Option<&FunctionState> {
        self.states.get(&function)
    }

    pub fn marked_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.states.iter().filter(|(_, s)| s.reached_by_input).map(|(f, _)| *f)
    }

    pub fn input_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.states.iter().filter(|(_, s)| s.input_function).map(|(f, _)| *f)
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }
}
