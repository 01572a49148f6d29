//! Per-function parameter usage: every parameter's flow plus the risky
//! stores those flows reach.

use std::collections::HashSet;

use tracing::info;

use crate::config::AnalysisConfig;
use crate::ir::{Module, ValueRef};

use super::flow::{FlowTracer, ValueFlow};
use super::params::{FunctionDescriptor, StackParameter};
use super::stores::{find_risky_stores, RiskyStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsUsage {
    pub descriptor: FunctionDescriptor,
    /// Formal arguments, then register parameters, then the stack pointer.
    pub var_flows: Vec<ValueFlow>,
    pub stack_flows: Vec<(StackParameter, ValueFlow)>,
    pub risky_stores: Vec<RiskyStore>,
}

impl ParamsUsage {
    pub fn analyze(module: &Module, descriptor: FunctionDescriptor, config: &AnalysisConfig) -> Self {
        let tracer = FlowTracer::new(module, descriptor.function);
        let mut sources: Vec<ValueRef> = module.arguments(descriptor.function).collect();
        sources.extend(descriptor.register_params.iter().copied());
        if config.trace_stack_pointer {
            if let Some(sp) = descriptor.stack_pointer {
                sources.push(ValueRef::Global(sp));
            }
        }
        let mut unique = HashSet::new();
        let var_flows: Vec<ValueFlow> = sources
            .into_iter()
            .filter(|s| unique.insert(*s))
            .map(|s| tracer.trace(s))
            .collect();
        let stack_flows: Vec<(StackParameter, ValueFlow)> = descriptor
            .stack_params
            .iter()
            .map(|p| (p.clone(), tracer.trace(p.value)))
            .collect();

        let flows = var_flows.iter().chain(stack_flows.iter().map(|(_, f)| f));
        let risky_stores = find_risky_stores(module, flows, &config.address_marker);

        info!(
            function = %descriptor.name,
            flows = var_flows.len(),
            stack_flows = stack_flows.len(),
            risky = risky_stores.len(),
            "parameter usage"
        );
        Self { descriptor, var_flows, stack_flows, risky_stores }
    }

    pub fn flows(&self) -> impl Iterator<Item = &ValueFlow> {
        self.var_flows.iter().chain(self.stack_flows.iter().map(|(_, f)| f))
    }

    /// Sources, edge users and edge values of every flow. Constants are
    /// never tainted.
    pub fn tainted_values(&self) -> HashSet<ValueRef> {
        let mut values = HashSet::new();
        for flow in self.flows() {
            values.insert(flow.source);
            for edge in flow.edges() {
                values.insert(ValueRef::Inst(edge.user));
                values.insert(edge.value);
            }
        }
        values.retain(|v| !v.is_const());
        values
    }

    pub fn chain_count(&self) -> (usize, usize) {
        let var = self.var_flows.iter().map(|f| f.chains.len()).sum();
        let stack = self.stack_flows.iter().map(|(_, f)| f.chains.len()).sum();
        (var, stack)
    }
}
