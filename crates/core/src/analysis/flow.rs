//! Def-use flow tracing.
//!
//! A flow is the forward closure of a value over SSA uses within one
//! function. Stores end a path: past the first hop, the edge recorded for a
//! store names its address operand and nothing is followed through memory.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::trace;

use crate::ir::{FunctionId, InstId, Module, ValueRef};

/// One edge of a chain: `user` consumes `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DefUse {
    pub user: InstId,
    pub value: ValueRef,
}

/// Ordered, duplicate-free list of edges reachable from one direct use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DefUseChain {
    edges: Vec<DefUse>,
}

impl DefUseChain {
    pub fn edges(&self) -> &[DefUse] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains_user(&self, user: InstId) -> bool {
        self.edges.iter().any(|e| e.user == user)
    }
}

/// All chains rooted at one source value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueFlow {
    pub source: ValueRef,
    pub chains: Vec<DefUseChain>,
}

impl ValueFlow {
    pub fn is_unused(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DefUse> {
        self.chains.iter().flat_map(|c| c.edges.iter())
    }

    /// True when `value` is the source or the result of an instruction on
    /// one of the chains.
    pub fn derives(&self, value: ValueRef) -> bool {
        if value == self.source {
            return true;
        }
        match value.as_inst() {
            Some(id) => self.chains.iter().any(|c| c.contains_user(id)),
            None => false,
        }
    }
}

pub struct FlowTracer<'a> {
    module: &'a Module,
    function: FunctionId,
}

impl<'a> FlowTracer<'a> {
    pub fn new(module: &'a Module, function: FunctionId) -> Self {
        Self { module, function }
    }

    /// One chain per distinct direct user of `source` inside the function.
    pub fn trace(&self, source: ValueRef) -> ValueFlow {
        let mut chains = Vec::new();
        let mut direct = HashSet::new();
        for user in self.module.users(source) {
            if !self.in_function(user) || !direct.insert(user) {
                continue;
            }
            let first = DefUse { user, value: source };
            let mut chain = DefUseChain { edges: vec![first] };
            let mut seen = HashSet::from([first]);
            self.extend(&mut chain, &mut seen, user);
            trace!(source = %self.module.display_value(source), len = chain.len(), "chain");
            chains.push(chain);
        }
        ValueFlow { source, chains }
    }

    fn extend(&self, chain: &mut DefUseChain, seen: &mut HashSet<DefUse>, from: InstId) {
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            let value = ValueRef::Inst(current);
            for user in self.module.users(value) {
                if !self.in_function(user) {
                    continue;
                }
                let edge = self.edge(user, value);
                if seen.insert(edge) {
                    chain.edges.push(edge);
                    queue.push_back(user);
                }
            }
        }
    }

    /// Stores reached through the chain are recorded against their address
    /// so the edge identifies where the flow writes.
    fn edge(&self, user: InstId, value: ValueRef) -> DefUse {
        match self.module.inst(user).store_address() {
            Some(ptr) => DefUse { user, value: ptr },
            None => DefUse { user, value },
        }
    }

    fn in_function(&self, inst: InstId) -> bool {
        self.module.inst(inst).function == self.function
    }
}
