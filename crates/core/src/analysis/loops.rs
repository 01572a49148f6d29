//! Loop dependency analysis.
//!
//! A loop is vulnerable when the comparison guarding its header depends on
//! a parameter flow and the loop body contains at least one risky store.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::ir::{BlockId, InstId, InstKind, LoopInfo, Module, ValueRef};

use super::stores::RiskyStore;
use super::usage::ParamsUsage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerableLoop {
    pub name: String,
    pub candidate_branches: Vec<InstId>,
    pub risky_stores: Vec<RiskyStore>,
}

/// Loop findings for one function plus the counters the run statistics need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopDependencies {
    pub vulnerable_loops: BTreeMap<String, VulnerableLoop>,
    pub total_loops: usize,
    pub candidate_loops: usize,
    /// Risky stores found inside tainted loops.
    pub filtered_stores: usize,
}

impl LoopDependencies {
    /// A function is safe when none of its vulnerable loops contains a store.
    pub fn is_function_safe(&self) -> bool {
        self.vulnerable_loops.values().all(|l| l.risky_stores.is_empty())
    }

    pub fn risky_store_count(&self) -> usize {
        self.vulnerable_loops.values().map(|l| l.risky_stores.len()).sum()
    }
}

pub struct LoopAnalyzer<'a> {
    module: &'a Module,
    usage: &'a ParamsUsage,
    tainted: HashSet<ValueRef>,
}

impl<'a> LoopAnalyzer<'a> {
    pub fn new(module: &'a Module, usage: &'a ParamsUsage) -> Self {
        Self { module, usage, tainted: usage.tainted_values() }
    }

    pub fn analyze(&self) -> LoopDependencies {
        let function = self.module.function(self.usage.descriptor.function);
        let mut deps = LoopDependencies::default();
        for l in &function.loops {
            if l.name.is_empty() {
                continue;
            }
            deps.total_loops += 1;
            let Some(header) = l.header else {
                warn!(function = %function.name, loop_name = %l.name, "loop has no header; skipped");
                continue;
            };
            let Some((branch, cmp)) = self.header_comparison(header) else {
                debug!(loop_name = %l.name, "no comparison guards the header");
                continue;
            };
            if !self.is_tainted(cmp) {
                continue;
            }
            deps.candidate_loops += 1;
            let stores = self.stores_in(l);
            deps.filtered_stores += stores.len();
            if stores.is_empty() {
                continue;
            }
            debug!(loop_name = %l.name, stores = stores.len(), "vulnerable loop");
            deps.vulnerable_loops.insert(
                l.name.clone(),
                VulnerableLoop { name: l.name.clone(), candidate_branches: vec![branch], risky_stores: stores },
            );
        }
        deps
    }

    /// The header's conditional branch and the comparison feeding it,
    /// searched backwards through operands when the condition is not itself one.
    fn header_comparison(&self, header: BlockId) -> Option<(InstId, InstId)> {
        let term = self.module.terminator(header)?;
        let InstKind::CondBr { cond, .. } = self.module.inst(term).kind else {
            return None;
        };
        let mut queue = VecDeque::from([cond]);
        let mut visited = HashSet::new();
        while let Some(value) = queue.pop_front() {
            let Some(id) = value.as_inst() else { continue };
            if !visited.insert(id) {
                continue;
            }
            let inst = self.module.inst(id);
            if inst.is_cmp() {
                return Some((term, id));
            }
            queue.extend(inst.kind.operands());
        }
        None
    }

    fn is_tainted(&self, cmp: InstId) -> bool {
        self.module.inst(cmp).kind.operands().iter().any(|v| self.tainted.contains(v))
    }

    fn stores_in(&self, l: &LoopInfo) -> Vec<RiskyStore> {
        self.usage
            .risky_stores
            .iter()
            .filter(|s| l.contains(self.module.inst(s.store).block))
            .cloned()
            .collect()
    }
}
