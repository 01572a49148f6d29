//! Risky store detection.
//!
//! A store is risky when a parameter flow reaches it with its address
//! operand as the recorded value. Each finding
//! is tagged with the original machine address recovered from the next
//! address marker call in the same block.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::ir::{InstId, InstKind, Module, ValueRef};

use super::flow::ValueFlow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskyStore {
    /// Source of the flow that reached the store.
    pub pointed_value: ValueRef,
    pub store: InstId,
    /// Zero when no marker precedes the block terminator.
    pub original_address: u64,
    /// Instructions skipped between the store and the marker.
    pub inst_offset: u32,
}

impl RiskyStore {
    pub fn new(module: &Module, pointed_value: ValueRef, store: InstId, marker: &str) -> Self {
        let (original_address, inst_offset) = find_address(module, store, marker);
        Self { pointed_value, store, original_address, inst_offset }
    }
}

/// Scan forward from `store` to the block terminator for `marker(<const>, ...)`.
pub fn find_address(module: &Module, store: InstId, marker: &str) -> (u64, u32) {
    let mut offset = 0u32;
    let mut cursor = module.next_inst(store);
    while let Some(id) = cursor {
        let inst = module.inst(id);
        if inst.kind.is_terminator() {
            break;
        }
        if let InstKind::Call { callee, args } = &inst.kind {
            if callee == marker {
                if let Some(ValueRef::Const(pc)) = args.first() {
                    return (*pc as u64, offset);
                }
            }
        }
        offset += 1;
        cursor = module.next_inst(id);
    }
    (0, 0)
}

/// Collect risky stores across `flows`, one finding per store instruction.
pub fn find_risky_stores<'f>(
    module: &Module,
    flows: impl IntoIterator<Item = &'f ValueFlow>,
    marker: &str,
) -> Vec<RiskyStore> {
    let mut seen = HashSet::new();
    let mut stores = Vec::new();
    for flow in flows {
        for edge in flow.edges() {
            let Some(ptr) = module.inst(edge.user).store_address() else {
                continue;
            };
            if edge.value != ptr {
                continue;
            }
            if seen.insert(edge.user) {
                debug!(store = %module.display_inst(edge.user), "risky store");
                stores.push(RiskyStore::new(module, flow.source, edge.user, marker));
            }
        }
    }
    stores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ModuleBuilder;

    #[test]
    fn marker_after_store_yields_address_and_offset() {
        let mut mb = ModuleBuilder::new("m");
        let rdi = mb.global("rdi");
        let mut f = mb.function("bb.f");
        let p = f.load("p", rdi);
        let st = f.store(ValueRef::Const(0), p);
        f.add("pad", p, ValueRef::Const(1));
        f.call_void("newpc", vec![ValueRef::Const(0x401000), ValueRef::Const(4)]);
        f.ret(None);
        drop(f);
        let m = mb.build();
        assert_eq!(find_address(&m, st, "newpc"), (0x401000, 1));
    }

    #[test]
    fn terminator_stops_the_scan() {
        let mut mb = ModuleBuilder::new("m");
        let rdi = mb.global("rdi");
        let mut f = mb.function("bb.f");
        let entry = f.block("entry");
        let next = f.block("next");
        f.switch_to(entry);
        let p = f.load("p", rdi);
        let st = f.store(ValueRef::Const(0), p);
        f.br(next);
        f.switch_to(next);
        f.call_void("newpc", vec![ValueRef::Const(0x401000)]);
        f.ret(None);
        drop(f);
        let m = mb.build();
        assert_eq!(find_address(&m, st, "newpc"), (0, 0));
    }
}
