//! Direct call graph over module functions.

use std::collections::HashMap;

use petgraph::algo::{condensation, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::ir::{FunctionId, Module};

#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<FunctionId, ()>,
    nodes: HashMap<FunctionId, NodeIndex>,
}

impl CallGraph {
    /// One node per function, one edge per distinct caller/callee pair.
    /// Calls to names the module does not define are ignored.
    pub fn build(module: &Module) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for f in module.function_ids() {
            nodes.insert(f, graph.add_node(f));
        }
        for caller in module.function_ids() {
            for inst in module.function_insts(caller) {
                let Some(callee) = module.inst(inst).callee() else { continue };
                let Some(callee) = module.function_by_name(callee) else { continue };
                graph.update_edge(nodes[&caller], nodes[&callee], ());
            }
        }
        Self { graph, nodes }
    }

    pub fn callers(&self, f: FunctionId) -> Vec<FunctionId> {
        self.neighbors(f, Direction::Incoming)
    }

    pub fn callees(&self, f: FunctionId) -> Vec<FunctionId> {
        self.neighbors(f, Direction::Outgoing)
    }

    fn neighbors(&self, f: FunctionId, direction: Direction) -> Vec<FunctionId> {
        let Some(node) = self.nodes.get(&f) else {
            return Vec::new();
        };
        let mut out: Vec<FunctionId> =
            self.graph.neighbors_directed(*node, direction).map(|n| self.graph[n]).collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn function_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Upper bound on useful propagation rounds: the longest path through
    /// the graph of strongly connected components, each component weighted
    /// by its size.
    pub fn max_path_length(&self) -> usize {
        let dag = condensation(self.graph.clone(), true);
        let order = match toposort(&dag, None) {
            Ok(order) => order,
            Err(_) => return self.function_count(),
        };
        let mut longest: HashMap<NodeIndex, usize> = HashMap::new();
        let mut best = 0;
        for node in order {
            let incoming = dag
                .neighbors_directed(node, Direction::Incoming)
                .map(|p| longest.get(&p).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            let here = incoming + dag[node].len();
            best = best.max(here);
            longest.insert(node, here);
        }
        best
    }
}
