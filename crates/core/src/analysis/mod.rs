//! Taint analyses over lifted functions.
//!
//! - [`params`]: register and stack parameters of isolated functions
//! - [`flow`]: forward def-use chains from each parameter
//! - [`stores`]: stores whose address a parameter controls
//! - [`loops`]: loops guarded by parameter-dependent comparisons
//! - [`callgraph`] and [`propagation`]: which functions receive external input

pub mod callgraph;
pub mod context;
pub mod flow;
pub mod loops;
pub mod params;
pub mod propagation;
pub mod stores;
pub mod usage;

pub use callgraph::CallGraph;
pub use context::{AnalysisContext, FunctionState, Statistics};
pub use flow::{DefUse, DefUseChain, FlowTracer, ValueFlow};
pub use loops::{LoopAnalyzer, LoopDependencies, VulnerableLoop};
pub use params::{FunctionDescriptor, ParameterExtractor, StackParameter};
pub use propagation::{ArgPosition, BackwardPropagation, MarkedFunctionInfo};
pub use stores::{find_address, find_risky_stores, RiskyStore};
pub use usage::ParamsUsage;
