//! flowguard-core
//!
//! Static taint analysis over lifted SSA IR. Given a module produced by a
//! binary lifter, it recovers each function's parameters, traces their
//! def-use flows, flags stores whose address a parameter controls, finds
//! loops bounded by parameter-dependent comparisons, and propagates
//! "receives external input" marks backwards through the call graph.
//!
//! All logic lives here; the `flowguard` binary is a thin frontend.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ir;
pub mod pipeline;
pub mod report;
pub mod seeds;

pub use config::AnalysisConfig;
pub use pipeline::{FunctionAnalysis, SecurityPipeline};
pub use report::{AnalysisReport, ReportSections};

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
