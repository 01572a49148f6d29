pub mod analyze;
pub mod graph;
pub mod util;

pub use analyze::*;
pub use graph::*;
pub use util::*;
