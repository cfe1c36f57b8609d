//! Human-readable renderings of the dependency graph, cycles and link findings.
pub mod trace;

pub use trace::{format_cycle, format_dependents, format_link_report};
