//! Link-time static analysis over the effect graph.
pub mod topology;

pub use topology::LinkReport;
