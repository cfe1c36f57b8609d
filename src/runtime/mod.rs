//! Executing a linked program: mutation, validation and notification.
pub mod batch;
pub mod engine;
pub mod error;
mod pass;
pub mod scope;
pub mod stats;

pub use engine::{Runtime, SetOutcome, Snapshot};
pub use error::{CycleError, RuntimeError};
pub use scope::{EffectScope, EffectView};
pub use stats::RuntimeStats;
