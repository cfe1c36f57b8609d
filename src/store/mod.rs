//! State identities, values and the cells that hold them.
pub mod cells;
pub mod registry;
pub mod types;

pub use cells::StateStore;
pub use registry::StateRegistry;
pub use types::{EffectId, StateId, Value, ValueType};
