//! Reactive state engine.
//!
//! Programs declare states, per-state rejection rules and effects that
//! subscribe to states. `ProgramBuilder::link` compiles the rules, resolves
//! every effect to state handles and freezes a state -> effect dependency
//! graph. A `Runtime` then executes `set_state`: validate, commit or reject,
//! notify dependents in declaration order, with cycle detection and batching.

pub mod analysis;
pub mod config;
pub mod display;
pub mod graph;
pub mod program;
pub mod rules;
pub mod runtime;
pub mod store;
pub mod sync;

pub use config::{ConfigError, EngineConfig, GuardPolicy};
pub use graph::{EffectDecl, EffectFailure, FailureCause, LinkIssue, ProgramBuilder, StaticLinkError};
pub use program::Program;
pub use rules::{Rejection, RejectReason, RuleBlock, RuleClause};
pub use runtime::{CycleError, EffectScope, EffectView, Runtime, RuntimeError, RuntimeStats, SetOutcome, Snapshot};
pub use store::{EffectId, StateId, Value, ValueType};
pub use sync::SharedRuntime;
