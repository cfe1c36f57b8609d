//! Effect linking and the frozen state -> effect dependency graph.
pub mod effect;
pub mod error;
pub mod linker;
pub mod storage;

pub use effect::{Body, Effect, EffectDecl, EffectFailure, EffectFallback, FailureCause, Guard};
pub use error::{LinkIssue, StaticLinkError};
pub use linker::ProgramBuilder;
pub use storage::{DependencyGraph, GraphBuilder};
