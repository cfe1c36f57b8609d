//! Rule declarations and their compiled per-state validators.
pub mod clause;
pub mod compiler;
pub mod validator;

pub use clause::{Predicate, RejectHandler, RuleBlock, RuleClause};
pub use compiler::RuleCompiler;
pub use validator::{CompiledValidator, RejectReason, Rejection, RuleRef, RuleSlot, Verdict};
