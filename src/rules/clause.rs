//! Parsed rule declarations, as handed over by the host language.

use super::validator::Rejection;
use crate::store::Value;
use std::sync::Arc;

/// A rejection condition: returns `true` when the candidate must be refused.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Runs when a candidate is refused. Observes the rejection; cannot mutate state.
pub type RejectHandler = Arc<dyn Fn(&Rejection) + Send + Sync>;

/// One `(rejection-condition, optional local handler)` pair.
#[derive(Clone)]
pub struct RuleClause {
    pub(crate) condition: Predicate,
    pub(crate) handler: Option<RejectHandler>,
}

impl RuleClause {
    pub fn reject_when(condition: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self { condition: Arc::new(condition), handler: None }
    }

    /// Attaches a local handler that takes precedence over the state fallback.
    pub fn or_else(mut self, handler: impl Fn(&Rejection) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }
}

/// All rule clauses declared for one state, plus its state-level fallback.
#[derive(Clone)]
pub struct RuleBlock {
    pub(crate) state: String,
    pub(crate) clauses: Vec<RuleClause>,
    pub(crate) fallback: Option<RejectHandler>,
}

impl RuleBlock {
    pub fn new(state: impl Into<String>) -> Self {
        Self { state: state.into(), clauses: Vec::new(), fallback: None }
    }

    pub fn clause(mut self, clause: RuleClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn reject_when(self, condition: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.clause(RuleClause::reject_when(condition))
    }

    pub fn fallback(mut self, handler: impl Fn(&Rejection) + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}
