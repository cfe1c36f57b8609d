//! Compiled per-state validators.
use super::clause::{Predicate, RejectHandler};
use crate::store::{StateId, Value, ValueType};
use serde::Serialize;
use std::fmt;

/// Why a candidate value was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// The value's type is not accepted by the state's declared type.
    TypeMismatch { expected: ValueType, found: &'static str },
    /// The rejection condition at this position matched.
    Clause(usize),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            RejectReason::Clause(i) => write!(f, "rule clause #{} matched", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool { matches!(self, Verdict::Accept) }
}

/// Everything a fallback gets to see about a refused mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub state: StateId,
    pub state_name: String,
    pub candidate: Value,
    pub current: Value,
    pub reason: RejectReason,
}

/// One rule of one state, as referenced by the effects that inherit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleRef {
    pub state: StateId,
    pub slot: RuleSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleSlot {
    DeclaredType,
    Clause(u32),
}

pub(crate) struct CompiledClause {
    pub(crate) condition: Predicate,
    /// Local handler if declared, otherwise the state fallback. Resolved by the compiler.
    pub(crate) on_reject: Option<RejectHandler>,
}

/// The compiled validator of one state.
///
/// Clauses combine with logical OR: the first matching condition rejects.
/// The declared type is checked before any clause.
pub struct CompiledValidator {
    pub(crate) state: StateId,
    pub(crate) name: String,
    pub(crate) declared: ValueType,
    pub(crate) clauses: Box<[CompiledClause]>,
    pub(crate) fallback: Option<RejectHandler>,
}

impl CompiledValidator {
    pub fn state(&self) -> StateId { self.state }
    pub fn declared_type(&self) -> ValueType { self.declared }
    pub fn clause_count(&self) -> usize { self.clauses.len() }
    pub fn has_fallback(&self) -> bool { self.fallback.is_some() }

    /// True when the validator accepts every value.
    pub fn is_unconstrained(&self) -> bool {
        self.declared == ValueType::Any && self.clauses.is_empty()
    }

    pub fn validate(&self, candidate: &Value) -> Verdict {
        if let Some(reason) = self.type_violation(candidate) {
            return Verdict::Reject(reason);
        }
        match self.clauses.iter().position(|c| (c.condition)(candidate)) {
            Some(i) => Verdict::Reject(RejectReason::Clause(i)),
            None => Verdict::Accept,
        }
    }

    /// Re-checks a single rule against `value`.
    pub fn check(&self, slot: RuleSlot, value: &Value) -> Option<RejectReason> {
        match slot {
            RuleSlot::DeclaredType => self.type_violation(value),
            RuleSlot::Clause(i) => {
                let clause = self.clauses.get(i as usize)?;
                (clause.condition)(value).then_some(RejectReason::Clause(i as usize))
            }
        }
    }

    /// The rules effects triggered by this state inherit.
    pub fn rule_refs(&self) -> impl Iterator<Item = RuleRef> + '_ {
        let typed = (self.declared != ValueType::Any).then_some(RuleRef {
            state: self.state,
            slot: RuleSlot::DeclaredType,
        });
        typed.into_iter().chain((0..self.clauses.len()).map(move |i| RuleRef {
            state: self.state,
            slot: RuleSlot::Clause(i as u32),
        }))
    }

    /// Runs the resolved handler for `rejection`. Returns false if the rejection was silent.
    pub fn handle(&self, rejection: &Rejection) -> bool {
        let handler = match rejection.reason {
            RejectReason::Clause(i) => self.clauses.get(i).and_then(|c| c.on_reject.as_ref()),
            RejectReason::TypeMismatch { .. } => self.fallback.as_ref(),
        };
        match handler {
            Some(h) => {
                h(rejection);
                true
            }
            None => false,
        }
    }

    pub(crate) fn rejection(&self, candidate: Value, current: Value, reason: RejectReason) -> Rejection {
        Rejection {
            state: self.state,
            state_name: self.name.clone(),
            candidate,
            current,
            reason,
        }
    }

    fn type_violation(&self, value: &Value) -> Option<RejectReason> {
        if self.declared.accepts(value) {
            None
        } else {
            Some(RejectReason::TypeMismatch { expected: self.declared, found: value.type_name() })
        }
    }
}

impl fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("state", &self.state)
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("clauses", &self.clauses.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
