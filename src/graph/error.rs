//! Defines the error types raised while linking declarations.
use crate::rules::RejectReason;
use thiserror::Error;

/// A single problem found while linking. Several can be reported at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkIssue {
    #[error("state '{name}' is declared more than once")]
    DuplicateState { name: String },
    #[error("effect '{effect}' declares no triggers")]
    EmptyTriggers { effect: String },
    #[error("effect '{effect}' is triggered by undeclared state '{state}'")]
    UndeclaredTrigger { effect: String, state: String },
    #[error("effect '{effect}' reads undeclared context state '{state}'")]
    UndeclaredContext { effect: String, state: String },
    #[error("effect '{effect}' declares a write to undeclared state '{state}'")]
    UndeclaredWrite { effect: String, state: String },
    #[error("rules target undeclared state '{state}'")]
    UndeclaredRuleTarget { state: String },
    #[error("state '{state}' declares more than one fallback")]
    DuplicateFallback { state: String },
    #[error("initial value of state '{state}' is rejected: {reason}")]
    InitialValueRejected { state: String, reason: RejectReason },
}

/// Link failed. Fatal: the program cannot start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("static link failed: {}", join_issues(.issues))]
pub struct StaticLinkError {
    pub issues: Vec<LinkIssue>,
}

impl StaticLinkError {
    pub fn contains(&self, issue: &LinkIssue) -> bool {
        self.issues.contains(issue)
    }
}

fn join_issues(issues: &[LinkIssue]) -> String {
    issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
}
