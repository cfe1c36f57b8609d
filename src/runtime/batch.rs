//! Batch scope: commits happen immediately, notification waits for the scope to close.

use super::engine::Runtime;
use super::error::RuntimeError;
use super::pass::PassMode;
use crate::store::StateId;
use tracing::debug;

/// States committed inside the open batch, in first-commit order, each once.
#[derive(Debug, Clone, Default)]
pub(crate) struct Batch {
    changed: Vec<StateId>,
    seen: Vec<bool>,
}

impl Batch {
    pub fn new(state_count: usize) -> Self {
        Self { changed: Vec::new(), seen: vec![false; state_count] }
    }

    pub fn record(&mut self, state: StateId) {
        let seen = &mut self.seen[state.index()];
        if !*seen {
            *seen = true;
            self.changed.push(state);
        }
    }

    pub fn into_changed(self) -> Vec<StateId> {
        self.changed
    }
}

impl Runtime {
    /// Runs `body` with notification deferred.
    ///
    /// When the scope closes, every effect depending on at least one changed
    /// state is notified once, regardless of how many of its triggers changed
    /// or in what order they were set. An effect is registered on all of its
    /// triggers at its declaration point, so the flush runs effects in
    /// declaration order. A nested call joins the enclosing scope and flushes
    /// nothing itself.
    ///
    /// If `body` panics, the scope is discarded before the panic resumes.
    pub fn run_batch<R>(&mut self, body: impl FnOnce(&mut Runtime) -> R) -> Result<R, RuntimeError> {
        if self.batch.is_some() || self.pass.is_some() {
            return Ok(body(self));
        }

        self.contain_unwind(|rt| {
            rt.batch = Some(Batch::new(rt.program.state_count()));
            let out = body(rt);
            let changed = rt.batch.take().map(Batch::into_changed).unwrap_or_default();
            rt.flush(&changed).map(|()| out)
        })
    }

    fn flush(&mut self, changed: &[StateId]) -> Result<(), RuntimeError> {
        if changed.is_empty() {
            return Ok(());
        }
        let effects = self.program.graph().union_of(changed);
        debug!(states = changed.len(), effects = effects.len(), "flushing batch");

        self.begin_pass(PassMode::Queued).seed(effects);
        self.finish_pass(Ok(()))
    }
}
