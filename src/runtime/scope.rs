//! What guards and bodies can see and do.
//!
//! Reads are limited to the effect's declared triggers and context states;
//! there is no lookup by name.

use super::engine::{Runtime, SetOutcome};
use super::error::RuntimeError;
use crate::graph::Effect;
use crate::store::{EffectId, StateId, Value};

fn check_read(runtime: &Runtime, effect: &Effect, state: StateId) -> Result<(), RuntimeError> {
    if effect.can_read(state) {
        return Ok(());
    }
    let program = runtime.program();
    let state = program.state_name(state).map_or_else(|| format!("{:?}", state), str::to_string);
    Err(RuntimeError::UndeclaredRead { effect: effect.name().to_string(), state })
}

/// Read-only view handed to guards.
pub struct EffectView<'a> {
    runtime: &'a Runtime,
    effect: &'a Effect,
}

impl<'a> EffectView<'a> {
    pub(crate) fn new(runtime: &'a Runtime, effect: &'a Effect) -> Self {
        Self { runtime, effect }
    }

    pub fn effect_name(&self) -> &str { self.effect.name() }

    pub fn get(&self, state: StateId) -> Result<&'a Value, RuntimeError> {
        check_read(self.runtime, self.effect, state)?;
        Ok(self.runtime.store().get(state))
    }

    /// Value of the trigger at `position` in the effect's trigger list.
    pub fn trigger(&self, position: usize) -> Option<&'a Value> {
        let store = self.runtime.store();
        self.effect.triggers().get(position).map(|&s| store.get(s))
    }

    pub fn context(&self, position: usize) -> Option<&'a Value> {
        let store = self.runtime.store();
        self.effect.context().get(position).map(|&s| store.get(s))
    }
}

/// Handed to effect bodies. Reads like `EffectView`, plus re-entrant `set`.
pub struct EffectScope<'a> {
    runtime: &'a mut Runtime,
    effect: &'a Effect,
}

impl<'a> EffectScope<'a> {
    pub(crate) fn new(runtime: &'a mut Runtime, effect: &'a Effect) -> Self {
        Self { runtime, effect }
    }

    pub fn effect_id(&self) -> EffectId { self.effect.id() }
    pub fn effect_name(&self) -> &str { self.effect.name() }

    pub fn get(&self, state: StateId) -> Result<&Value, RuntimeError> {
        check_read(&*self.runtime, self.effect, state)?;
        Ok(self.runtime.store().get(state))
    }

    pub fn previous(&self, state: StateId) -> Result<&Value, RuntimeError> {
        check_read(&*self.runtime, self.effect, state)?;
        Ok(self.runtime.store().previous(state))
    }

    pub fn trigger(&self, position: usize) -> Option<&Value> {
        let store = self.runtime.store();
        self.effect.triggers().get(position).map(|&s| store.get(s))
    }

    pub fn context(&self, position: usize) -> Option<&Value> {
        let store = self.runtime.store();
        self.effect.context().get(position).map(|&s| store.get(s))
    }

    /// setState from inside a body. Processed within the current pass.
    pub fn set(&mut self, state: StateId, value: impl Into<Value>) -> Result<SetOutcome, RuntimeError> {
        self.runtime.set_state(state, value)
    }

    /// Builds the error a body returns to report its own failure.
    pub fn fail(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::EffectFailed { effect: self.effect.name().to_string(), message: message.into() }
    }
}
