use crate::program::Program;
use crate::store::{EffectId, StateId};
use thiserror::Error;

/// An effect was re-notified while it, or one of its causes, was still in flight.
///
/// `chain` starts and ends with the re-entered effect, e.g. `[E1, E2, E1]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("effect cycle through state '{state_name}': {}", .names.join(" -> "))]
pub struct CycleError {
    pub chain: Vec<EffectId>,
    pub names: Vec<String>,
    pub state: StateId,
    pub state_name: String,
}

impl CycleError {
    pub(crate) fn new(program: &Program, in_flight: &[EffectId], reentered: EffectId, state: StateId) -> Self {
        let start = in_flight.iter().position(|&e| e == reentered).unwrap_or(0);
        let mut chain = in_flight[start..].to_vec();
        chain.push(reentered);
        let names = chain.iter().map(|&e| program.effect_at(e).name().to_string()).collect();
        Self {
            chain,
            names,
            state,
            state_name: program.name_of(state).to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("unknown state handle {0:?}")]
    UnknownState(StateId),
    #[error("effect '{effect}' cannot read state '{state}': not a declared trigger or context")]
    UndeclaredRead { effect: String, state: String },
    #[error("effect '{effect}' failed: {message}")]
    EffectFailed { effect: String, message: String },
}

impl RuntimeError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, RuntimeError::Cycle(_))
    }
}
