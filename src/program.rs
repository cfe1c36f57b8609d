//! The linked, immutable program shared by every runtime built on it.

use crate::analysis::LinkReport;
use crate::graph::{DependencyGraph, Effect};
use crate::rules::CompiledValidator;
use crate::runtime::RuntimeError;
use crate::store::{EffectId, StateId, StateRegistry, Value, ValueType};

/// Output of `ProgramBuilder::link`.
///
/// Holds the state table, one compiled validator per state, the linked
/// effects and the frozen dependency graph. Nothing here changes after
/// linking; runtimes share it through an `Arc`.
#[derive(Debug)]
pub struct Program {
    states: StateRegistry,
    validators: Box<[CompiledValidator]>,
    effects: Box<[Effect]>,
    graph: DependencyGraph,
    report: LinkReport,
}

impl Program {
    pub(crate) fn new(
        states: StateRegistry,
        validators: Vec<CompiledValidator>,
        effects: Vec<Effect>,
        graph: DependencyGraph,
        report: LinkReport,
    ) -> Self {
        Self {
            states,
            validators: validators.into_boxed_slice(),
            effects: effects.into_boxed_slice(),
            graph,
            report,
        }
    }

    pub fn state_count(&self) -> usize { self.states.count() }
    pub fn effect_count(&self) -> usize { self.effects.len() }

    /// Host-boundary lookup. The engine itself never resolves names at runtime.
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.states.lookup(name)
    }

    /// Accessors taking a handle return `None` for one issued by another program.
    pub fn state_name(&self, state: StateId) -> Option<&str> {
        (state.index() < self.state_count()).then(|| self.states.name(state))
    }

    pub fn declared_type(&self, state: StateId) -> Option<ValueType> {
        self.states.types.get(state.index()).copied()
    }

    pub fn initial_values(&self) -> &[Value] {
        &self.states.initial
    }

    pub fn validator(&self, state: StateId) -> Option<&CompiledValidator> {
        self.validators.get(state.index())
    }

    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(id.index())
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Effects depending on `state`, in declaration order.
    #[inline(always)]
    pub fn dependents(&self, state: StateId) -> &[EffectId] {
        self.graph.dependents(state)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn report(&self) -> &LinkReport {
        &self.report
    }

    // Unchecked lookups for handles already validated by `check_state` or
    // produced by the linker itself.
    pub(crate) fn name_of(&self, state: StateId) -> &str {
        self.states.name(state)
    }

    pub(crate) fn rules_of(&self, state: StateId) -> &CompiledValidator {
        &self.validators[state.index()]
    }

    pub(crate) fn effect_at(&self, id: EffectId) -> &Effect {
        &self.effects[id.index()]
    }

    pub(crate) fn check_state(&self, state: StateId) -> Result<(), RuntimeError> {
        if state.index() < self.state_count() {
            Ok(())
        } else {
            Err(RuntimeError::UnknownState(state))
        }
    }
}
