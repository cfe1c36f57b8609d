//! storage.rs
//! Frozen state -> dependent-effects index in dense CSR layout.

use crate::store::{EffectId, StateId};

/// Maps every state to its dependent effects, in declaration order.
///
/// Built once by the linker and never mutated afterwards; lookup is a
/// range read into one flat array.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents_flat: Box<[EffectId]>,
    dependents_ranges: Box<[(u32, u32)]>, // (start, count)
}

impl DependencyGraph {
    pub fn state_count(&self) -> usize { self.dependents_ranges.len() }
    pub fn edge_count(&self) -> usize { self.dependents_flat.len() }

    #[inline(always)]
    pub fn dependents(&self, state: StateId) -> &[EffectId] {
        match self.dependents_ranges.get(state.index()) {
            Some(&(start, count)) => &self.dependents_flat[start as usize..(start + count) as usize],
            None => &[],
        }
    }

    /// Deduplicated dependents of several states, ordered by effect declaration.
    pub fn union_of(&self, states: &[StateId]) -> Vec<EffectId> {
        let mut out: Vec<EffectId> = states.iter().flat_map(|&s| self.dependents(s).iter().copied()).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Accumulates registrations during linking, then freezes into a `DependencyGraph`.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    per_state: Vec<Vec<EffectId>>,
}

impl GraphBuilder {
    pub fn new(state_count: usize) -> Self {
        Self { per_state: vec![Vec::new(); state_count] }
    }

    /// Effects must be registered in declaration order.
    pub fn register(&mut self, effect: EffectId, triggers: &[StateId]) {
        for &state in triggers {
            self.per_state[state.index()].push(effect);
        }
    }

    pub fn freeze(self) -> DependencyGraph {
        let total = self.per_state.iter().map(Vec::len).sum();
        let mut flat = Vec::with_capacity(total);
        let mut ranges = Vec::with_capacity(self.per_state.len());

        for deps in self.per_state {
            ranges.push((flat.len() as u32, deps.len() as u32));
            flat.extend(deps);
        }

        DependencyGraph {
            dependents_flat: flat.into_boxed_slice(),
            dependents_ranges: ranges.into_boxed_slice(),
        }
    }
}
