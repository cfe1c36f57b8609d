use super::types::*;
use std::collections::HashMap;

/// Declaration-time table of states, in columnar layout.
///
/// Ids are handed out as states are declared so effect bodies can capture
/// them before the program is linked. A name declared twice keeps its first
/// id; the repeat is remembered and surfaced as a link issue.
#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    // Columnar Arrays
    pub names: Vec<String>,
    pub types: Vec<ValueType>,
    pub initial: Vec<Value>,

    by_name: HashMap<String, StateId>,
    duplicates: Vec<String>,
}

impl StateRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.names.len() }

    pub fn add_state(&mut self, name: &str, ty: ValueType, initial: Value) -> StateId {
        if let Some(&existing) = self.by_name.get(name) {
            self.duplicates.push(name.to_string());
            return existing;
        }

        let id = StateId::new(self.names.len());
        self.names.push(name.to_string());
        self.types.push(ty);
        self.initial.push(initial);
        self.by_name.insert(name.to_string(), id);
        id
    }

    #[inline(always)]
    pub fn lookup(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: StateId) -> &str {
        &self.names[id.index()]
    }

    /// Names that were declared more than once, in the order the repeats happened.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}
