//! Runtime state cells: current and previous value per state.

use super::types::{StateId, Value};
use std::mem;

#[derive(Debug, Clone, Default)]
pub struct StateStore {
    current: Vec<Value>,
    previous: Vec<Value>,
}

impl StateStore {
    /// Seeds every cell from its declared initial value. Previous starts equal to current.
    pub fn from_initial(initial: &[Value]) -> Self {
        Self {
            current: initial.to_vec(),
            previous: initial.to_vec(),
        }
    }

    pub fn len(&self) -> usize { self.current.len() }
    pub fn is_empty(&self) -> bool { self.current.is_empty() }

    #[inline(always)]
    pub fn get(&self, id: StateId) -> &Value {
        &self.current[id.index()]
    }

    #[inline(always)]
    pub fn previous(&self, id: StateId) -> &Value {
        &self.previous[id.index()]
    }

    /// `previous := current; current := value`. Callers validate first.
    pub fn commit(&mut self, id: StateId, value: Value) {
        let idx = id.index();
        self.previous[idx] = mem::replace(&mut self.current[idx], value);
    }

    pub fn values(&self) -> &[Value] {
        &self.current
    }
}
