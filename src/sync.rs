//! Thread-safe handle around a `Runtime`.
//!
//! Mutations are serialised behind one lock, so each setState or batch runs
//! its whole protocol before the next starts. Readers never take that lock:
//! after every mutation the current values are published as an immutable
//! snapshot.

use crate::config::EngineConfig;
use crate::program::Program;
use crate::runtime::{Runtime, RuntimeError, RuntimeStats, SetOutcome};
use crate::store::{StateId, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

struct Shared {
    runtime: Mutex<Runtime>,
    published: RwLock<Arc<[Value]>>,
}

#[derive(Clone)]
pub struct SharedRuntime {
    inner: Arc<Shared>,
    program: Arc<Program>,
}

impl SharedRuntime {
    pub fn new(program: Arc<Program>) -> Self {
        Self::with_config(program, EngineConfig::default())
    }

    pub fn with_config(program: Arc<Program>, config: EngineConfig) -> Self {
        let runtime = Runtime::with_config(Arc::clone(&program), config);
        let published = RwLock::new(Arc::from(runtime.values()));
        Self {
            inner: Arc::new(Shared { runtime: Mutex::new(runtime), published }),
            program,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn set_state(&self, state: StateId, value: impl Into<Value>) -> Result<SetOutcome, RuntimeError> {
        let mut runtime = self.inner.runtime.lock();
        let result = runtime.set_state(state, value);
        self.publish(&runtime);
        result
    }

    pub fn run_batch<R>(&self, body: impl FnOnce(&mut Runtime) -> R) -> Result<R, RuntimeError> {
        let mut runtime = self.inner.runtime.lock();
        let result = runtime.run_batch(body);
        self.publish(&runtime);
        result
    }

    /// Last published value of `state`.
    pub fn read(&self, state: StateId) -> Option<Value> {
        self.inner.published.read().get(state.index()).cloned()
    }

    /// Last published values, indexed by `StateId`.
    pub fn values(&self) -> Arc<[Value]> {
        Arc::clone(&self.inner.published.read())
    }

    pub fn stats(&self) -> RuntimeStats {
        self.inner.runtime.lock().stats().clone()
    }

    /// Runs `f` with exclusive access, without publishing afterwards.
    pub fn with_runtime<R>(&self, f: impl FnOnce(&Runtime) -> R) -> R {
        f(&self.inner.runtime.lock())
    }

    fn publish(&self, runtime: &Runtime) {
        *self.inner.published.write() = Arc::from(runtime.values());
    }
}
