//! Effect declarations and the immutable records the linker turns them into.

use crate::rules::{Rejection, RuleRef};
use crate::runtime::{EffectScope, EffectView, RuntimeError};
use crate::store::{EffectId, StateId};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Optional precondition (`when`). Sees triggers and context states only.
pub type Guard = Arc<dyn Fn(&EffectView<'_>) -> bool + Send + Sync>;

/// The effect procedure. May call back into `set` on the scope.
pub type Body = Arc<dyn Fn(&mut EffectScope<'_>) -> Result<(), RuntimeError> + Send + Sync>;

pub type EffectFallback = Arc<dyn Fn(&EffectFailure) + Send + Sync>;

/// A parsed effect block: triggers by name, resolved at link time.
#[derive(Clone)]
pub struct EffectDecl {
    pub(crate) name: Option<String>,
    pub(crate) triggers: Vec<String>,
    pub(crate) context: Vec<String>,
    pub(crate) writes: Vec<String>,
    pub(crate) guard: Option<Guard>,
    pub(crate) body: Body,
    pub(crate) fallback: Option<EffectFallback>,
}

impl EffectDecl {
    pub fn new<I, S, F>(triggers: I, body: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut EffectScope<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            triggers: triggers.into_iter().map(Into::into).collect(),
            context: Vec::new(),
            writes: Vec::new(),
            guard: None,
            body: Arc::new(body),
            fallback: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// States read by the body without subscribing to them.
    pub fn context<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.extend(states.into_iter().map(Into::into));
        self
    }

    /// States the body is expected to write. Used only for static cycle analysis.
    pub fn writes<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes.extend(states.into_iter().map(Into::into));
        self
    }

    pub fn when(mut self, guard: impl Fn(&EffectView<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn fallback(mut self, handler: impl Fn(&EffectFailure) + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// An inherited rule no longer holds for a trigger's current value.
    RuleViolated(Rejection),
    /// The guard evaluated false under `GuardPolicy::Fallback`.
    GuardDeclined,
    /// The body returned an error other than a cycle.
    BodyFailed(RuntimeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectFailure {
    pub effect: EffectId,
    pub effect_name: String,
    pub cause: FailureCause,
}

/// A linked effect. Immutable once the program is built.
pub struct Effect {
    pub(crate) id: EffectId,
    pub(crate) name: String,
    pub(crate) triggers: SmallVec<[StateId; 4]>,
    pub(crate) context: SmallVec<[StateId; 2]>,
    pub(crate) writes: SmallVec<[StateId; 2]>,
    /// Union of the rules of every trigger, computed once by the linker.
    pub(crate) inherited: Box<[RuleRef]>,
    pub(crate) guard: Option<Guard>,
    pub(crate) body: Body,
    pub(crate) fallback: Option<EffectFallback>,
}

impl Effect {
    pub fn id(&self) -> EffectId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn triggers(&self) -> &[StateId] { &self.triggers }
    pub fn context(&self) -> &[StateId] { &self.context }
    pub fn writes(&self) -> &[StateId] { &self.writes }
    pub fn inherited_rules(&self) -> &[RuleRef] { &self.inherited }
    pub fn is_guarded(&self) -> bool { self.guard.is_some() }
    pub fn has_fallback(&self) -> bool { self.fallback.is_some() }

    #[inline]
    pub fn can_read(&self, state: StateId) -> bool {
        self.triggers.contains(&state) || self.context.contains(&state)
    }

    /// Runs the declared fallback. Returns false when the effect has none.
    pub(crate) fn run_fallback(&self, cause: FailureCause) -> bool {
        match &self.fallback {
            Some(handler) => {
                handler(&EffectFailure { effect: self.id, effect_name: self.name.clone(), cause });
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .field("context", &self.context)
            .field("writes", &self.writes)
            .field("inherited", &self.inherited)
            .field("guarded", &self.guard.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
