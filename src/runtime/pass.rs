//! Bookkeeping for one notification pass.

use super::error::CycleError;
use crate::store::EffectId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassMode {
    /// Synchronous setState: dependents run immediately, nested commits recurse.
    DepthFirst,
    /// Batch flush: dependents are queued and run in order; nested commits join the queue.
    Queued,
}

#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub effect: EffectId,
    /// Effects that caused this notification, outermost first.
    pub cause: Vec<EffectId>,
}

#[derive(Debug)]
pub(crate) struct NotificationPass {
    pub mode: PassMode,
    /// Visited set: an effect is processed at most once per pass.
    pub executed: HashSet<EffectId>,
    /// Causal chain of the body currently running.
    pub chain: Vec<EffectId>,
    pub queue: VecDeque<Pending>,
    /// First cycle raised in this pass. Sticky, so a body swallowing the error
    /// cannot hide it from the caller.
    pub cycle: Option<CycleError>,
}

impl NotificationPass {
    pub fn new(mode: PassMode) -> Self {
        Self {
            mode,
            executed: HashSet::new(),
            chain: Vec::new(),
            queue: VecDeque::new(),
            cycle: None,
        }
    }

    pub fn seed(&mut self, effects: impl IntoIterator<Item = EffectId>) {
        self.queue.extend(effects.into_iter().map(|effect| Pending { effect, cause: Vec::new() }));
    }

    /// Queues `effect` once. If it is already pending, the new cause is merged
    /// into the pending one, so a seeded entry still carries the chain of any
    /// effect that re-notified it.
    pub fn enqueue(&mut self, effect: EffectId, cause: Vec<EffectId>) {
        match self.queue.iter_mut().find(|p| p.effect == effect) {
            Some(pending) => {
                for ancestor in cause {
                    if !pending.cause.contains(&ancestor) {
                        pending.cause.push(ancestor);
                    }
                }
            }
            None => self.queue.push_back(Pending { effect, cause }),
        }
    }

    pub fn is_in_flight(&self, effect: EffectId) -> bool {
        self.chain.contains(&effect)
    }
}
