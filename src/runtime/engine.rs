//! A synchronous, single-threaded execution engine.
//!
//! Every mutation goes through the same protocol:
//! `Requested -> RuleChecked -> {Committed | Rejected} -> Notifying -> Done`.
//! A rejected mutation never notifies. A committed one notifies the state's
//! dependents in declaration order, unless a batch scope defers it.

use super::batch::Batch;
use super::error::{CycleError, RuntimeError};
use super::pass::{NotificationPass, PassMode};
use super::scope::{EffectScope, EffectView};
use super::stats::RuntimeStats;
use crate::config::{EngineConfig, GuardPolicy};
use crate::graph::{Effect, FailureCause};
use crate::program::Program;
use crate::rules::{Rejection, Verdict};
use crate::store::{EffectId, StateId, StateStore, Value};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Result of a single setState call.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// Committed and, outside a batch, fully notified.
    Committed,
    /// Committed inside a batch scope; notification happens when the scope closes.
    Deferred,
    /// Refused by the state's validator. The value is unchanged.
    Rejected(Rejection),
}

impl SetOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SetOutcome::Committed | SetOutcome::Deferred)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SetOutcome::Rejected(_))
    }
}

/// Current value of every state, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(pub BTreeMap<String, Value>);

pub struct Runtime {
    pub(super) program: Arc<Program>,
    pub(super) store: StateStore,
    /// Trigger values each effect saw when it was last evaluated.
    observed: Vec<SmallVec<[Value; 4]>>,
    config: EngineConfig,
    pub(super) batch: Option<Batch>,
    pub(super) pass: Option<NotificationPass>,
    pub(super) stats: RuntimeStats,
}

impl Runtime {
    pub fn new(program: Arc<Program>) -> Self {
        Self::with_config(program, EngineConfig::default())
    }

    pub fn with_config(program: Arc<Program>, config: EngineConfig) -> Self {
        let store = StateStore::from_initial(program.initial_values());
        let observed = program
            .effects()
            .iter()
            .map(|e| e.triggers().iter().map(|&s| store.get(s).clone()).collect())
            .collect();

        Self {
            program,
            store,
            observed,
            config,
            batch: None,
            pass: None,
            stats: RuntimeStats::default(),
        }
    }

    pub fn program(&self) -> &Arc<Program> { &self.program }
    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn stats(&self) -> &RuntimeStats { &self.stats }
    pub fn reset_stats(&mut self) { self.stats = RuntimeStats::default(); }
    pub fn in_batch(&self) -> bool { self.batch.is_some() }

    pub(crate) fn store(&self) -> &StateStore { &self.store }

    pub fn value(&self, state: StateId) -> Option<&Value> {
        (state.index() < self.store.len()).then(|| self.store.get(state))
    }

    pub fn previous(&self, state: StateId) -> Option<&Value> {
        (state.index() < self.store.len()).then(|| self.store.previous(state))
    }

    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.program.state_id(name).map(|s| self.store.get(s))
    }

    pub fn values(&self) -> &[Value] {
        self.store.values()
    }

    pub fn snapshot(&self) -> Snapshot {
        let values = self
            .store
            .values()
            .iter()
            .enumerate()
            .map(|(i, v)| (self.program.name_of(StateId::new(i)).to_string(), v.clone()))
            .collect();
        Snapshot(values)
    }

    /// The setState primitive.
    ///
    /// Outside any pass or batch this runs the full protocol before returning.
    /// Called from an effect body, the commit joins the pass already in flight.
    /// Inside `run_batch`, notification is deferred to the end of the scope.
    ///
    /// A rejection is an `Ok(SetOutcome::Rejected(..))`, not an error.
    pub fn set_state(&mut self, state: StateId, value: impl Into<Value>) -> Result<SetOutcome, RuntimeError> {
        self.program.check_state(state)?;

        if let Some(rejection) = self.apply(state, value.into()) {
            return Ok(SetOutcome::Rejected(rejection));
        }

        if self.pass.is_some() {
            self.notify(state)?;
            return Ok(SetOutcome::Committed);
        }

        if let Some(batch) = self.batch.as_mut() {
            batch.record(state);
            return Ok(SetOutcome::Deferred);
        }

        self.contain_unwind(|rt| {
            rt.begin_pass(PassMode::DepthFirst);
            let result = rt.notify(state);
            rt.finish_pass(result)
        })?;
        Ok(SetOutcome::Committed)
    }

    /// Runs a top-level operation. If a body or guard panics, the open batch
    /// and pass are dropped before the panic resumes, so the runtime stays usable.
    pub(super) fn contain_unwind<R>(&mut self, op: impl FnOnce(&mut Runtime) -> R) -> R {
        match panic::catch_unwind(AssertUnwindSafe(|| op(self))) {
            Ok(out) => out,
            Err(payload) => {
                warn!(in_batch = self.batch.is_some(), in_pass = self.pass.is_some(), "panic during mutation, discarding open scope");
                self.batch = None;
                self.pass = None;
                panic::resume_unwind(payload)
            }
        }
    }

    /// RuleChecked -> Committed | Rejected. Returns the rejection, if any.
    fn apply(&mut self, state: StateId, candidate: Value) -> Option<Rejection> {
        let validator = self.program.rules_of(state);
        match validator.validate(&candidate) {
            Verdict::Accept => {
                trace!(state = self.program.name_of(state), value = %candidate, "committed");
                self.store.commit(state, candidate);
                self.stats.commits += 1;
                None
            }
            Verdict::Reject(reason) => {
                let rejection = validator.rejection(candidate, self.store.get(state).clone(), reason);
                debug!(
                    state = %rejection.state_name,
                    candidate = %rejection.candidate,
                    reason = %rejection.reason,
                    "mutation rejected"
                );
                self.stats.rejections += 1;
                validator.handle(&rejection);
                Some(rejection)
            }
        }
    }

    pub(super) fn begin_pass(&mut self, mode: PassMode) -> &mut NotificationPass {
        self.stats.passes += 1;
        self.pass.insert(NotificationPass::new(mode))
    }

    /// Drains queued work, closes the pass and surfaces any cycle it recorded.
    pub(super) fn finish_pass(&mut self, result: Result<(), RuntimeError>) -> Result<(), RuntimeError> {
        let result = result.and_then(|()| self.drain());
        let cycle = self.pass.take().and_then(|p| p.cycle);
        match (result, cycle) {
            (Err(err), _) => Err(err),
            (Ok(()), Some(cycle)) => Err(cycle.into()),
            (Ok(()), None) => Ok(()),
        }
    }

    fn drain(&mut self) -> Result<(), RuntimeError> {
        while let Some(pending) = self.pass.as_mut().and_then(|p| p.queue.pop_front()) {
            let done = self.pass.as_ref().is_some_and(|p| p.executed.contains(&pending.effect));
            if done {
                self.stats.dedup_skips += 1;
                continue;
            }
            self.run_effect(pending.effect, pending.cause)?;
        }
        Ok(())
    }

    /// Notifying: walks the dependents of `state` in declaration order.
    fn notify(&mut self, state: StateId) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);

        for &effect in program.dependents(state) {
            // A write-back of what the effect already observed re-triggers nothing.
            if self.triggers_unchanged(program.effect_at(effect)) {
                self.stats.noop_skips += 1;
                continue;
            }
            let Some(pass) = self.pass.as_mut() else { break };

            if pass.is_in_flight(effect) {
                let cycle = CycleError::new(&program, &pass.chain, effect, state);
                warn!(chain = %cycle.names.join(" -> "), state = %cycle.state_name, "effect cycle detected");
                self.stats.cycles += 1;
                pass.cycle.get_or_insert_with(|| cycle.clone());
                return Err(cycle.into());
            }
            if pass.executed.contains(&effect) {
                self.stats.dedup_skips += 1;
                continue;
            }

            let cause = pass.chain.clone();
            let mode = pass.mode;
            match mode {
                PassMode::DepthFirst => self.run_effect(effect, cause)?,
                PassMode::Queued => pass.enqueue(effect, cause),
            }
        }
        Ok(())
    }

    fn triggers_unchanged(&self, effect: &Effect) -> bool {
        let observed = &self.observed[effect.id().index()];
        observed.iter().eq(effect.triggers().iter().map(|&s| self.store.get(s)))
    }

    fn run_effect(&mut self, id: EffectId, cause: Vec<EffectId>) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        let effect = program.effect_at(id);

        // a. Skip if no trigger moved since this effect last looked.
        if self.triggers_unchanged(effect) {
            self.stats.noop_skips += 1;
            trace!(effect = effect.name(), "triggers unchanged, skipping");
            return Ok(());
        }
        self.observed[id.index()] = effect.triggers().iter().map(|&s| self.store.get(s).clone()).collect();

        // b. Inherited rules against current trigger values.
        if let Some(rejection) = self.inherited_violation(&program, effect) {
            self.stats.rule_fallbacks += 1;
            debug!(effect = effect.name(), state = %rejection.state_name, "inherited rule violated");
            self.run_rule_fallback(&program, effect, rejection);
            return Ok(());
        }

        // c. Guard
        if let Some(guard) = &effect.guard {
            if !guard(&EffectView::new(self, effect)) {
                self.stats.guard_skips += 1;
                trace!(effect = effect.name(), "guard declined");
                if self.config.guard_policy == GuardPolicy::Fallback {
                    effect.run_fallback(FailureCause::GuardDeclined);
                }
                return Ok(());
            }
        }

        // d. Body, with this effect pushed onto the causal chain. Only a body
        // that actually runs counts as executed for the rest of the pass.
        let mut chain = cause;
        chain.push(id);
        let saved = self.pass.as_mut().map(|p| {
            p.executed.insert(id);
            mem::replace(&mut p.chain, chain)
        });
        self.stats.effects_run += 1;
        trace!(effect = effect.name(), "running effect");

        let result = (effect.body)(&mut EffectScope::new(self, effect));

        let sticky = match self.pass.as_mut() {
            Some(pass) => {
                if let Some(saved) = saved {
                    pass.chain = saved;
                }
                pass.cycle.clone()
            }
            None => None,
        };
        if let Some(cycle) = sticky {
            return Err(cycle.into());
        }

        match result {
            Ok(()) => Ok(()),
            Err(RuntimeError::Cycle(cycle)) => Err(cycle.into()),
            Err(err) => {
                self.stats.body_failures += 1;
                warn!(effect = effect.name(), error = %err, "effect body failed");
                effect.run_fallback(FailureCause::BodyFailed(err));
                Ok(())
            }
        }
    }

    fn inherited_violation(&self, program: &Program, effect: &Effect) -> Option<Rejection> {
        effect.inherited_rules().iter().find_map(|rule| {
            let value = self.store.get(rule.state);
            let validator = program.rules_of(rule.state);
            validator
                .check(rule.slot, value)
                .map(|reason| validator.rejection(value.clone(), value.clone(), reason))
        })
    }

    /// Effect fallback first; without one, the violated rule's own handler.
    fn run_rule_fallback(&self, program: &Program, effect: &Effect, rejection: Rejection) {
        if effect.has_fallback() {
            effect.run_fallback(FailureCause::RuleViolated(rejection));
        } else {
            program.rules_of(rejection.state).handle(&rejection);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("values", &self.store.values())
            .field("in_batch", &self.batch.is_some())
            .field("in_pass", &self.pass.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardPolicy;
    use crate::graph::{EffectDecl, EffectFailure, ProgramBuilder};
    use crate::rules::{RejectReason, RuleBlock};
    use crate::store::ValueType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn push(log: &Log, line: impl Into<String>) {
        log.lock().unwrap().push(line.into());
    }

    fn runtime(builder: ProgramBuilder) -> Runtime {
        Runtime::new(Arc::new(builder.link().expect("link failed")))
    }

    #[test]
    fn test_health_rejection_runs_fallback_and_keeps_value() {
        let events = log();
        let mut b = ProgramBuilder::new();
        let health = b.declare_state("health", ValueType::Int, 100);
        let sink = Arc::clone(&events);
        b.declare_rules(
            RuleBlock::new("health")
                .reject_when(|v| v.as_int().map_or(true, |h| !(0..=100).contains(&h)))
                .fallback(move |r| push(&sink, format!("F({})", r.candidate))),
        );
        let mut rt = runtime(b);

        let outcome = rt.set_state(health, 150).unwrap();

        assert!(outcome.is_rejected());
        assert_eq!(rt.value(health), Some(&Value::Int(100)));
        assert_eq!(entries(&events), vec!["F(150)"]);
        assert_eq!(rt.stats().rejections, 1);
        assert_eq!(rt.stats().passes, 0);
    }

    #[test]
    fn test_commit_shifts_previous_value() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 1);
        let mut rt = runtime(b);

        assert_eq!(rt.set_state(x, 2).unwrap(), SetOutcome::Committed);
        assert_eq!(rt.value(x), Some(&Value::Int(2)));
        assert_eq!(rt.previous(x), Some(&Value::Int(1)));
        assert_eq!(rt.value_of("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_type_mismatch_is_rejected_like_a_rule() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 1);
        let mut rt = runtime(b);

        match rt.set_state(x, "one").unwrap() {
            SetOutcome::Rejected(r) => {
                assert_eq!(r.reason, RejectReason::TypeMismatch { expected: ValueType::Int, found: "str" });
                assert_eq!(r.current, Value::Int(1));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unknown_state_handle_is_an_error() {
        let mut b = ProgramBuilder::new();
        b.declare_state("x", ValueType::Int, 1);
        let mut rt = runtime(b);

        assert_eq!(rt.set_state(StateId(9), 1), Err(RuntimeError::UnknownState(StateId(9))));
    }

    #[test]
    fn test_notification_order_is_declaration_order() {
        let events = log();
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&events);
            b.declare_effect(EffectDecl::new(["x"], move |_| {
                push(&sink, tag);
                Ok(())
            }));
        }
        let mut rt = runtime(b);

        rt.set_state(x, 1).unwrap();
        assert_eq!(entries(&events), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_water_and_sun_guard_single_mutation() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut b = ProgramBuilder::new();
        let water = b.declare_state("water", ValueType::Int, 50);
        let sun = b.declare_state("sun", ValueType::Int, 70);
        let counter = Arc::clone(&fired);
        b.declare_effect(
            EffectDecl::new(["water", "sun"], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .when(move |v| {
                let w = v.get(water).ok().and_then(Value::as_int).unwrap_or(0);
                let s = v.get(sun).ok().and_then(Value::as_int).unwrap_or(0);
                w > 70 && s > 80
            }),
        );
        let mut rt = runtime(b);

        rt.set_state(water, 80).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(rt.stats().guard_skips, 1);

        rt.set_state(sun, 90).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_triggers_skip_effect() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let counter = Arc::clone(&fired);
        b.declare_effect(EffectDecl::new(["x"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let mut rt = runtime(b);

        rt.set_state(x, 0).unwrap();
        rt.set_state(x, 5).unwrap();
        rt.set_state(x, 5).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(rt.stats().noop_skips, 2);
        assert_eq!(rt.stats().commits, 3);
    }

    #[test]
    fn test_body_writes_cascade_depth_first() {
        let events = log();
        let mut b = ProgramBuilder::new();
        let a = b.declare_state("a", ValueType::Int, 0);
        let c = b.declare_state("c", ValueType::Int, 0);
        let sink = Arc::clone(&events);
        b.declare_effect(EffectDecl::new(["a"], move |scope| {
            push(&sink, "double:start");
            let next = scope.trigger(0).and_then(Value::as_int).unwrap_or(0) * 2;
            scope.set(c, next)?;
            push(&sink, "double:end");
            Ok(())
        }));
        let sink = Arc::clone(&events);
        b.declare_effect(EffectDecl::new(["c"], move |scope| {
            push(&sink, format!("report:{}", scope.get(c)?));
            Ok(())
        }));
        let mut rt = runtime(b);

        rt.set_state(a, 21).unwrap();

        assert_eq!(rt.value(c), Some(&Value::Int(42)));
        assert_eq!(entries(&events), vec!["double:start", "report:42", "double:end"]);
    }

    #[test]
    fn test_effect_runs_once_per_pass() {
        // {a, b} -> E0; a -> E1 (writes b). E0 runs first for a, then is skipped when E1 changes b.
        let fired = Arc::new(AtomicUsize::new(0));
        let mut b = ProgramBuilder::new();
        let a = b.declare_state("a", ValueType::Int, 0);
        let bb = b.declare_state("b", ValueType::Int, 0);
        let counter = Arc::clone(&fired);
        b.declare_effect(EffectDecl::new(["a", "b"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        b.declare_effect(EffectDecl::new(["a"], move |scope| {
            scope.set(bb, 1)?;
            Ok(())
        }));
        let mut rt = runtime(b);

        rt.set_state(a, 1).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(rt.stats().dedup_skips, 1);
        assert_eq!(rt.value(bb), Some(&Value::Int(1)));
    }

    #[test]
    fn test_writing_back_observed_value_is_not_a_cycle() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        b.declare_effect(
            EffectDecl::new(["x"], move |scope| {
                let v = scope.get(x)?.as_int().unwrap_or(0);
                scope.set(x, v.min(10)).map(|_| ())
            })
            .named("clamp"),
        );
        let mut rt = runtime(b);

        assert_eq!(rt.set_state(x, 5).unwrap(), SetOutcome::Committed);
        assert_eq!(rt.value(x), Some(&Value::Int(5)));
        assert_eq!(rt.stats().cycles, 0);

        // Clamping to a new value re-notifies the clamp itself.
        assert!(rt.set_state(x, 50).unwrap_err().is_cycle());
        assert_eq!(rt.value(x), Some(&Value::Int(10)));
    }

    #[test]
    fn test_panicking_body_leaves_runtime_usable() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let counter = Arc::clone(&fired);
        b.declare_effect(EffectDecl::new(["x"], move |scope| {
            if scope.get(x)?.as_int() == Some(1) {
                panic!("unexpected input");
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let mut rt = runtime(b);

        let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = rt.set_state(x, 1);
        }));
        assert!(caught.is_err());
        assert_eq!(rt.value(x), Some(&Value::Int(1)));

        assert_eq!(rt.set_state(x, 2).unwrap(), SetOutcome::Committed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_retriggering_effect_raises_cycle() {
        let mut b = ProgramBuilder::new();
        let n = b.declare_state("n", ValueType::Int, 0);
        b.declare_effect(
            EffectDecl::new(["n"], move |scope| {
                let next = scope.get(n)?.as_int().unwrap_or(0) + 1;
                scope.set(n, next)?;
                Ok(())
            })
            .named("increment"),
        );
        let mut rt = runtime(b);

        let err = rt.set_state(n, 1).unwrap_err();
        match err {
            RuntimeError::Cycle(cycle) => {
                assert_eq!(cycle.names, vec!["increment", "increment"]);
                assert_eq!(cycle.state_name, "n");
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        // Both commits happened before the guard tripped.
        assert_eq!(rt.value(n), Some(&Value::Int(2)));
        assert_eq!(rt.stats().cycles, 1);
    }

    #[test]
    fn test_two_effect_cycle_reports_chain() {
        let mut b = ProgramBuilder::new();
        let ping = b.declare_state("ping", ValueType::Int, 0);
        let pong = b.declare_state("pong", ValueType::Int, 0);
        b.declare_effect(
            EffectDecl::new(["ping"], move |scope| {
                let v = scope.get(ping)?.as_int().unwrap_or(0);
                scope.set(pong, v + 1).map(|_| ())
            })
            .named("to_pong"),
        );
        b.declare_effect(
            EffectDecl::new(["pong"], move |scope| {
                let v = scope.get(pong)?.as_int().unwrap_or(0);
                scope.set(ping, v + 1).map(|_| ())
            })
            .named("to_ping"),
        );
        let mut rt = runtime(b);

        let err = rt.set_state(ping, 1).unwrap_err();
        let RuntimeError::Cycle(cycle) = err else { panic!("expected cycle") };
        assert_eq!(cycle.names, vec!["to_pong", "to_ping", "to_pong"]);
        assert_eq!(cycle.to_string(), "effect cycle through state 'ping': to_pong -> to_ping -> to_pong");
    }

    #[test]
    fn test_swallowed_cycle_is_still_surfaced() {
        let mut b = ProgramBuilder::new();
        let n = b.declare_state("n", ValueType::Int, 0);
        b.declare_effect(EffectDecl::new(["n"], move |scope| {
            let _ = scope.set(n, 100);
            Ok(())
        }));
        let mut rt = runtime(b);

        assert!(rt.set_state(n, 1).unwrap_err().is_cycle());
    }

    #[test]
    fn test_rejected_write_inside_body_is_not_an_error() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let y = b.declare_state("y", ValueType::Int, 0);
        b.declare_rules(RuleBlock::new("y").reject_when(|v| v.as_int().is_some_and(|n| n > 10)));
        b.declare_effect(EffectDecl::new(["x"], move |scope| {
            let outcome = scope.set(y, 99)?;
            assert!(outcome.is_rejected());
            Ok(())
        }));
        let mut rt = runtime(b);

        assert_eq!(rt.set_state(x, 1).unwrap(), SetOutcome::Committed);
        assert_eq!(rt.value(y), Some(&Value::Int(0)));
    }

    #[test]
    fn test_body_failure_runs_effect_fallback() {
        let events = log();
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let sink = Arc::clone(&events);
        b.declare_effect(
            EffectDecl::new(["x"], |scope| Err(scope.fail("disk full")))
                .named("save")
                .fallback(move |f: &EffectFailure| push(&sink, format!("{}: {:?}", f.effect_name, f.cause))),
        );
        let mut rt = runtime(b);

        assert!(rt.set_state(x, 1).is_ok());
        let lines = entries(&events);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("save: BodyFailed"));
        assert!(lines[0].contains("disk full"));
        assert_eq!(rt.stats().body_failures, 1);
    }

    #[test]
    fn test_undeclared_read_fails_the_body() {
        let failures = log();
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let secret = b.declare_state("secret", ValueType::Int, 7);
        let sink = Arc::clone(&failures);
        b.declare_effect(
            EffectDecl::new(["x"], move |scope| scope.get(secret).map(|_| ()))
                .fallback(move |f| push(&sink, format!("{:?}", f.cause))),
        );
        let mut rt = runtime(b);

        rt.set_state(x, 1).unwrap();
        let lines = entries(&failures);
        assert!(lines[0].contains("UndeclaredRead"));
        assert!(lines[0].contains("secret"));
    }

    #[test]
    fn test_context_states_are_readable_but_not_tracked() {
        let seen = log();
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let rate = b.declare_state("rate", ValueType::Int, 3);
        let sink = Arc::clone(&seen);
        b.declare_effect(
            EffectDecl::new(["x"], move |scope| {
                let product = scope.get(x)?.as_int().unwrap_or(0) * scope.get(rate)?.as_int().unwrap_or(0);
                push(&sink, product.to_string());
                Ok(())
            })
            .context(["rate"]),
        );
        let mut rt = runtime(b);

        rt.set_state(rate, 10).unwrap();
        assert!(entries(&seen).is_empty());

        rt.set_state(x, 2).unwrap();
        assert_eq!(entries(&seen), vec!["20"]);
    }

    #[test]
    fn test_guard_policy_fallback_reports_declined_guard() {
        let failures = log();
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 0);
        let sink = Arc::clone(&failures);
        b.declare_effect(
            EffectDecl::new(["x"], |_| Ok(()))
                .when(|_| false)
                .fallback(move |f| push(&sink, format!("{:?}", f.cause))),
        );
        let program = Arc::new(b.link().unwrap());

        let mut silent = Runtime::new(Arc::clone(&program));
        silent.set_state(x, 1).unwrap();
        assert!(entries(&failures).is_empty());

        let config = EngineConfig { guard_policy: GuardPolicy::Fallback, ..EngineConfig::default() };
        let mut loud = Runtime::with_config(program, config);
        loud.set_state(x, 1).unwrap();
        assert_eq!(entries(&failures), vec!["GuardDeclined"]);
    }

    #[test]
    fn test_inherited_rule_violation_blocks_body() {
        // The initial value violates the rule; linking is told not to check it.
        let events = log();
        let mut b = ProgramBuilder::new();
        let hp = b.declare_state("hp", ValueType::Int, 500);
        let tick = b.declare_state("tick", ValueType::Int, 0);
        let sink = Arc::clone(&events);
        b.declare_rules(
            RuleBlock::new("hp")
                .reject_when(|v| v.as_int().is_some_and(|h| h > 100))
                .fallback(move |r| push(&sink, format!("hp-fallback:{}", r.current))),
        );
        let sink = Arc::clone(&events);
        b.declare_effect(EffectDecl::new(["hp", "tick"], move |_| {
            push(&sink, "body");
            Ok(())
        }));
        let config = EngineConfig { validate_initial_values: false, ..EngineConfig::default() };
        let program = Arc::new(b.link_with(&config).unwrap());
        let mut rt = Runtime::with_config(program, config);

        rt.set_state(tick, 1).unwrap();
        assert_eq!(entries(&events), vec!["hp-fallback:500"]);
        assert_eq!(rt.stats().rule_fallbacks, 1);

        rt.set_state(hp, 50).unwrap();
        assert_eq!(entries(&events), vec!["hp-fallback:500", "body"]);
        assert_eq!(rt.value(hp), Some(&Value::Int(50)));
    }

    #[test]
    fn test_snapshot_serializes_by_name() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_state("x", ValueType::Int, 1);
        b.declare_state("name", ValueType::Str, "vigil");
        let mut rt = runtime(b);
        rt.set_state(x, 2).unwrap();

        let json = serde_json::to_string(&rt.snapshot()).unwrap();
        assert_eq!(json, r#"{"name":"vigil","x":2}"#);
    }
}
