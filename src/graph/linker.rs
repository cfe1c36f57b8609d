//! linker.rs
//! Resolves parsed declarations into an immutable `Program`.

use super::effect::{Effect, EffectDecl};
use super::error::{LinkIssue, StaticLinkError};
use super::storage::GraphBuilder;
use crate::analysis::topology;
use crate::config::EngineConfig;
use crate::program::Program;
use crate::rules::{CompiledValidator, RuleBlock, RuleCompiler, RuleRef, Verdict};
use crate::store::{EffectId, StateId, StateRegistry, Value, ValueType};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Collects declarations from the host, then links them once.
#[derive(Default)]
pub struct ProgramBuilder {
    registry: StateRegistry,
    rules: Vec<RuleBlock>,
    effects: Vec<EffectDecl>,
}

impl ProgramBuilder {
    pub fn new() -> Self { Self::default() }

    /// Declares a state and returns its handle right away, so effect bodies can capture it.
    pub fn declare_state(&mut self, name: &str, ty: ValueType, initial: impl Into<Value>) -> StateId {
        self.registry.add_state(name, ty, initial.into())
    }

    pub fn declare_rules(&mut self, block: RuleBlock) -> &mut Self {
        self.rules.push(block);
        self
    }

    /// Effect ids follow declaration order.
    pub fn declare_effect(&mut self, decl: EffectDecl) -> EffectId {
        let id = EffectId::new(self.effects.len());
        self.effects.push(decl);
        id
    }

    pub fn state(&self, name: &str) -> Option<StateId> {
        self.registry.lookup(name)
    }

    pub fn link(self) -> Result<Program, StaticLinkError> {
        self.link_with(&EngineConfig::default())
    }

    /// Compiles rules, links effects and freezes the dependency graph.
    ///
    /// Every issue found is reported in one `StaticLinkError`.
    pub fn link_with(self, config: &EngineConfig) -> Result<Program, StaticLinkError> {
        let ProgramBuilder { registry, rules, effects: decls } = self;
        let mut issues: Vec<LinkIssue> = registry
            .duplicates()
            .iter()
            .map(|name| LinkIssue::DuplicateState { name: name.clone() })
            .collect();

        // 1. Rules
        let validators = match RuleCompiler::new(&registry).compile(rules) {
            Ok(v) => Some(v),
            Err(mut rule_issues) => {
                issues.append(&mut rule_issues);
                None
            }
        };

        if config.validate_initial_values {
            if let Some(validators) = &validators {
                issues.extend(check_initial_values(&registry, validators));
            }
        }

        // 2. Effects + graph
        let linker = EffectLinker { registry: &registry, validators: validators.as_deref() };
        let mut graph = GraphBuilder::new(registry.count());
        let mut used_names = HashSet::new();
        let mut effects = Vec::with_capacity(decls.len());

        for (i, decl) in decls.into_iter().enumerate() {
            let id = EffectId::new(i);
            match linker.link(id, decl, &mut used_names) {
                Ok(effect) => {
                    graph.register(id, effect.triggers());
                    effects.push(effect);
                }
                Err(mut effect_issues) => issues.append(&mut effect_issues),
            }
        }

        let validators = match validators {
            Some(v) if issues.is_empty() => v,
            _ => return Err(StaticLinkError { issues }),
        };

        let graph = graph.freeze();
        let report = if config.analyze_cycles {
            topology::analyze(&effects, &graph)
        } else {
            topology::LinkReport::default()
        };
        for cycle in &report.potential_cycles {
            let names: Vec<&str> = cycle.iter().map(|id| effects[id.index()].name()).collect();
            warn!(effects = ?names, "declared writes form a potential effect cycle");
        }

        debug!(
            states = registry.count(),
            effects = effects.len(),
            edges = graph.edge_count(),
            "program linked"
        );
        Ok(Program::new(registry, validators, effects, graph, report))
    }
}

struct EffectLinker<'a> {
    registry: &'a StateRegistry,
    validators: Option<&'a [CompiledValidator]>,
}

impl<'a> EffectLinker<'a> {
    fn link(&self, id: EffectId, decl: EffectDecl, used_names: &mut HashSet<String>) -> Result<Effect, Vec<LinkIssue>> {
        let name = unique_name(decl.name.unwrap_or_else(|| format!("effect_{}", id.index())), used_names);
        let mut issues = Vec::new();

        if decl.triggers.is_empty() {
            issues.push(LinkIssue::EmptyTriggers { effect: name.clone() });
        }

        let triggers: SmallVec<[StateId; 4]> = self.resolve(&decl.triggers, &mut issues, |state| {
            LinkIssue::UndeclaredTrigger { effect: name.clone(), state }
        });
        let context: SmallVec<[StateId; 2]> = self.resolve(&decl.context, &mut issues, |state| {
            LinkIssue::UndeclaredContext { effect: name.clone(), state }
        });
        let writes: SmallVec<[StateId; 2]> = self.resolve(&decl.writes, &mut issues, |state| {
            LinkIssue::UndeclaredWrite { effect: name.clone(), state }
        });

        if !issues.is_empty() {
            return Err(issues);
        }

        // Set union of the triggers' rules, ordered by (state, slot).
        let inherited: Box<[RuleRef]> = match self.validators {
            Some(validators) => triggers
                .iter()
                .flat_map(|s| validators[s.index()].rule_refs())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            None => Box::default(),
        };

        Ok(Effect {
            id,
            name,
            triggers,
            context,
            writes,
            inherited,
            guard: decl.guard,
            body: decl.body,
            fallback: decl.fallback,
        })
    }

    /// Resolves names to handles, dropping repeats while keeping first-seen order.
    fn resolve<A: smallvec::Array<Item = StateId>>(
        &self,
        names: &[String],
        issues: &mut Vec<LinkIssue>,
        undeclared: impl Fn(String) -> LinkIssue,
    ) -> SmallVec<A> {
        let mut out = SmallVec::new();
        for name in names {
            match self.registry.lookup(name) {
                Some(id) if !out.contains(&id) => out.push(id),
                Some(_) => {}
                None => issues.push(undeclared(name.clone())),
            }
        }
        out
    }
}

// --- Unique Name Enforcement ---
fn unique_name(original: String, used: &mut HashSet<String>) -> String {
    let mut candidate = original.clone();
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", original, counter);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn check_initial_values(registry: &StateRegistry, validators: &[CompiledValidator]) -> Vec<LinkIssue> {
    validators
        .iter()
        .zip(&registry.initial)
        .filter_map(|(validator, initial)| match validator.validate(initial) {
            Verdict::Accept => None,
            Verdict::Reject(reason) => Some(LinkIssue::InitialValueRejected {
                state: registry.name(validator.state()).to_string(),
                reason,
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSlot;

    fn noop() -> EffectDecl {
        EffectDecl::new(Vec::<String>::new(), |_| Ok(()))
    }

    fn on(triggers: &[&str]) -> EffectDecl {
        EffectDecl::new(triggers.iter().copied(), |_| Ok(()))
    }

    #[test]
    fn test_empty_trigger_list_is_a_link_error() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("x", ValueType::Int, 0);
        builder.declare_effect(noop().named("orphan"));

        let err = builder.link().unwrap_err();
        assert_eq!(err.issues, vec![LinkIssue::EmptyTriggers { effect: "orphan".into() }]);
        assert!(err.to_string().contains("declares no triggers"));
    }

    #[test]
    fn test_undeclared_names_are_all_reported() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("x", ValueType::Int, 0);
        builder.declare_effect(on(&["x", "ghost"]).context(["shadow"]).writes(["void"]).named("e"));
        builder.declare_rules(RuleBlock::new("phantom"));

        let err = builder.link().unwrap_err();
        assert!(err.contains(&LinkIssue::UndeclaredTrigger { effect: "e".into(), state: "ghost".into() }));
        assert!(err.contains(&LinkIssue::UndeclaredContext { effect: "e".into(), state: "shadow".into() }));
        assert!(err.contains(&LinkIssue::UndeclaredWrite { effect: "e".into(), state: "void".into() }));
        assert!(err.contains(&LinkIssue::UndeclaredRuleTarget { state: "phantom".into() }));
    }

    #[test]
    fn test_duplicate_state_is_reported() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("x", ValueType::Int, 0);
        builder.declare_state("x", ValueType::Int, 1);

        let err = builder.link().unwrap_err();
        assert_eq!(err.issues, vec![LinkIssue::DuplicateState { name: "x".into() }]);
    }

    #[test]
    fn test_inherited_rules_are_union_of_triggers() {
        let mut builder = ProgramBuilder::new();
        let a = builder.declare_state("a", ValueType::Int, 0);
        let b = builder.declare_state("b", ValueType::Any, 0);
        builder.declare_state("c", ValueType::Int, 0);
        builder.declare_rules(RuleBlock::new("a").reject_when(|v| v.as_int() == Some(-1)));
        builder.declare_rules(RuleBlock::new("b").reject_when(|_| false).reject_when(|_| false));
        builder.declare_effect(on(&["b", "a", "b"]));

        let program = builder.link().unwrap();
        let effect = program.effect(EffectId(0)).unwrap();

        assert_eq!(effect.triggers(), &[b, a]);
        let refs: Vec<_> = effect.inherited_rules().iter().map(|r| (r.state, r.slot)).collect();
        assert_eq!(
            refs,
            vec![
                (a, RuleSlot::DeclaredType),
                (a, RuleSlot::Clause(0)),
                (b, RuleSlot::Clause(0)),
                (b, RuleSlot::Clause(1)),
            ]
        );
    }

    #[test]
    fn test_graph_registration_follows_declaration_order() {
        let mut builder = ProgramBuilder::new();
        let x = builder.declare_state("x", ValueType::Any, 0);
        let first = builder.declare_effect(on(&["x"]));
        let second = builder.declare_effect(on(&["x"]));
        let third = builder.declare_effect(on(&["x"]));

        let program = builder.link().unwrap();
        assert_eq!(program.dependents(x), &[first, second, third]);
    }

    #[test]
    fn test_effect_names_are_made_unique() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("x", ValueType::Any, 0);
        builder.declare_effect(on(&["x"]).named("log"));
        builder.declare_effect(on(&["x"]).named("log"));
        builder.declare_effect(on(&["x"]));

        let program = builder.link().unwrap();
        let names: Vec<_> = program.effects().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["log", "log_1", "effect_2"]);
    }

    #[test]
    fn test_initial_value_must_satisfy_rules() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("hp", ValueType::Int, 150);
        builder.declare_rules(RuleBlock::new("hp").reject_when(|v| v.as_int().is_some_and(|h| h > 100)));

        let err = builder.link().unwrap_err();
        assert_eq!(
            err.issues,
            vec![LinkIssue::InitialValueRejected {
                state: "hp".into(),
                reason: crate::rules::RejectReason::Clause(0)
            }]
        );
    }

    #[test]
    fn test_initial_value_check_can_be_disabled() {
        let mut builder = ProgramBuilder::new();
        builder.declare_state("hp", ValueType::Int, 150);
        builder.declare_rules(RuleBlock::new("hp").reject_when(|v| v.as_int().is_some_and(|h| h > 100)));

        let config = EngineConfig { validate_initial_values: false, ..EngineConfig::default() };
        assert!(builder.link_with(&config).is_ok());
    }
}
