use super::clause::{RejectHandler, RuleBlock};
use super::validator::{CompiledClause, CompiledValidator};
use crate::graph::LinkIssue;
use crate::store::StateRegistry;

pub struct RuleCompiler<'a> {
    registry: &'a StateRegistry,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(registry: &'a StateRegistry) -> Self {
        Self { registry }
    }

    /// Compiles rule blocks into one validator per declared state, indexed by `StateId`.
    ///
    /// **Resolution:**
    /// Every clause leaves here holding a concrete handler reference: its own
    /// handler if it declared one, else the state fallback, else nothing
    /// (silent rejection). The runtime never looks handlers up by name.
    ///
    /// Blocks targeting the same state append their clauses in declaration order.
    pub fn compile(&self, blocks: Vec<RuleBlock>) -> Result<Vec<CompiledValidator>, Vec<LinkIssue>> {
        let count = self.registry.count();
        let mut clauses: Vec<Vec<_>> = (0..count).map(|_| Vec::new()).collect();
        let mut fallbacks: Vec<Option<RejectHandler>> = vec![None; count];
        let mut issues = Vec::new();

        // 1. Group clauses by target state
        for block in blocks {
            let Some(state) = self.registry.lookup(&block.state) else {
                issues.push(LinkIssue::UndeclaredRuleTarget { state: block.state });
                continue;
            };
            let idx = state.index();
            if let Some(fallback) = block.fallback {
                if fallbacks[idx].is_some() {
                    issues.push(LinkIssue::DuplicateFallback { state: block.state.clone() });
                } else {
                    fallbacks[idx] = Some(fallback);
                }
            }
            clauses[idx].extend(block.clauses);
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        // 2. Resolve handlers
        let validators = clauses
            .into_iter()
            .zip(fallbacks)
            .enumerate()
            .map(|(i, (declared, fallback))| {
                let compiled: Box<[CompiledClause]> = declared
                    .into_iter()
                    .map(|clause| CompiledClause {
                        condition: clause.condition,
                        on_reject: clause.handler.or_else(|| fallback.clone()),
                    })
                    .collect();

                CompiledValidator {
                    state: crate::store::StateId::new(i),
                    name: self.registry.names[i].clone(),
                    declared: self.registry.types[i],
                    clauses: compiled,
                    fallback,
                }
            })
            .collect();

        Ok(validators)
    }
}
