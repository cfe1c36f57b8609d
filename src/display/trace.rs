use crate::analysis::LinkReport;
use crate::program::Program;
use crate::runtime::{CycleError, Runtime};
use crate::store::{EffectId, StateId, Value};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders what a commit to `state` would notify, following declared writes.
///
/// ```text
/// DEPENDENTS of state 'a':
/// --------------------------------------------------
/// [L1] a [1]
/// `--[L2] double (triggers: a) -> writes c
///    `--[L3] c [2]
///       `--[L4] report (triggers: c)
/// ```
pub fn format_dependents(runtime: &Runtime, state: StateId) -> String {
    let program = runtime.program();
    let mut tracer = Tracer {
        program,
        values: runtime.values(),
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    if let Some(name) = program.state_name(state) {
        let _ = writeln!(tracer.output, "DEPENDENTS of state '{}':", name);
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_state(state, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: Invalid state {:?}", state);
    }
    tracer.output
}

pub fn format_cycle(cycle: &CycleError) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "EFFECT CYCLE through state '{}':", cycle.state_name);
    let last = cycle.names.len().saturating_sub(1);
    for (i, name) in cycle.names.iter().enumerate() {
        let marker = if i == last { "  <- re-entered" } else { "" };
        let _ = writeln!(out, "  {: >2}. {}{}", i + 1, name, marker);
    }
    out
}

/// Lists the potential cycles `topology::analyze` found at link time.
pub fn format_link_report(program: &Program, report: &LinkReport) -> String {
    if report.potential_cycles.is_empty() {
        return "No potential effect cycles.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "Potential effect cycles: {}", report.potential_cycles.len());
    for group in &report.potential_cycles {
        let names: Vec<&str> = group.iter().map(|&e| program.effect_at(e).name()).collect();
        let _ = writeln!(out, "  - {{{}}}", names.join(", "));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    State(StateId),
    Effect(EffectId),
}

struct Tracer<'a> {
    program: &'a Program,
    values: &'a [Value],
    visited_at_level: HashMap<Node, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn seen(&mut self, node: Node, level: usize, prefix: &str) -> bool {
        if let Some(&first_seen) = self.visited_at_level.get(&node) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return true;
        }
        self.visited_at_level.insert(node, level);
        false
    }

    fn trace_state(&mut self, state: StateId, level: usize, prefix: &str) {
        if self.seen(Node::State(state), level, prefix) {
            return;
        }
        let name = self.program.name_of(state);
        let value = self.format_value(state);
        let _ = writeln!(self.output, "{}[L{}] {} {}", prefix, level, name, value);

        let stem = self.build_child_stem(prefix);
        let dependents = self.program.dependents(state);
        for (i, &effect) in dependents.iter().enumerate() {
            let connector = if i == dependents.len() - 1 { "`--" } else { "|--" };
            self.trace_effect(effect, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn trace_effect(&mut self, id: EffectId, level: usize, prefix: &str) {
        if self.seen(Node::Effect(id), level, prefix) {
            return;
        }
        let effect = self.program.effect_at(id);
        let triggers = self.names(effect.triggers());
        let mut line = format!("{}[L{}] {} (triggers: {})", prefix, level, effect.name(), triggers);
        if effect.is_guarded() {
            line.push_str(" [guarded]");
        }
        if !effect.writes().is_empty() {
            let _ = write!(line, " -> writes {}", self.names(effect.writes()));
        }
        let _ = writeln!(self.output, "{}", line);

        let stem = self.build_child_stem(prefix);
        let writes = effect.writes();
        for (i, &state) in writes.iter().enumerate() {
            let connector = if i == writes.len() - 1 { "`--" } else { "|--" };
            self.trace_state(state, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn names(&self, states: &[StateId]) -> String {
        states.iter().map(|&s| self.program.name_of(s)).collect::<Vec<_>>().join(", ")
    }

    fn format_value(&self, state: StateId) -> String {
        match self.values.get(state.index()) {
            Some(Value::Str(s)) => format!("[{:?}]", s),
            Some(Value::Float(f)) => format!("[{:.3}]", f),
            Some(v) => format!("[{}]", v),
            None => "[?]".to_string(),
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}
