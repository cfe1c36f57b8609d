use crate::graph::{DependencyGraph, Effect};
use crate::store::EffectId;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

/// Static findings attached to a linked program. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    /// Groups of effects whose declared writes can re-notify each other.
    /// Each group is sorted by declaration order.
    pub potential_cycles: Vec<Vec<EffectId>>,
}

/// Builds the effect -> effect graph implied by declared writes.
///
/// There is an edge `E1 -> E2` when `E1` declares a write to one of `E2`'s
/// triggers. Only effects that declare writes contribute edges; bodies are
/// opaque, so the runtime cycle guard remains the source of truth.
pub fn write_graph(effects: &[Effect], graph: &DependencyGraph) -> DiGraphMap<EffectId, ()> {
    let mut g = DiGraphMap::new();
    for effect in effects {
        g.add_node(effect.id());
        for &state in effect.writes() {
            for &dependent in graph.dependents(state) {
                g.add_edge(effect.id(), dependent, ());
            }
        }
    }
    g
}

/// Finds strongly connected components of the write graph that can loop:
/// any component with more than one effect, or an effect writing its own trigger.
pub fn analyze(effects: &[Effect], graph: &DependencyGraph) -> LinkReport {
    let g = write_graph(effects, graph);

    let mut potential_cycles: Vec<Vec<EffectId>> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || g.contains_edge(scc[0], scc[0]))
        .map(|mut scc| {
            scc.sort_unstable();
            scc
        })
        .collect();
    potential_cycles.sort();

    LinkReport { potential_cycles }
}
