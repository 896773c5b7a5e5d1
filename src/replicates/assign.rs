//! Assignment of one posterior sample into the model graph.
//!
//! For replicate `i`, every state-sample-eligible node reachable from the
//! likelihood is overwritten: the tree node from the reconstructed tree
//! sample, each parameter from its trace column (matched by identifier with
//! a truncate-before-first-dot fallback). The graph-wide recalculation sweep
//! runs once, after every assignment has landed, so the simulator never
//! observes an intermediate inconsistent state.

use crate::error::{AdequacyError, PpResult};
use crate::model::{GraphId, ModelGraph, StateValue};
use crate::posterior::{resolve_column, resolve_component, TraceTable};
use crate::tree::Tree;

/// Mutate `eligible` nodes of the graph to match trace row `row` and the
/// given reconstructed tree, then force a full recalculation.
pub fn assign_replicate(
    graph: &mut ModelGraph,
    eligible: &[GraphId],
    tree: &Tree,
    row: usize,
    trace: &TraceTable,
) -> PpResult<()> {
    enum Kind {
        Tree,
        Real(usize),
        Int,
    }

    let mut assigned_tree: Option<GraphId> = None;

    for &id in eligible {
        let kind = match graph.state_value(id) {
            Some(StateValue::Tree(_)) => Kind::Tree,
            Some(StateValue::Real(param)) => Kind::Real(param.dimension()),
            Some(StateValue::Int(_)) => Kind::Int,
            None => {
                return Err(AdequacyError::Validation(format!(
                    "eligible node '{}' carries no state",
                    graph.name(id)
                )));
            }
        };

        match kind {
            Kind::Tree => {
                if let Some(first) = assigned_tree {
                    return Err(AdequacyError::UnsupportedMultiTreeState {
                        first: graph.name(first).to_string(),
                        second: graph.name(id).to_string(),
                    });
                }
                graph.set_tree(id, tree)?;
                assigned_tree = Some(id);
            }
            Kind::Real(1) => {
                let name = graph.name(id).to_string();
                let value = resolve_column(trace, &name)?[row];
                graph.set_real_scalar(id, value)?;
            }
            Kind::Real(dimension) => {
                let name = graph.name(id).to_string();
                let mut values = Vec::with_capacity(dimension);
                for j in 1..=dimension {
                    values.push(resolve_component(trace, &name, j)?[row]);
                }
                for (j, value) in values.into_iter().enumerate() {
                    graph.set_real_component(id, j, value)?;
                }
            }
            Kind::Int => {
                let name = graph.name(id).to_string();
                let value = resolve_column(trace, &name)?[row];
                graph.set_int(id, value.round() as i64)?;
            }
        }
    }

    // All assignments are in; make the graph internally consistent before
    // anything downstream reads from it.
    graph.recalculate_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::TraceTable;
    use crate::tree::Tree;

    fn trace() -> TraceTable {
        let log = "Sample\tclockRate.c:dna\tfreqParameter.1\tfreqParameter.2\tfreqParameter.3\tfreqParameter.4\n\
                   0\t0.5\t0.1\t0.2\t0.3\t0.4\n\
                   1\t0.7\t0.4\t0.3\t0.2\t0.1\n";
        TraceTable::from_reader(log.as_bytes(), 0).unwrap()
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::solo(1.0);
        tree.add_child(0, Some("A".into()), 0.0).unwrap();
        tree.add_child(0, Some("B".into()), 0.0).unwrap();
        tree
    }

    #[test]
    fn assigns_scalar_vector_and_tree() {
        let mut g = ModelGraph::new();
        let tree_id = g.add_tree("Tree.t:dna", Tree::solo(0.0)).unwrap();
        let rate = g
            .add_real_parameter("clockRate.c:dna", vec![1.0], 0.0, f64::INFINITY)
            .unwrap();
        let freqs = g
            .add_real_parameter("freqParameter.s:dna", vec![0.25; 4], 0.0, 1.0)
            .unwrap();
        let lik = g.add_calculation("treeLikelihood", &[tree_id, rate, freqs]).unwrap();
        g.add_to_state(tree_id);
        g.add_to_state(rate);
        g.add_to_state(freqs);

        let eligible = g.state_ancestors(lik);
        assign_replicate(&mut g, &eligible, &sample_tree(), 1, &trace()).unwrap();

        assert_eq!(g.real(rate).unwrap().values[0], 0.7);
        assert_eq!(g.real(freqs).unwrap().values, vec![0.4, 0.3, 0.2, 0.1]);
        assert_eq!(g.tree(tree_id).unwrap().leaf_count(), 2);
        assert!(!g.is_dirty(lik));
    }

    #[test]
    fn second_tree_node_is_rejected() {
        let mut g = ModelGraph::new();
        let t1 = g.add_tree("tree1", Tree::solo(0.0)).unwrap();
        let t2 = g.add_tree("tree2", Tree::solo(0.0)).unwrap();
        let lik = g.add_calculation("lik", &[t1, t2]).unwrap();
        g.add_to_state(t1);
        g.add_to_state(t2);

        let eligible = g.state_ancestors(lik);
        let err = assign_replicate(&mut g, &eligible, &sample_tree(), 0, &trace());
        assert!(matches!(
            err,
            Err(AdequacyError::UnsupportedMultiTreeState { .. })
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let mut g = ModelGraph::new();
        let p = g
            .add_real_parameter("nothere", vec![1.0], 0.0, 1.0)
            .unwrap();
        let lik = g.add_calculation("lik", &[p]).unwrap();
        g.add_to_state(p);

        let eligible = g.state_ancestors(lik);
        let err = assign_replicate(&mut g, &eligible, &sample_tree(), 0, &trace());
        assert!(matches!(err, Err(AdequacyError::MissingTraceColumn(_))));
    }
}
