//! Posterior-predictive replicate generation.
//!
//! One replicate pairs row `i` of the trace with the `i`-th tree sample:
//! the tree's branch lengths are reconstructed from rate annotations, the
//! sampled values are pushed into the model graph, and a synthetic alignment
//! is drawn by simulation. Replicates run in parallel, each against its own
//! copy of the model graph, so one replicate's transient state never leaks
//! into another's simulation.

pub mod assign;
pub mod reconstruct;

use rayon::prelude::*;
use tracing::info;

use crate::alignment::{Alignment, AlignmentSource};
use crate::descriptor::Analysis;
use crate::error::{AdequacyError, PpResult};
use crate::posterior::{TraceTable, TreeLog};
use crate::simulate::SequenceSimulator;
use crate::tree::Tree;

/// Generate `count` replicate alignments from the posterior sample.
///
/// Both stores are checked up front: running out of trees or trace rows is
/// an [`AdequacyError::InsufficientSamples`] before any simulation starts.
///
/// On success the final sample is also assigned into the analysis's own
/// graph, so a chain extended afterwards starts from a fully initialized
/// state rather than the descriptor's placeholders.
pub fn generate_replicates(
    analysis: &mut Analysis,
    trace: &TraceTable,
    trees: &mut TreeLog,
    count: usize,
    seed: Option<u64>,
) -> PpResult<Vec<Alignment>> {
    if count == 0 {
        return Err(AdequacyError::InvalidConfiguration(
            "replicate count must be at least 1".into(),
        ));
    }
    if trees.remaining() < count {
        return Err(AdequacyError::InsufficientSamples {
            requested: count,
            available: trees.remaining(),
            kind: "tree",
        });
    }
    if trace.n_rows() < count {
        return Err(AdequacyError::InsufficientSamples {
            requested: count,
            available: trace.n_rows(),
            kind: "trace",
        });
    }

    let eligible = analysis.graph.state_ancestors(analysis.likelihood_node);
    info!(
        "generating {} replicates under {} with a {} clock ({} state nodes)",
        count,
        analysis.site_model.kind,
        analysis.clock.kind,
        eligible.len()
    );

    let mut drawn: Vec<Tree> = Vec::with_capacity(count);
    for _ in 0..count {
        match trees.next_tree() {
            Some(tree) => drawn.push(tree),
            None => {
                return Err(AdequacyError::InsufficientSamples {
                    requested: count,
                    available: drawn.len(),
                    kind: "tree",
                })
            }
        }
    }

    let replicates: PpResult<Vec<Alignment>> = drawn
        .par_iter()
        .enumerate()
        .map(|(i, tree)| {
            // Isolated copy per replicate: transient assignments must never
            // leak into another replicate's simulation.
            let mut graph = analysis.graph.clone();
            let mut tree = tree.clone();
            reconstruct::scale_by_rate(&mut tree);
            assign::assign_replicate(&mut graph, &eligible, &tree, i, trace)?;

            let model = analysis.site_model.materialize(&graph)?;
            let clock = analysis.clock.materialize(&graph)?;
            let assigned_tree = graph.tree(analysis.tree_node)?;

            let mut simulator = SequenceSimulator::new(
                analysis.observed.site_count(),
                seed.map(|s| s.wrapping_add(i as u64)),
            );
            simulator.simulate(&format!("replicate{}", i), assigned_tree, &model, &clock)
        })
        .collect();
    let replicates = replicates?;

    // Leave the shared graph holding the final sample so the extended chain
    // starts from real state, not the descriptor's placeholders.
    if let Some(mut tree) = drawn.pop() {
        reconstruct::scale_by_rate(&mut tree);
        assign::assign_replicate(&mut analysis.graph, &eligible, &tree, count - 1, trace)?;
    }
    Ok(replicates)
}
