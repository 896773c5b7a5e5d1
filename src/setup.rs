//! Installs the replicate catalog into a built analysis.
//!
//! This is the state mutation the adequacy run performs before extending the
//! chain: a bounded integer indicator joins the sampled state, the cycling
//! proposal joins the operator set, the indicator joins the trace logger,
//! the likelihood's data input is rewired to the alignment catalog, and the
//! likelihood itself is swapped for the buffer-reseeding variant under its
//! original identifier.

use std::path::Path;

use tracing::info;

use crate::alignment::{Alignment, AlignmentList};
use crate::chain::Chain;
use crate::descriptor::{Analysis, AnalysisDescriptor, ParameterDescriptor};
use crate::error::{AdequacyError, PpResult};
use crate::likelihood::{BufferedTreeLikelihood, DataSource};
use crate::model::GraphId;
use crate::operators::CycleIndexOperator;

/// Identifier of the indicator parameter inserted into the sampled state.
pub const INDICATOR_ID: &str = "alignmentIndicator";

/// Operator weight of the cycling proposal.
pub const INDICATOR_OPERATOR_WEIGHT: f64 = 3.0;

/// A chain configured for the adequacy run, plus the indicator's node id.
pub struct AdequacyRun {
    pub chain: Chain,
    pub indicator: GraphId,
}

/// Rewire `analysis` around the generated replicates and build the chain.
pub fn configure_run(mut analysis: Analysis, replicates: Vec<Alignment>) -> PpResult<AdequacyRun> {
    if replicates.is_empty() {
        return Err(AdequacyError::InvalidConfiguration(
            "cannot configure a run with no replicate alignments".into(),
        ));
    }
    let count = replicates.len();

    // (a) The indicator joins the sampled state, bounded to [0, count - 1].
    let indicator =
        analysis
            .graph
            .add_int_parameter(INDICATOR_ID, 0, 0, count as i64 - 1)?;
    analysis.graph.add_to_state(indicator);
    analysis.graph.connect(indicator, analysis.likelihood_node);

    // (d) Every consumer of the original alignment now reads the catalog.
    let list = AlignmentList::new(
        &format!("{}.replicates", analysis.id),
        replicates,
        indicator,
        &analysis.graph,
    )?;

    // (e) The buffer-reseeding likelihood replaces the original, keeping its
    // external identifier so downstream references stay valid.
    let likelihood = BufferedTreeLikelihood::new(
        analysis.likelihood_id(),
        DataSource::List(list),
        analysis.tree_node,
        analysis.site_model.clone(),
        analysis.clock.clone(),
        analysis.use_ambiguities,
    );

    // (b) The cycling proposal joins the operator set.
    let mut chain = Chain::new(analysis.graph, likelihood);
    chain.add_proposal(Box::new(CycleIndexOperator::new(
        "cycleAlignmentIndicator",
        indicator,
        INDICATOR_OPERATOR_WEIGHT,
    )));

    info!(
        "installed alignment catalog of {} replicates, indicator bounded to [0, {}]",
        count,
        count - 1
    );
    Ok(AdequacyRun { chain, indicator })
}

/// Write the rewired analysis descriptor next to the run's other outputs,
/// with the indicator appended to the declared state.
pub fn write_rewired_descriptor<P: AsRef<Path>>(
    descriptor: &AnalysisDescriptor,
    replicate_count: usize,
    path: P,
) -> PpResult<()> {
    let mut rewired = descriptor.clone();
    rewired.parameters.push(ParameterDescriptor {
        id: INDICATOR_ID.to_string(),
        dimension: 1,
        value: Some(vec![0.0]),
        lower: Some(0.0),
        upper: Some(replicate_count as f64 - 1.0),
        kind: "int".to_string(),
    });
    rewired.save_to_file(path)
}
