//! Tree likelihood evaluation over a switchable data source.
//!
//! [`BufferedTreeLikelihood`] wraps a pruning evaluator whose per-leaf data
//! buffers are seeded from whichever alignment is current. When the data
//! source reports dirty (the indicator moved, so a different alignment is
//! now current) the buffers are re-seeded before recomputation; a rollback
//! re-seeds them again from the restored alignment.

use tracing::debug;

use crate::alignment::{Alignment, AlignmentList, AlignmentSource, STATE_COUNT};
use crate::error::{AdequacyError, PpResult};
use crate::model::{Checkpoint, GraphId, ModelGraph};
use crate::simulate::{ClockBinding, SiteModel, SubstitutionModel};

/// The data input of a likelihood: a single alignment, or the indexed
/// container installed by the adequacy setup.
#[derive(Debug, Clone)]
pub enum DataSource {
    Single(Alignment),
    List(AlignmentList),
}

impl DataSource {
    pub fn source(&self) -> &dyn AlignmentSource {
        match self {
            Self::Single(a) => a,
            Self::List(l) => l,
        }
    }

    /// A single alignment never changes; the list is dirty when its
    /// indicator moved (and re-syncs its cache as a side effect).
    pub fn requires_recalculation(&mut self, graph: &ModelGraph) -> PpResult<bool> {
        match self {
            Self::Single(_) => Ok(false),
            Self::List(l) => l.requires_recalculation(graph),
        }
    }
}

impl Checkpoint for DataSource {
    fn checkpoint(&mut self, graph: &ModelGraph) {
        if let Self::List(l) = self {
            l.checkpoint(graph);
        }
    }

    fn rollback(&mut self, graph: &ModelGraph) {
        if let Self::List(l) = self {
            l.rollback(graph);
        }
    }

    fn accept(&mut self, graph: &ModelGraph) {
        if let Self::List(l) = self {
            l.accept(graph);
        }
    }
}

/// Per-leaf data buffer, keyed by taxon order of the data source.
#[derive(Debug, Clone)]
enum LeafBuffer {
    /// Hard state codes, one per pattern.
    States(Vec<u8>),
    /// Tip partial-likelihood vectors, one per pattern.
    Partials(Vec<[f64; STATE_COUNT]>),
}

/// Felsenstein pruning likelihood with buffer re-seeding on data switch.
#[derive(Debug, Clone)]
pub struct BufferedTreeLikelihood {
    /// Identifier preserved from the likelihood this instance replaced.
    pub id: String,
    pub data: DataSource,
    pub tree: GraphId,
    pub site_model: SiteModel,
    pub clock: ClockBinding,
    use_tip_partials: bool,
    reseed_pending: bool,
    buffers: Vec<LeafBuffer>,
}

impl BufferedTreeLikelihood {
    pub fn new(
        id: &str,
        data: DataSource,
        tree: GraphId,
        site_model: SiteModel,
        clock: ClockBinding,
        use_tip_partials: bool,
    ) -> Self {
        let mut likelihood = Self {
            id: id.to_string(),
            data,
            tree,
            site_model,
            clock,
            use_tip_partials,
            reseed_pending: false,
            buffers: Vec::new(),
        };
        likelihood.reseed();
        likelihood
    }

    /// Re-seed every leaf buffer from the currently selected alignment.
    fn reseed(&mut self) {
        let source = self.data.source();
        let pattern_count = source.pattern_count();
        let mut buffers = Vec::with_capacity(source.taxon_count());
        for taxon in 0..source.taxon_count() {
            let buffer = if self.use_tip_partials {
                LeafBuffer::Partials(
                    (0..pattern_count)
                        .map(|p| source.tip_partials(taxon, p))
                        .collect(),
                )
            } else {
                LeafBuffer::States((0..pattern_count).map(|p| source.state_at(taxon, p)).collect())
            };
            buffers.push(buffer);
        }
        self.buffers = buffers;
        debug!(
            "likelihood '{}': re-seeded {} leaf buffers over {} patterns",
            self.id,
            self.buffers.len(),
            pattern_count
        );
    }

    /// Recalculation check. Runs the data source's own dirty check first, so
    /// a changed alignment is re-seeded into the leaf buffers before any
    /// downstream read.
    pub fn requires_recalculation(&mut self, graph: &ModelGraph) -> PpResult<bool> {
        let mut dirty = graph.is_dirty(self.tree);
        for id in [self.site_model.kappa, self.site_model.frequencies, self.clock.rate]
            .into_iter()
            .flatten()
        {
            dirty |= graph.is_dirty(id);
        }
        if self.data.requires_recalculation(graph)? {
            self.reseed();
            self.reseed_pending = true;
            dirty = true;
        }
        Ok(dirty)
    }

    fn leaf_partials(&self, taxon: usize, pattern: usize) -> [f64; STATE_COUNT] {
        match &self.buffers[taxon] {
            LeafBuffer::States(states) => {
                let mut partials = [0.0; STATE_COUNT];
                for (p, allowed) in partials
                    .iter_mut()
                    .zip(crate::alignment::state_set(states[pattern]))
                {
                    if allowed {
                        *p = 1.0;
                    }
                }
                partials
            }
            LeafBuffer::Partials(rows) => rows[pattern],
        }
    }

    /// Pruning log-likelihood of the current data under the current state.
    pub fn log_likelihood(&self, graph: &ModelGraph) -> PpResult<f64> {
        let tree = graph.tree(self.tree)?;
        let model = self.site_model.materialize(graph)?;
        let clock = self.clock.materialize(graph)?;
        let source = self.data.source();

        if tree.leaf_count() != source.taxon_count() {
            return Err(AdequacyError::Validation(format!(
                "likelihood '{}': tree has {} leaves but data has {} taxa",
                self.id,
                tree.leaf_count(),
                source.taxon_count()
            )));
        }

        let pattern_count = source.pattern_count();
        let frequencies = model.frequencies();

        // Reverse pre-order is a valid children-before-parent order.
        let order: Vec<_> = tree.iter_preorder().collect();
        let mut partials: Vec<Vec<[f64; STATE_COUNT]>> =
            vec![Vec::new(); tree.node_count()];

        for &node in order.iter().rev() {
            if tree.node(node).is_leaf() {
                let name = tree.node(node).name.clone().unwrap_or_default();
                let taxon = source.taxon_index(&name).ok_or_else(|| {
                    AdequacyError::Validation(format!(
                        "taxon '{}' of the tree is missing from the data",
                        name
                    ))
                })?;
                partials[node] = (0..pattern_count)
                    .map(|p| self.leaf_partials(taxon, p))
                    .collect();
            } else {
                let mut node_partials = vec![[1.0f64; STATE_COUNT]; pattern_count];
                for &child in &tree.node(node).children {
                    let distance = tree.branch_length(child) * clock.rate;
                    let probs = transition(&model, distance);
                    for (pattern, acc) in node_partials.iter_mut().enumerate() {
                        let child_partials = &partials[child][pattern];
                        for (i, a) in acc.iter_mut().enumerate() {
                            let mut sum = 0.0;
                            for j in 0..STATE_COUNT {
                                sum += probs[i][j] * child_partials[j];
                            }
                            *a *= sum;
                        }
                    }
                }
                partials[node] = node_partials;
            }
        }

        let root = &partials[tree.root()];
        let mut log_p = 0.0;
        for pattern in 0..pattern_count {
            let site: f64 = frequencies
                .iter()
                .zip(root[pattern])
                .map(|(f, l)| f * l)
                .sum();
            if site <= 0.0 {
                return Err(AdequacyError::Validation(format!(
                    "likelihood '{}': zero site likelihood at pattern {}",
                    self.id, pattern
                )));
            }
            log_p += site.ln() * source.pattern_weight(pattern) as f64;
        }
        Ok(log_p)
    }
}

fn transition(model: &SubstitutionModel, distance: f64) -> [[f64; STATE_COUNT]; STATE_COUNT] {
    model.transition_probs(distance.max(0.0))
}

impl Checkpoint for BufferedTreeLikelihood {
    fn checkpoint(&mut self, graph: &ModelGraph) {
        self.data.checkpoint(graph);
        self.reseed_pending = false;
    }

    fn rollback(&mut self, graph: &ModelGraph) {
        // The data source re-syncs first so the reseed reads the restored
        // alignment, not the rejected one.
        self.data.rollback(graph);
        if self.reseed_pending {
            self.reseed();
        }
        self.reseed_pending = false;
    }

    fn accept(&mut self, graph: &ModelGraph) {
        self.data.accept(graph);
        self.reseed_pending = false;
    }
}
