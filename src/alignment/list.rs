//! An alignment holding a catalog of alignments, indexed by an indicator
//! parameter that is itself part of the sampled state.

use tracing::debug;

use crate::alignment::{Alignment, AlignmentSource, STATE_COUNT};
use crate::error::{AdequacyError, PpResult};
use crate::model::{Checkpoint, GraphId, ModelGraph};

/// Exposes exactly one of N pre-generated alignments as the current dataset.
///
/// The current view is a pure function of the indicator's value and the
/// (immutable) catalog. The cached index is refreshed on every dirty check
/// and on rollback, so a dependent reading through the container can never
/// observe alignment data inconsistent with the live indicator.
#[derive(Debug, Clone)]
pub struct AlignmentList {
    pub id: String,
    alignments: Vec<Alignment>,
    indicator: GraphId,
    current: usize,
    stored_index: Option<i64>,
}

impl AlignmentList {
    pub fn new(
        id: &str,
        alignments: Vec<Alignment>,
        indicator: GraphId,
        graph: &ModelGraph,
    ) -> PpResult<Self> {
        if alignments.is_empty() {
            return Err(AdequacyError::Validation(format!(
                "alignment list '{}' is empty",
                id
            )));
        }
        let param = graph.int(indicator)?;
        if param.lower != 0 || param.upper != alignments.len() as i64 - 1 {
            return Err(AdequacyError::Validation(format!(
                "indicator bounds [{}, {}] do not match alignment count {}",
                param.lower,
                param.upper,
                alignments.len()
            )));
        }
        let current = param.value as usize;
        Ok(Self {
            id: id.to_string(),
            alignments,
            indicator,
            current,
            stored_index: None,
        })
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }

    pub fn indicator(&self) -> GraphId {
        self.indicator
    }

    /// The cached current index (as of the last dirty check or rollback).
    pub fn current_index(&self) -> usize {
        self.current
    }

    fn current(&self) -> &Alignment {
        &self.alignments[self.current]
    }

    /// Dirty exactly when the indicator changed since the last check. A dirty
    /// check also refreshes the cached current alignment, so dependents
    /// reading through the container afterwards observe the new alignment.
    pub fn requires_recalculation(&mut self, graph: &ModelGraph) -> PpResult<bool> {
        if graph.is_dirty(self.indicator) {
            let value = graph.int(self.indicator)?.value;
            debug!("alignment list '{}': switching to replicate {}", self.id, value);
            self.current = value as usize;
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-read the indicator into the cache without consulting dirty flags.
    fn sync(&mut self, graph: &ModelGraph) {
        if let Ok(param) = graph.int(self.indicator) {
            self.current = param.value as usize;
        }
    }
}

impl Checkpoint for AlignmentList {
    fn checkpoint(&mut self, graph: &ModelGraph) {
        if let Ok(param) = graph.int(self.indicator) {
            self.stored_index = Some(param.value);
        }
    }

    /// The indicator itself is a sampled state node, so the graph's rollback
    /// is the single owner of restoring its value; the container only
    /// re-syncs its cache against the already-restored indicator and
    /// refreshes its recorded index.
    fn rollback(&mut self, graph: &ModelGraph) {
        self.sync(graph);
        self.stored_index = Some(self.current as i64);
    }

    fn accept(&mut self, graph: &ModelGraph) {
        self.sync(graph);
        self.stored_index = Some(self.current as i64);
    }
}

impl AlignmentSource for AlignmentList {
    fn taxon_count(&self) -> usize {
        self.current().taxon_count()
    }

    fn taxon_names(&self) -> &[String] {
        self.current().taxon_names()
    }

    fn taxon_index(&self, name: &str) -> Option<usize> {
        self.current().taxon_index(name)
    }

    fn site_count(&self) -> usize {
        self.current().site_count()
    }

    fn pattern_count(&self) -> usize {
        self.current().pattern_count()
    }

    fn pattern(&self, pattern: usize) -> &[u8] {
        self.current().pattern(pattern)
    }

    fn state_at(&self, taxon: usize, pattern: usize) -> u8 {
        self.current().state_at(taxon, pattern)
    }

    fn pattern_weight(&self, pattern: usize) -> u32 {
        self.current().pattern_weight(pattern)
    }

    fn weights(&self) -> &[u32] {
        self.current().weights()
    }

    fn pattern_index(&self, site: usize) -> usize {
        self.current().pattern_index(site)
    }

    fn max_state_count(&self) -> usize {
        self.current().max_state_count()
    }

    fn state_lookup(&self, state: u8) -> [bool; STATE_COUNT] {
        self.current().state_lookup(state)
    }

    fn tip_partials(&self, taxon: usize, pattern: usize) -> [f64; STATE_COUNT] {
        self.current().tip_partials(taxon, pattern)
    }

    fn sequence_string(&self, taxon: &str) -> Option<String> {
        self.current().sequence_string(taxon)
    }

    fn render(&self) -> String {
        self.current().render()
    }
}
