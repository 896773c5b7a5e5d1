//! State-space proposals.
//!
//! A proposal mutates the model graph and returns its log acceptance weight
//! contribution (the log Hastings ratio); positive infinity means the move
//! is accepted unconditionally.

use crate::error::PpResult;
use crate::model::{GraphId, ModelGraph};

pub trait Proposal {
    fn name(&self) -> &str;
    /// Relative weight used when choosing among proposals.
    fn weight(&self) -> f64;
    /// Mutate the graph; returns the log acceptance weight contribution.
    fn propose(&mut self, graph: &mut ModelGraph) -> PpResult<f64>;
}

/// Deterministically advances an integer parameter modulo its range.
///
/// The move is always accepted: its purpose is round-robin traversal of
/// every stored alignment over the course of the chain, not stochastic
/// exploration.
pub struct CycleIndexOperator {
    name: String,
    parameter: GraphId,
    weight: f64,
}

impl CycleIndexOperator {
    pub fn new(name: &str, parameter: GraphId, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            parameter,
            weight,
        }
    }
}

impl Proposal for CycleIndexOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn propose(&mut self, graph: &mut ModelGraph) -> PpResult<f64> {
        let param = graph.int(self.parameter)?;
        let next = if param.value + 1 > param.upper {
            0
        } else {
            param.value + 1
        };
        graph.set_int(self.parameter, next)?;
        Ok(f64::INFINITY)
    }
}

/// Weighted pick among proposals.
pub fn choose_proposal<'a>(
    proposals: &'a mut [Box<dyn Proposal>],
    rng: &mut fastrand::Rng,
) -> Option<&'a mut Box<dyn Proposal>> {
    let total: f64 = proposals.iter().map(|p| p.weight()).sum();
    if proposals.is_empty() || total <= 0.0 {
        return None;
    }
    let target = rng.f64() * total;
    let mut chosen = proposals.len() - 1;
    let mut acc = 0.0;
    for (i, proposal) in proposals.iter().enumerate() {
        acc += proposal.weight();
        if acc >= target {
            chosen = i;
            break;
        }
    }
    proposals.get_mut(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_indicator(value: i64, upper: i64) -> (ModelGraph, GraphId) {
        let mut g = ModelGraph::new();
        let id = g.add_int_parameter("alignmentIndicator", value, 0, upper).unwrap();
        g.add_to_state(id);
        (g, id)
    }

    #[test]
    fn increments_below_upper_bound() {
        let (mut g, id) = graph_with_indicator(3, 9);
        let mut op = CycleIndexOperator::new("cycle", id, 3.0);
        let weight = op.propose(&mut g).unwrap();
        assert_eq!(g.int(id).unwrap().value, 4);
        assert!(weight.is_infinite() && weight > 0.0);
    }

    #[test]
    fn wraps_at_upper_bound() {
        let (mut g, id) = graph_with_indicator(9, 9);
        let mut op = CycleIndexOperator::new("cycle", id, 3.0);
        op.propose(&mut g).unwrap();
        assert_eq!(g.int(id).unwrap().value, 0);
    }

    #[test]
    fn full_cycle_visits_every_value() {
        let (mut g, id) = graph_with_indicator(0, 4);
        let mut op = CycleIndexOperator::new("cycle", id, 3.0);
        let mut seen = vec![g.int(id).unwrap().value];
        for _ in 0..5 {
            op.propose(&mut g).unwrap();
            seen.push(g.int(id).unwrap().value);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 0]);
    }

    #[test]
    fn proposal_marks_indicator_dirty() {
        let (mut g, id) = graph_with_indicator(0, 1);
        let mut op = CycleIndexOperator::new("cycle", id, 3.0);
        assert!(!g.is_dirty(id));
        op.propose(&mut g).unwrap();
        assert!(g.is_dirty(id));
    }

    #[test]
    fn choose_respects_empty_set() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut none: Vec<Box<dyn Proposal>> = Vec::new();
        assert!(choose_proposal(&mut none, &mut rng).is_none());
    }
}
