//! The shared model graph: parameter and calculation nodes, dirty
//! propagation, and the checkpoint discipline the accept/reject loop relies
//! on.
//!
//! Nodes live in an arena and are referenced by `GraphId`. Edges are built
//! once at model-load time; every node carries a capability tag instead of
//! relying on runtime type identity. Dirty flags propagate from a mutated
//! node to every transitive consumer and are cleared by `accept_all` /
//! `restore_all` at the end of a chain step.

use std::collections::HashMap;

use crate::error::{AdequacyError, PpResult};
use crate::tree::Tree;

pub type GraphId = usize;

/// What a node can do: hold sampled state, or recompute from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Stateful,
    Calculated,
}

/// A real-valued parameter of one or more dimensions.
#[derive(Debug, Clone)]
pub struct RealParameter {
    pub values: Vec<f64>,
    pub lower: f64,
    pub upper: f64,
}

impl RealParameter {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// A bounded integer parameter.
#[derive(Debug, Clone)]
pub struct IntParameter {
    pub value: i64,
    pub lower: i64,
    pub upper: i64,
}

/// Value payload of a stateful node.
#[derive(Debug, Clone)]
pub enum StateValue {
    Real(RealParameter),
    Int(IntParameter),
    Tree(Tree),
}

#[derive(Debug, Clone)]
struct GraphNode {
    name: String,
    capability: Capability,
    value: Option<StateValue>,
    stored: Option<StateValue>,
    dirty: bool,
    inputs: Vec<GraphId>,
    outputs: Vec<GraphId>,
}

/// Arena of model nodes plus the membership list of the sampled state.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, GraphId>,
    state: Vec<GraphId>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(
        &mut self,
        name: &str,
        capability: Capability,
        value: Option<StateValue>,
    ) -> PpResult<GraphId> {
        if self.index.contains_key(name) {
            return Err(AdequacyError::Validation(format!(
                "duplicate model node '{}'",
                name
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            name: name.to_string(),
            capability,
            value,
            stored: None,
            dirty: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_real_parameter(
        &mut self,
        name: &str,
        values: Vec<f64>,
        lower: f64,
        upper: f64,
    ) -> PpResult<GraphId> {
        self.add_node(
            name,
            Capability::Stateful,
            Some(StateValue::Real(RealParameter {
                values,
                lower,
                upper,
            })),
        )
    }

    pub fn add_int_parameter(
        &mut self,
        name: &str,
        value: i64,
        lower: i64,
        upper: i64,
    ) -> PpResult<GraphId> {
        self.add_node(
            name,
            Capability::Stateful,
            Some(StateValue::Int(IntParameter {
                value,
                lower,
                upper,
            })),
        )
    }

    pub fn add_tree(&mut self, name: &str, tree: Tree) -> PpResult<GraphId> {
        self.add_node(name, Capability::Stateful, Some(StateValue::Tree(tree)))
    }

    pub fn add_calculation(&mut self, name: &str, inputs: &[GraphId]) -> PpResult<GraphId> {
        let id = self.add_node(name, Capability::Calculated, None)?;
        for &input in inputs {
            self.connect(input, id);
        }
        Ok(id)
    }

    /// Add an edge: `to` consumes the current value of `from`.
    pub fn connect(&mut self, from: GraphId, to: GraphId) {
        if !self.nodes[from].outputs.contains(&to) {
            self.nodes[from].outputs.push(to);
            self.nodes[to].inputs.push(from);
        }
    }

    /// Declare a stateful node part of the sampled state.
    pub fn add_to_state(&mut self, id: GraphId) {
        if !self.state.contains(&id) {
            self.state.push(id);
        }
    }

    pub fn in_state(&self, id: GraphId) -> bool {
        self.state.contains(&id)
    }

    pub fn id(&self, name: &str) -> Option<GraphId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: GraphId) -> &str {
        &self.nodes[id].name
    }

    pub fn capability(&self, id: GraphId) -> Capability {
        self.nodes[id].capability
    }

    /// Members of the sampled state, in insertion order.
    pub fn state_nodes(&self) -> &[GraphId] {
        &self.state
    }

    pub fn is_dirty(&self, id: GraphId) -> bool {
        self.nodes[id].dirty
    }

    fn value(&self, id: GraphId) -> PpResult<&StateValue> {
        self.nodes[id].value.as_ref().ok_or_else(|| {
            AdequacyError::Validation(format!(
                "node '{}' is not stateful",
                self.nodes[id].name
            ))
        })
    }

    pub fn state_value(&self, id: GraphId) -> Option<&StateValue> {
        self.nodes[id].value.as_ref()
    }

    pub fn real(&self, id: GraphId) -> PpResult<&RealParameter> {
        match self.value(id)? {
            StateValue::Real(p) => Ok(p),
            _ => Err(self.kind_error(id, "real parameter")),
        }
    }

    pub fn int(&self, id: GraphId) -> PpResult<&IntParameter> {
        match self.value(id)? {
            StateValue::Int(p) => Ok(p),
            _ => Err(self.kind_error(id, "integer parameter")),
        }
    }

    pub fn tree(&self, id: GraphId) -> PpResult<&Tree> {
        match self.value(id)? {
            StateValue::Tree(t) => Ok(t),
            _ => Err(self.kind_error(id, "tree")),
        }
    }

    fn kind_error(&self, id: GraphId, expected: &str) -> AdequacyError {
        AdequacyError::Validation(format!(
            "node '{}' is not a {}",
            self.nodes[id].name, expected
        ))
    }

    pub fn set_real_component(&mut self, id: GraphId, dim: usize, value: f64) -> PpResult<()> {
        let dimension = match &self.nodes[id].value {
            Some(StateValue::Real(p)) => p.values.len(),
            _ => return Err(self.kind_error(id, "real parameter")),
        };
        if dim >= dimension {
            return Err(AdequacyError::Validation(format!(
                "component {} out of range for '{}' (dimension {})",
                dim, self.nodes[id].name, dimension
            )));
        }
        if let Some(StateValue::Real(p)) = self.nodes[id].value.as_mut() {
            p.values[dim] = value;
        }
        self.mark_dirty(id);
        Ok(())
    }

    pub fn set_real_scalar(&mut self, id: GraphId, value: f64) -> PpResult<()> {
        self.set_real_component(id, 0, value)
    }

    pub fn set_int(&mut self, id: GraphId, value: i64) -> PpResult<()> {
        let (lower, upper) = match &self.nodes[id].value {
            Some(StateValue::Int(p)) => (p.lower, p.upper),
            _ => return Err(self.kind_error(id, "integer parameter")),
        };
        if value < lower || value > upper {
            return Err(AdequacyError::Validation(format!(
                "value {} outside bounds [{}, {}] of '{}'",
                value, lower, upper, self.nodes[id].name
            )));
        }
        if let Some(StateValue::Int(p)) = self.nodes[id].value.as_mut() {
            p.value = value;
        }
        self.mark_dirty(id);
        Ok(())
    }

    /// Structural copy of `tree` into the tree node `id`.
    pub fn set_tree(&mut self, id: GraphId, tree: &Tree) -> PpResult<()> {
        if !matches!(self.nodes[id].value, Some(StateValue::Tree(_))) {
            return Err(self.kind_error(id, "tree"));
        }
        if let Some(StateValue::Tree(t)) = self.nodes[id].value.as_mut() {
            t.assign_from(tree);
        }
        self.mark_dirty(id);
        Ok(())
    }

    /// Mark `id` dirty and propagate to every transitive consumer.
    fn mark_dirty(&mut self, id: GraphId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if self.nodes[cur].dirty {
                continue;
            }
            self.nodes[cur].dirty = true;
            stack.extend(self.nodes[cur].outputs.iter().copied());
        }
    }

    /// All stateful nodes of the sampled state reachable from `of` through
    /// input edges, in discovery order.
    pub fn state_ancestors(&self, of: GraphId) -> Vec<GraphId> {
        let mut found = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![of];
        while let Some(cur) = stack.pop() {
            if visited[cur] {
                continue;
            }
            visited[cur] = true;
            if self.nodes[cur].capability == Capability::Stateful && self.in_state(cur) {
                found.push(cur);
            }
            // Reverse keeps input order stable under the LIFO stack.
            stack.extend(self.nodes[cur].inputs.iter().rev().copied());
        }
        found
    }

    /// The full-recalculation sweep: mark every node dirty so each dependent
    /// recomputes from the freshly assigned state, then accept the result
    /// unconditionally, leaving the graph clean and consistent.
    pub fn recalculate_all(&mut self) {
        for node in &mut self.nodes {
            node.dirty = true;
        }
        for node in &mut self.nodes {
            node.dirty = false;
            node.stored = None;
        }
    }

    /// Checkpoint every stateful node's value.
    pub fn store_all(&mut self) {
        for node in &mut self.nodes {
            node.stored = node.value.clone();
        }
    }

    /// Roll every stateful node back to its checkpoint and clear dirt.
    pub fn restore_all(&mut self) {
        for node in &mut self.nodes {
            if let Some(stored) = node.stored.take() {
                node.value = Some(stored);
            }
            node.dirty = false;
        }
    }

    /// Drop checkpoints and clear dirt after an accepted proposal.
    pub fn accept_all(&mut self) {
        for node in &mut self.nodes {
            node.stored = None;
            node.dirty = false;
        }
    }
}

/// Checkpoint discipline for entities that live outside the graph arena but
/// participate in the accept/reject cycle.
pub trait Checkpoint {
    /// Record state as of the last accepted proposal.
    fn checkpoint(&mut self, graph: &ModelGraph);
    /// Undo to the last checkpoint. The graph has already been restored when
    /// this runs.
    fn rollback(&mut self, graph: &ModelGraph);
    /// Commit: the proposed state becomes the new checkpoint baseline.
    fn accept(&mut self, graph: &ModelGraph);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_graph() -> (ModelGraph, GraphId, GraphId, GraphId) {
        let mut g = ModelGraph::new();
        let rate = g.add_real_parameter("clockRate", vec![1.0], 0.0, f64::INFINITY).unwrap();
        let freqs = g
            .add_real_parameter("freqParameter", vec![0.25; 4], 0.0, 1.0)
            .unwrap();
        let site = g.add_calculation("siteModel", &[freqs]).unwrap();
        let lik = g.add_calculation("treeLikelihood", &[rate, site]).unwrap();
        g.add_to_state(rate);
        g.add_to_state(freqs);
        (g, rate, freqs, lik)
    }

    #[test]
    fn dirty_propagates_to_consumers() {
        let (mut g, _, freqs, lik) = toy_graph();
        assert!(!g.is_dirty(lik));
        g.set_real_component(freqs, 1, 0.3).unwrap();
        assert!(g.is_dirty(freqs));
        assert!(g.is_dirty(g.id("siteModel").unwrap()));
        assert!(g.is_dirty(lik));
    }

    #[test]
    fn state_ancestors_walks_input_edges() {
        let (g, rate, freqs, lik) = toy_graph();
        let found = g.state_ancestors(lik);
        assert!(found.contains(&rate));
        assert!(found.contains(&freqs));
        assert_eq!(found.len(), 2);
        assert_eq!(g.capability(lik), Capability::Calculated);
        assert_eq!(g.capability(rate), Capability::Stateful);
        assert_eq!(g.state_nodes(), &[rate, freqs]);
    }

    #[test]
    fn state_ancestors_excludes_non_state_nodes() {
        let mut g = ModelGraph::new();
        let p = g.add_real_parameter("p", vec![1.0], 0.0, 1.0).unwrap();
        let lik = g.add_calculation("lik", &[p]).unwrap();
        // p never added to the sampled state.
        assert!(g.state_ancestors(lik).is_empty());
    }

    #[test]
    fn store_restore_round_trip() {
        let (mut g, rate, _, _) = toy_graph();
        g.store_all();
        g.set_real_scalar(rate, 5.0).unwrap();
        assert!(g.is_dirty(rate));
        g.restore_all();
        assert_eq!(g.real(rate).unwrap().values[0], 1.0);
        assert!(!g.is_dirty(rate));
    }

    #[test]
    fn accept_keeps_new_value() {
        let (mut g, rate, _, _) = toy_graph();
        g.store_all();
        g.set_real_scalar(rate, 5.0).unwrap();
        g.accept_all();
        assert_eq!(g.real(rate).unwrap().values[0], 5.0);
        assert!(!g.is_dirty(rate));
    }

    #[test]
    fn int_bounds_enforced() {
        let mut g = ModelGraph::new();
        let idx = g.add_int_parameter("alignmentIndicator", 0, 0, 9).unwrap();
        assert!(g.set_int(idx, 9).is_ok());
        assert!(g.set_int(idx, 10).is_err());
        assert!(g.set_int(idx, -1).is_err());
    }

    #[test]
    fn recalculate_all_leaves_graph_clean() {
        let (mut g, rate, _, lik) = toy_graph();
        g.set_real_scalar(rate, 2.0).unwrap();
        g.recalculate_all();
        assert!(!g.is_dirty(rate));
        assert!(!g.is_dirty(lik));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut g = ModelGraph::new();
        g.add_real_parameter("p", vec![1.0], 0.0, 1.0).unwrap();
        assert!(g.add_real_parameter("p", vec![1.0], 0.0, 1.0).is_err());
    }
}
