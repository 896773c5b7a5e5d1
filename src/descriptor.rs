//! The analysis descriptor: a JSON summary of the fitted model that the
//! inference run was built from: observed sequences, log file names, the
//! sampled state, and the likelihood's site and clock models.
//!
//! `build` turns the descriptor into a runtime [`Analysis`]: a wired model
//! graph plus the bindings needed to materialize substitution and clock
//! models from live parameter values.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alignment::Alignment;
use crate::error::{AdequacyError, PpResult};
use crate::model::{GraphId, ModelGraph};
use crate::simulate::{ClockBinding, ClockKind, SiteModel, SubstModelKind};
use crate::tree::Tree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDescriptor {
    pub id: String,
    /// Observed alignment, one entry per taxon.
    pub sequences: Vec<SequenceEntry>,
    /// Trace log file name, relative to the log directory.
    pub trace_log: String,
    /// Tree log file name, relative to the log directory.
    pub tree_log: String,
    /// Identifier of the tree state node.
    pub tree: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    pub likelihood: LikelihoodDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub taxon: String,
    pub sequence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Initial values; defaults to 1.0 per dimension.
    #[serde(default)]
    pub value: Option<Vec<f64>>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    /// "real" or "int".
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_dimension() -> usize {
    1
}

fn default_kind() -> String {
    "real".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodDescriptor {
    pub id: String,
    pub site_model: SiteModelDescriptor,
    pub clock: ClockDescriptor,
    /// Seed leaf buffers with ambiguity-aware tip likelihoods instead of
    /// hard states.
    #[serde(default)]
    pub use_ambiguities: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteModelDescriptor {
    /// Substitution model family ("jc69", "hky").
    pub substitution: String,
    #[serde(default)]
    pub kappa: Option<String>,
    #[serde(default)]
    pub frequencies: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockDescriptor {
    /// Clock family ("strict", "relaxed_lognormal", "random_local").
    pub kind: String,
    #[serde(default)]
    pub rate: Option<String>,
}

/// Runtime form of a descriptor: the model graph and everything needed to
/// generate replicates and evaluate the likelihood.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub id: String,
    pub graph: ModelGraph,
    pub observed: Alignment,
    pub tree_node: GraphId,
    pub likelihood_node: GraphId,
    pub site_model: SiteModel,
    pub clock: ClockBinding,
    pub trace_log: String,
    pub tree_log: String,
    pub use_ambiguities: bool,
}

impl Analysis {
    /// External identifier of the likelihood, preserved across the swap to
    /// the buffer-reseeding variant.
    pub fn likelihood_id(&self) -> &str {
        self.graph.name(self.likelihood_node)
    }
}

impl AnalysisDescriptor {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PpResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let descriptor: Self = serde_json::from_str(&content)?;
        info!(
            "loaded analysis '{}' ({} taxa, {} parameters)",
            descriptor.id,
            descriptor.sequences.len(),
            descriptor.parameters.len()
        );
        Ok(descriptor)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PpResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Wire the descriptor into a runtime [`Analysis`].
    pub fn build(&self) -> PpResult<Analysis> {
        let sequences: Vec<(String, String)> = self
            .sequences
            .iter()
            .map(|e| (e.taxon.clone(), e.sequence.clone()))
            .collect();
        let observed = Alignment::from_sequences(&self.id, &sequences)?;

        let mut graph = ModelGraph::new();
        let tree_node = graph.add_tree(&self.tree, Tree::solo(0.0))?;
        graph.add_to_state(tree_node);

        for param in &self.parameters {
            if param.dimension == 0 {
                return Err(AdequacyError::InvalidConfiguration(format!(
                    "parameter '{}' has dimension 0",
                    param.id
                )));
            }
            let values = match &param.value {
                Some(v) if v.len() == param.dimension => v.clone(),
                Some(v) => {
                    return Err(AdequacyError::InvalidConfiguration(format!(
                        "parameter '{}' declares dimension {} but {} initial values",
                        param.id,
                        param.dimension,
                        v.len()
                    )))
                }
                None => vec![1.0; param.dimension],
            };
            let id = match param.kind.as_str() {
                "real" => graph.add_real_parameter(
                    &param.id,
                    values,
                    param.lower.unwrap_or(f64::NEG_INFINITY),
                    param.upper.unwrap_or(f64::INFINITY),
                )?,
                "int" => graph.add_int_parameter(
                    &param.id,
                    values[0] as i64,
                    param.lower.map(|l| l as i64).unwrap_or(i64::MIN),
                    param.upper.map(|u| u as i64).unwrap_or(i64::MAX),
                )?,
                other => {
                    return Err(AdequacyError::InvalidConfiguration(format!(
                        "unknown parameter kind '{}' for '{}'",
                        other, param.id
                    )))
                }
            };
            graph.add_to_state(id);
        }

        let kind = SubstModelKind::from_str(&self.likelihood.site_model.substitution)
            .map_err(|_| {
                AdequacyError::InvalidConfiguration(format!(
                    "unknown substitution model '{}'",
                    self.likelihood.site_model.substitution
                ))
            })?;
        let kappa = self.resolve_binding(&graph, &self.likelihood.site_model.kappa)?;
        let frequencies =
            self.resolve_binding(&graph, &self.likelihood.site_model.frequencies)?;
        let site_model = SiteModel {
            kind,
            kappa,
            frequencies,
        };

        let clock_kind = ClockKind::from_str(&self.likelihood.clock.kind).map_err(|_| {
            AdequacyError::InvalidConfiguration(format!(
                "unknown clock model '{}'",
                self.likelihood.clock.kind
            ))
        })?;
        let rate = self.resolve_binding(&graph, &self.likelihood.clock.rate)?;
        let clock = ClockBinding {
            kind: clock_kind,
            rate,
        };

        let mut site_inputs = vec![];
        site_inputs.extend(site_model.kappa);
        site_inputs.extend(site_model.frequencies);
        let site_calc = graph.add_calculation(
            &format!("{}.siteModel", self.likelihood.id),
            &site_inputs,
        )?;
        let clock_inputs: Vec<GraphId> = clock.rate.into_iter().collect();
        let clock_calc = graph.add_calculation(
            &format!("{}.branchRateModel", self.likelihood.id),
            &clock_inputs,
        )?;
        let likelihood_node = graph.add_calculation(
            &self.likelihood.id,
            &[tree_node, site_calc, clock_calc],
        )?;

        Ok(Analysis {
            id: self.id.clone(),
            graph,
            observed,
            tree_node,
            likelihood_node,
            site_model,
            clock,
            trace_log: self.trace_log.clone(),
            tree_log: self.tree_log.clone(),
            use_ambiguities: self.likelihood.use_ambiguities,
        })
    }

    fn resolve_binding(
        &self,
        graph: &ModelGraph,
        name: &Option<String>,
    ) -> PpResult<Option<GraphId>> {
        match name {
            Some(n) => {
                let id = graph.id(n).ok_or_else(|| {
                    AdequacyError::InvalidConfiguration(format!(
                        "'{}' does not name a declared parameter",
                        n
                    ))
                })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}
