//! Substitution models, clock models, and sequence simulation.
//!
//! Replicate alignments are drawn by evolving a root sequence (sampled from
//! the model's equilibrium frequencies) down every branch of a tree under
//! the transition probabilities of the substitution model.

use strum_macros::{Display, EnumString};

use crate::alignment::Alignment;
use crate::error::{AdequacyError, PpResult};
use crate::model::{GraphId, ModelGraph};
use crate::tree::Tree;

/// Substitution model families recognized by the analysis descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SubstModelKind {
    Jc69,
    Hky,
}

/// Clock model families recognized by the analysis descriptor. Only the
/// strict clock carries its rate through simulation; every other family is
/// replaced by the neutral clock because branch lengths were already
/// rate-scaled during reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClockKind {
    Strict,
    RelaxedLognormal,
    RandomLocal,
}

/// A concrete substitution model with materialized parameter values.
#[derive(Debug, Clone)]
pub enum SubstitutionModel {
    Jc69,
    Hky { kappa: f64, freqs: [f64; 4] },
}

impl SubstitutionModel {
    pub fn frequencies(&self) -> [f64; 4] {
        match self {
            Self::Jc69 => [0.25; 4],
            Self::Hky { freqs, .. } => *freqs,
        }
    }

    /// Transition probability matrix P(d) for an expected substitution
    /// distance d, normalized to one expected substitution per unit distance.
    pub fn transition_probs(&self, distance: f64) -> [[f64; 4]; 4] {
        match self {
            Self::Jc69 => {
                let e = (-4.0 * distance / 3.0).exp();
                let same = 0.25 + 0.75 * e;
                let diff = 0.25 - 0.25 * e;
                let mut p = [[diff; 4]; 4];
                for (i, row) in p.iter_mut().enumerate() {
                    row[i] = same;
                }
                p
            }
            Self::Hky { kappa, freqs } => hky_probability(*kappa, *freqs, distance),
        }
    }
}

/// Closed-form HKY85 transition probabilities (A=0, C=1, G=2, T=3).
fn hky_probability(kappa: f64, freqs: [f64; 4], distance: f64) -> [[f64; 4]; 4] {
    let pi_r = freqs[0] + freqs[2];
    let pi_y = freqs[1] + freqs[3];
    let beta = 1.0 / (2.0 * (pi_r * pi_y + kappa * (freqs[0] * freqs[2] + freqs[1] * freqs[3])));
    let e1 = (-beta * distance).exp();

    let group = |j: usize| if j % 2 == 0 { pi_r } else { pi_y };
    let is_purine = |j: usize| j % 2 == 0;

    let mut p = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            let pi_j = freqs[j];
            let pi_group = group(j);
            let a_j = 1.0 + pi_group * (kappa - 1.0);
            let e2 = (-beta * distance * a_j).exp();
            p[i][j] = if i == j {
                pi_j + pi_j * (1.0 / pi_group - 1.0) * e1 + ((pi_group - pi_j) / pi_group) * e2
            } else if is_purine(i) == is_purine(j) {
                pi_j + pi_j * (1.0 / pi_group - 1.0) * e1 - (pi_j / pi_group) * e2
            } else {
                pi_j * (1.0 - e1)
            };
        }
    }
    p
}

/// A materialized clock: branch durations are multiplied by this rate.
#[derive(Debug, Clone, Copy)]
pub struct ClockModel {
    pub rate: f64,
}

impl ClockModel {
    /// The identity clock (rate 1).
    pub fn neutral() -> Self {
        Self { rate: 1.0 }
    }
}

/// Binding of a site model to parameter nodes in the model graph.
#[derive(Debug, Clone)]
pub struct SiteModel {
    pub kind: SubstModelKind,
    pub kappa: Option<GraphId>,
    pub frequencies: Option<GraphId>,
}

impl SiteModel {
    /// Materialize a concrete model from the graph's current values.
    pub fn materialize(&self, graph: &ModelGraph) -> PpResult<SubstitutionModel> {
        match self.kind {
            SubstModelKind::Jc69 => Ok(SubstitutionModel::Jc69),
            SubstModelKind::Hky => {
                let kappa_id = self.kappa.ok_or_else(|| {
                    AdequacyError::InvalidConfiguration(
                        "hky site model requires a kappa parameter".into(),
                    )
                })?;
                let freqs_id = self.frequencies.ok_or_else(|| {
                    AdequacyError::InvalidConfiguration(
                        "hky site model requires a frequencies parameter".into(),
                    )
                })?;
                let kappa = graph.real(kappa_id)?.values[0];
                let param = graph.real(freqs_id)?;
                if param.dimension() != 4 {
                    return Err(AdequacyError::InvalidConfiguration(format!(
                        "frequencies parameter '{}' must have dimension 4, has {}",
                        graph.name(freqs_id),
                        param.dimension()
                    )));
                }
                let total: f64 = param.values.iter().sum();
                if total <= 0.0 {
                    return Err(AdequacyError::Validation(format!(
                        "frequencies parameter '{}' sums to {}",
                        graph.name(freqs_id),
                        total
                    )));
                }
                let mut freqs = [0.0; 4];
                for (f, v) in freqs.iter_mut().zip(&param.values) {
                    *f = v / total;
                }
                Ok(SubstitutionModel::Hky { kappa, freqs })
            }
        }
    }
}

/// Binding of a clock model to its rate parameter, if any.
#[derive(Debug, Clone)]
pub struct ClockBinding {
    pub kind: ClockKind,
    pub rate: Option<GraphId>,
}

impl ClockBinding {
    pub fn is_strict(&self) -> bool {
        self.kind == ClockKind::Strict
    }

    /// A strict clock carries its trace-assigned rate; any other clock is
    /// neutralized, since branch lengths already absorbed per-branch rates.
    pub fn materialize(&self, graph: &ModelGraph) -> PpResult<ClockModel> {
        if !self.is_strict() {
            return Ok(ClockModel::neutral());
        }
        match self.rate {
            Some(id) => Ok(ClockModel {
                rate: graph.real(id)?.values[0],
            }),
            None => Ok(ClockModel::neutral()),
        }
    }
}

/// Draws synthetic alignments on a tree under a substitution and clock model.
pub struct SequenceSimulator {
    site_count: usize,
    rng: fastrand::Rng,
}

impl SequenceSimulator {
    pub fn new(site_count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        Self { site_count, rng }
    }

    /// Evolve one alignment down `tree`.
    pub fn simulate(
        &mut self,
        id: &str,
        tree: &Tree,
        model: &SubstitutionModel,
        clock: &ClockModel,
    ) -> PpResult<Alignment> {
        if self.site_count == 0 {
            return Err(AdequacyError::Validation(
                "cannot simulate an alignment of zero sites".into(),
            ));
        }
        if tree.leaf_count() == 0 {
            return Err(AdequacyError::Validation(
                "cannot simulate on a tree with no leaves".into(),
            ));
        }

        let mut states: Vec<Vec<u8>> = vec![Vec::new(); tree.node_count()];

        let root_cum = cumulative(&model.frequencies());
        let mut root_states = Vec::with_capacity(self.site_count);
        for _ in 0..self.site_count {
            root_states.push(sample_state(&root_cum, self.rng.f64()) as u8);
        }
        states[tree.root()] = root_states;

        for id_node in tree.iter_preorder() {
            let Some(parent) = tree.node(id_node).parent else {
                continue;
            };
            let distance = tree.branch_length(id_node) * clock.rate;
            let probs = model.transition_probs(distance.max(0.0));
            let rows: Vec<[f64; 4]> = probs.iter().map(|row| cumulative(row)).collect();
            let mut seq = Vec::with_capacity(self.site_count);
            for site in 0..self.site_count {
                let from = states[parent][site] as usize;
                seq.push(sample_state(&rows[from], self.rng.f64()) as u8);
            }
            states[id_node] = seq;
        }

        const DECODE: [char; 4] = ['A', 'C', 'G', 'T'];
        let mut sequences = Vec::with_capacity(tree.leaf_count());
        for leaf in tree.leaves() {
            let name = tree
                .node(leaf)
                .name
                .clone()
                .unwrap_or_else(|| format!("taxon{}", leaf));
            let seq: String = states[leaf]
                .iter()
                .map(|&s| DECODE[s as usize])
                .collect();
            sequences.push((name, seq));
        }
        Alignment::from_sequences(id, &sequences)
    }
}

fn cumulative(row: &[f64; 4]) -> [f64; 4] {
    let mut cum = [0.0; 4];
    let mut acc = 0.0;
    for (c, &p) in cum.iter_mut().zip(row) {
        acc += p;
        *c = acc;
    }
    // Pin the last entry so a draw of exactly 1.0 cannot fall past the end.
    cum[3] = 1.0;
    cum
}

fn sample_state(cumulative: &[f64; 4], u: f64) -> usize {
    for (i, &c) in cumulative.iter().enumerate() {
        if u <= c {
            return i;
        }
    }
    3
}
