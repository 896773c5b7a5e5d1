//! The chain harness: one Markov step at a time, propose → recalculate →
//! accept-or-reject → store-or-restore, with a tab-separated state logger in
//! the same format the trace reader consumes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{AdequacyError, PpResult};
use crate::likelihood::BufferedTreeLikelihood;
use crate::model::{Checkpoint, GraphId, ModelGraph, StateValue};
use crate::operators::{choose_proposal, Proposal};

/// Writes sampled state to a trace log: a `Sample` column, the posterior,
/// then one column per logged scalar (vector parameters expand to
/// `name.1 .. name.k`).
pub struct StateLogger {
    writer: BufWriter<File>,
    columns: Vec<GraphId>,
}

impl StateLogger {
    pub fn create<P: AsRef<Path>>(
        path: P,
        graph: &ModelGraph,
        columns: Vec<GraphId>,
    ) -> PpResult<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "Sample\tposterior")?;
        for &id in &columns {
            match graph.state_value(id) {
                Some(StateValue::Real(p)) if p.dimension() > 1 => {
                    for j in 1..=p.dimension() {
                        write!(writer, "\t{}.{}", graph.name(id), j)?;
                    }
                }
                _ => write!(writer, "\t{}", graph.name(id))?,
            }
        }
        writeln!(writer)?;
        Ok(Self { writer, columns })
    }

    pub fn log(&mut self, sample: u64, posterior: f64, graph: &ModelGraph) -> PpResult<()> {
        write!(self.writer, "{}\t{}", sample, posterior)?;
        for &id in &self.columns {
            match graph.state_value(id) {
                Some(StateValue::Real(p)) => {
                    for v in &p.values {
                        write!(self.writer, "\t{}", v)?;
                    }
                }
                Some(StateValue::Int(p)) => write!(self.writer, "\t{}", p.value)?,
                _ => write!(self.writer, "\tNA")?,
            }
        }
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> PpResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct ChainOptions {
    pub length: u64,
    pub log_every: u64,
    pub seed: Option<u64>,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            length: 100_000,
            log_every: 1_000,
            seed: None,
        }
    }
}

#[derive(Debug)]
pub struct ChainSummary {
    pub steps: u64,
    pub accepted: u64,
    pub final_log_p: f64,
}

/// A single-threaded Metropolis-Hastings chain over the model graph.
pub struct Chain {
    pub graph: ModelGraph,
    pub likelihood: BufferedTreeLikelihood,
    proposals: Vec<Box<dyn Proposal>>,
    logger: Option<StateLogger>,
}

impl Chain {
    pub fn new(graph: ModelGraph, likelihood: BufferedTreeLikelihood) -> Self {
        Self {
            graph,
            likelihood,
            proposals: Vec::new(),
            logger: None,
        }
    }

    pub fn add_proposal(&mut self, proposal: Box<dyn Proposal>) {
        self.proposals.push(proposal);
    }

    pub fn set_logger(&mut self, logger: StateLogger) {
        self.logger = Some(logger);
    }

    pub fn run(&mut self, options: &ChainOptions) -> PpResult<ChainSummary> {
        if self.proposals.is_empty() {
            return Err(AdequacyError::InvalidConfiguration(
                "chain has no proposals".into(),
            ));
        }
        let mut rng = match options.seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        let log_every = options.log_every.max(1);

        let mut current_log_p = self.likelihood.log_likelihood(&self.graph)?;
        info!("chain start: log P = {:.4}", current_log_p);
        if let Some(logger) = self.logger.as_mut() {
            logger.log(0, current_log_p, &self.graph)?;
        }

        let mut accepted = 0u64;
        for step in 1..=options.length {
            // Store, then propose.
            self.graph.store_all();
            self.likelihood.checkpoint(&self.graph);

            let log_hastings = match choose_proposal(&mut self.proposals, &mut rng) {
                Some(proposal) => proposal.propose(&mut self.graph)?,
                None => {
                    return Err(AdequacyError::InvalidConfiguration(
                        "no proposal could be selected".into(),
                    ))
                }
            };

            // The dirty check must complete before any data read: it is what
            // re-seeds the evaluator when the active alignment changed.
            let dirty = self.likelihood.requires_recalculation(&self.graph)?;
            let proposed_log_p = if dirty {
                self.likelihood.log_likelihood(&self.graph)?
            } else {
                current_log_p
            };

            let accept = if log_hastings == f64::INFINITY {
                true
            } else if log_hastings == f64::NEG_INFINITY {
                false
            } else {
                let log_alpha = proposed_log_p - current_log_p + log_hastings;
                log_alpha >= 0.0 || rng.f64() < log_alpha.exp()
            };

            if accept {
                self.graph.accept_all();
                self.likelihood.accept(&self.graph);
                current_log_p = proposed_log_p;
                accepted += 1;
            } else {
                self.graph.restore_all();
                self.likelihood.rollback(&self.graph);
            }

            if step % log_every == 0 {
                debug!("step {}: log P = {:.4}", step, current_log_p);
                if let Some(logger) = self.logger.as_mut() {
                    logger.log(step, current_log_p, &self.graph)?;
                }
            }
        }

        if let Some(logger) = self.logger.as_mut() {
            logger.flush()?;
        }
        info!(
            "chain finished: {} / {} proposals accepted",
            accepted, options.length
        );
        Ok(ChainSummary {
            steps: options.length,
            accepted,
            final_log_p: current_log_p,
        })
    }
}
