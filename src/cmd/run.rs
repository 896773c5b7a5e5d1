use clap::Args;
use tracing::info;

use ppcheck::chain::{ChainOptions, StateLogger};
use ppcheck::config::Config;
use ppcheck::descriptor::AnalysisDescriptor;
use ppcheck::error::PpResult;
use ppcheck::posterior::{TraceTable, TreeLog};
use ppcheck::replicates::generate_replicates;
use ppcheck::setup;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: Config,

    /// Number of chain steps to run over the alignment catalog.
    #[arg(long, default_value_t = 100_000)]
    pub chain_length: u64,

    /// Log the state every this many steps.
    #[arg(long, default_value_t = 1_000)]
    pub log_every: u64,

    #[arg(short = 'S', long)]
    pub seed: Option<u64>,
}

pub fn run(args: RunArgs) -> PpResult<()> {
    args.config.validate()?;
    info!("Setting up the analysis");

    let descriptor = AnalysisDescriptor::load_from_file(&args.config.xml)?;
    let mut analysis = descriptor.build()?;
    let analysis_id = analysis.id.clone();

    let trace = TraceTable::from_path(
        args.config.log_path(&analysis.trace_log),
        args.config.burn_in_percentage,
    )?;
    let mut trees = TreeLog::from_path(
        args.config.log_path(&analysis.tree_log),
        args.config.burn_in_percentage,
    )?;
    info!(
        "posterior sample: {} trace rows, {} trees",
        trace.n_rows(),
        trees.remaining()
    );

    let replicates = generate_replicates(
        &mut analysis,
        &trace,
        &mut trees,
        args.config.replicate_count,
        args.seed,
    )?;

    setup::write_rewired_descriptor(
        &descriptor,
        replicates.len(),
        args.config
            .log_path(&format!("{}.adequacy.json", analysis_id)),
    )?;

    let mut run = setup::configure_run(analysis, replicates)?;
    // Log every sampled scalar plus the indicator the setup appended to the
    // state; the tree stays out of the trace log.
    let columns: Vec<_> = run
        .chain
        .graph
        .state_nodes()
        .iter()
        .copied()
        .filter(|&id| {
            !matches!(
                run.chain.graph.state_value(id),
                Some(ppcheck::model::StateValue::Tree(_))
            )
        })
        .collect();
    let logger = StateLogger::create(
        args.config
            .log_path(&format!("{}.adequacy.log", analysis_id)),
        &run.chain.graph,
        columns,
    )?;
    run.chain.set_logger(logger);

    info!("Done set up. Start running the analysis");
    let summary = run.chain.run(&ChainOptions {
        length: args.chain_length,
        log_every: args.log_every,
        seed: args.seed,
    })?;
    info!(
        "finished: {} steps, {} accepted, final log P = {:.4}",
        summary.steps, summary.accepted, summary.final_log_p
    );
    Ok(())
}
