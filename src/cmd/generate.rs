use std::fs;

use clap::Args;
use comfy_table::Table;
use tracing::info;

use ppcheck::alignment::AlignmentSource;
use ppcheck::config::Config;
use ppcheck::descriptor::AnalysisDescriptor;
use ppcheck::error::PpResult;
use ppcheck::posterior::{TraceTable, TreeLog};
use ppcheck::replicates::generate_replicates;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub config: Config,

    #[arg(short = 'S', long)]
    pub seed: Option<u64>,
}

pub fn run(args: GenerateArgs) -> PpResult<()> {
    args.config.validate()?;

    let descriptor = AnalysisDescriptor::load_from_file(&args.config.xml)?;
    let mut analysis = descriptor.build()?;

    let trace = TraceTable::from_path(
        args.config.log_path(&analysis.trace_log),
        args.config.burn_in_percentage,
    )?;
    let mut trees = TreeLog::from_path(
        args.config.log_path(&analysis.tree_log),
        args.config.burn_in_percentage,
    )?;

    let replicates = generate_replicates(
        &mut analysis,
        &trace,
        &mut trees,
        args.config.replicate_count,
        args.seed,
    )?;

    let mut table = Table::new();
    table.set_header(vec!["Replicate", "Taxa", "Sites", "Patterns"]);
    for alignment in &replicates {
        let path = args
            .config
            .log_path(&format!("{}.{}.fasta", analysis.id, alignment.id));
        fs::write(&path, alignment.render())?;
        table.add_row(vec![
            alignment.id.clone(),
            alignment.taxon_count().to_string(),
            alignment.site_count().to_string(),
            alignment.pattern_count().to_string(),
        ]);
    }
    println!("{table}");
    info!(
        "wrote {} replicate alignments to {:?}",
        replicates.len(),
        args.config.log_directory
    );
    Ok(())
}
