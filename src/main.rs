use clap::{Parser, Subcommand};
use std::process;
use tracing::error;

mod cmd;

#[derive(Parser, Debug)]
#[command(author, version, about = "Posterior-predictive model adequacy checks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate replicates and extend the chain over the alignment catalog.
    Run(cmd::run::RunArgs),
    /// Generate replicate alignments and write them as FASTA.
    Generate(cmd::generate::GenerateArgs),
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(args),
        Commands::Generate(args) => cmd::generate::run(args),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
