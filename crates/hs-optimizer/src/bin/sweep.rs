//! hs-sweep: drive a HyperSweep search from the command line.
//!
//! Each invocation rebuilds the optimizer from a search configuration and
//! replays the state archive, so proposals and records can happen in
//! separate processes with evaluations run in between.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hs_optimizer::{
    ArchivedEvaluation, HyperOptimizer, JsonConfigSerializer, SearchConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hs-sweep")]
#[command(version)]
#[command(
    about = "Ask/tell hyperparameter search with a durable evaluation log",
    long_about = None
)]
struct Cli {
    /// Search configuration (JSON)
    #[arg(short, long, global = true, default_value = "sweep.json")]
    config: PathBuf,

    /// Evaluation archive, created on first record
    #[arg(short, long, global = true, default_value = "sweep_state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Propose a batch and write one configuration file per proposal
    Propose {
        #[arg(short, long, default_value = "4")]
        batch_size: usize,

        /// Directory receiving the configuration files
        #[arg(short, long, default_value = "configs")]
        out_dir: PathBuf,

        /// File names to use instead of eval_{n}.json
        #[arg(long, value_delimiter = ',')]
        names: Option<Vec<String>>,
    },

    /// Record evaluated configurations from a JSON list of
    /// {"config": {...}, "objective": ..., "checkpoint": ...}
    Record {
        #[arg(short, long)]
        results: PathBuf,
    },

    /// Print the best k configurations
    Best {
        #[arg(short, default_value = "5")]
        k: usize,
    },

    /// Export the evaluation log as CSV (stdout without --csv)
    Export {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn load_optimizer(config_path: &Path, state: &Path) -> Result<HyperOptimizer> {
    let config = SearchConfig::from_path(config_path)
        .with_context(|| format!("reading search configuration {}", config_path.display()))?;
    let reload = state.exists().then_some(state);
    let optimizer = config
        .build(reload)
        .with_context(|| format!("building optimizer for '{}'", config.name))?;
    info!(
        "Search '{}' resumed with {} evaluations",
        config.name,
        optimizer.eval_count()
    );
    Ok(optimizer)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut optimizer = load_optimizer(&cli.config, &cli.state)?;

    match cli.command {
        Commands::Propose {
            batch_size,
            out_dir,
            names,
        } => {
            let serializer = JsonConfigSerializer::new(&out_dir)?;
            let mut optimizer = optimizer.with_serializer(Box::new(serializer));
            match optimizer.propose_and_store(batch_size, names.as_deref()) {
                Ok(stored) => {
                    for proposal in stored {
                        println!("{}", proposal.path.display());
                    }
                }
                Err(err) if err.is_exhausted() => println!("{err}"),
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Record { results } => {
            let raw = std::fs::read_to_string(&results)
                .with_context(|| format!("reading results {}", results.display()))?;
            let evaluations: Vec<ArchivedEvaluation> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing results {}", results.display()))?;
            let outcome = optimizer.replay(evaluations)?;
            optimizer.save(&cli.state)?;
            println!(
                "accepted {} evaluations, {} duplicates, {} total",
                outcome.accepted.len(),
                outcome.duplicates.len(),
                optimizer.eval_count()
            );
        }
        Commands::Best { k } => {
            let k = k.min(optimizer.eval_count());
            for line in optimizer.ranking_report(k)? {
                println!("{line}");
            }
        }
        Commands::Export { csv } => {
            let table = optimizer.export_tabular();
            match csv {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    table.write_csv(file)?;
                    info!("Exported {} rows to {}", table.rows.len(), path.display());
                }
                None => table.write_csv(std::io::stdout().lock())?,
            }
        }
    }
    Ok(())
}
