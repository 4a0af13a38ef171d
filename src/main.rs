//! Demand forecasting CLI.
//!
//! # Usage
//!
//! ```text
//! demand-forecast import rows.json            # load history into SQLite
//! demand-forecast train                       # fit all four models
//! demand-forecast predict request.json        # one prediction
//! demand-forecast batch < batch.json          # up to 100 predictions
//! demand-forecast models                      # availability + metrics
//! ```
//!
//! Results are written to stdout as JSON; logs go to stderr.

mod config;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forecast::{DirectoryStore, PredictorService, Trainer};
use history::{HistorySource, SqliteHistory};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use types::{BatchRequest, HistoricalRow, PredictionRequest};

use config::{CommonArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(name = "demand-forecast")]
#[command(about = "Forecast monthly healthcare attention demand")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train models from history and write artifacts
    Train(TrainArgs),
    /// Predict one request (JSON file, or stdin when omitted)
    Predict {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Predict a batch request (JSON file, or stdin when omitted)
    Batch {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// List model availability and test metrics
    Models,
    /// Append historical rows (JSON array) to the history database
    Import {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let common = &cli.common;

    match &cli.command {
        Commands::Train(args) => {
            let trainer = Trainer::new(
                args.training_config(common),
                open_history(&common.history_db)?,
                Arc::new(DirectoryStore::new(&common.artifact_dir)),
            );
            info!(dir = %common.artifact_dir.display(), "Training into artifact directory");
            match args.model {
                Some(kind) => print_json(&trainer.train(kind)?)?,
                None => print_json(&trainer.train_all()?)?,
            }
        }
        Commands::Predict { input } => {
            let request: PredictionRequest = read_json(input.as_deref())?;
            let service = predictor(common)?;
            print_json(&service.predict_one(&request)?)?;
        }
        Commands::Batch { input } => {
            let batch: BatchRequest = read_json(input.as_deref())?;
            let service = predictor(common)?;
            print_json(&service.predict_batch(&batch)?)?;
        }
        Commands::Models => {
            let service = predictor(common)?;
            print_json(&service.model_catalog())?;
        }
        Commands::Import { input } => {
            let rows: Vec<HistoricalRow> = read_json(Some(input.as_path()))?;
            if let Some(parent) = common.history_db.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let db = SqliteHistory::open(&common.history_db)
                .with_context(|| format!("opening {}", common.history_db.display()))?;
            let inserted = db.insert_rows(&rows)?;
            info!(inserted, total = db.row_count()?, "Import complete");
        }
    }

    Ok(())
}

fn open_history(path: &Path) -> anyhow::Result<Arc<dyn HistorySource>> {
    let db = SqliteHistory::open(path)
        .with_context(|| format!("opening history database {}", path.display()))?;
    Ok(Arc::new(db))
}

fn predictor(common: &CommonArgs) -> anyhow::Result<PredictorService> {
    let history = open_history(&common.history_db)?;
    PredictorService::from_config(common.forecast_config(), history)
        .context("invalid forecast configuration")
}

fn read_json<T: DeserializeOwned>(path: Option<&Path>) -> anyhow::Result<T> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            serde_json::from_str(&buf).context("parsing stdin")
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
