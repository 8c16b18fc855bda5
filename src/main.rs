use parcel_agent::arcgis::ArcGisClient;
use parcel_agent::config::Config;
use parcel_agent::kmz;
use parcel_agent::merge::LabelCache;
use parcel_agent::pipeline::{safe_folder_name, Pipeline, PipelineOptions};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "parcel-agent")]
#[command(about = "Resolve property references into parcel boundaries and export KMZ")]
#[command(version)]
struct Args {
    /// Output KMZ file (default: derived from the result label)
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// Maximum records per upstream query
    #[arg(long, global = true, default_value_t = 300)]
    max_results: u32,

    /// Allow address resolution without a house number
    #[arg(long, global = true)]
    relax_no_number: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one or more lot/plan tokens (comma separated)
    Lotplan {
        /// e.g. "4RP30439" or "4 RP30439, 7/SP181234"
        tokens: String,
    },
    /// Resolve a single free-form address line
    Address {
        /// e.g. "12 Smith Street, Brisbane, QLD 4000"
        line: String,
    },
    /// Resolve a text document (lot/plan tokens first, addresses as fallback)
    Document {
        /// Path to a plain-text file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = Config::from_env()?;
    let client = Arc::new(ArcGisClient::new(config)?);
    let pipeline = Pipeline::new(client, LabelCache::default());
    let options = PipelineOptions {
        max_results: args.max_results,
        relax_no_number: args.relax_no_number,
    };

    let mut group = match &args.command {
        Commands::Lotplan { tokens } => {
            let tokens: Vec<String> = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            pipeline.resolve_tokens(&tokens, &options).await?
        }
        Commands::Address { line } => pipeline.resolve_address_line(line, &options).await?,
        Commands::Document { path } => {
            let text = fs::read_to_string(path)?;
            pipeline.resolve_document(&text, &options).await?
        }
    };

    group.label = safe_folder_name(&group.label);
    let label = group.label.clone();
    let parcels = group.features.len();
    let bytes = kmz::serialize(&[group])?;

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{}.kmz", label)));
    fs::write(&out, bytes)?;
    info!(parcels, out = %out.display(), "wrote KMZ");
    println!("{}", out.display());
    Ok(())
}
