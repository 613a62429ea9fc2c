mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "epl-predictor")]
#[command(about = "Rolling-form features and outcome predictions for Premier League matches")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Initialize the database
    InitDb,
    /// Clean the raw CSV sources and store the match history
    Ingest,
    /// Store a synthetic match history instead of real data
    Sample {
        #[arg(short, long, default_value = "500")]
        count: usize,
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Build the training feature matrix from the stored history
    Features,
    /// Train and evaluate the outcome classifier
    Train,
    /// Predict the outcome of a single fixture
    Predict {
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
        /// Match date, e.g. 2024-05-19
        #[arg(short, long)]
        date: String,
    },
    /// Query a team's rolling form
    Team {
        #[arg(short, long)]
        name: String,
        /// Reference date; defaults to now
        #[arg(short, long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the subscriber reads RUST_LOG
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting EPL predictor API server on port {}", port);
            api::serve(settings, port).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&settings).await?;
        }
        Some(Commands::Ingest) => {
            tracing::info!("Ingesting raw match data...");
            cli::ingest(&settings).await?;
        }
        Some(Commands::Sample { count, seed }) => {
            tracing::info!("Generating {} sample matches", count);
            cli::generate_sample(&settings, count, seed).await?;
        }
        Some(Commands::Features) => {
            tracing::info!("Building features with window {}", settings.rolling_window);
            cli::build_features(&settings).await?;
        }
        Some(Commands::Train) => {
            tracing::info!("Training outcome model...");
            cli::train(&settings).await?;
        }
        Some(Commands::Predict { home, away, date }) => {
            tracing::info!("Predicting {} vs {} on {}", home, away, date);
            cli::predict(&settings, &home, &away, &date).await?;
        }
        Some(Commands::Team { name, date }) => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&settings, &name, date.as_deref()).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting EPL predictor API server on port 3000");
            api::serve(settings, 3000).await?;
        }
    }

    Ok(())
}
