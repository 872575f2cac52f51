//! luckydraw CLI Client
//!
//! Sends a dataset to the server in batches and reports the winners.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use luckydraw::client::{dataset, DrawClient};
use luckydraw::DrawError;
use tracing_subscriber::{fmt, EnvFilter};

/// luckydraw CLI
#[derive(Parser, Debug)]
#[command(name = "luckydraw-cli")]
#[command(about = "Submit contestants to a luckydraw server")]
struct Args {
    /// Server address
    #[arg(short, long, env = "CLI_SERVER_ADDRESS", default_value = "127.0.0.1:12345")]
    server: String,

    /// Dataset file, one `first,last,document,YYYY-MM-DD` per line
    #[arg(short, long, env = "CLI_DATASET_PATH")]
    dataset: PathBuf,

    /// Contestants per request
    #[arg(short, long, env = "CLI_BATCH_SIZE", default_value = "100")]
    batch_size: usize,

    /// Client identifier used in logs
    #[arg(long, env = "CLI_ID", default_value = "1")]
    id: String,

    /// Log every winner, not only the per-batch counts
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let span = tracing::info_span!("client", id = %args.id);
    let _enter = span.enter();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || stop_flag.store(true, Ordering::SeqCst)) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    let contestants = match dataset::read_dataset(&args.dataset) {
        Ok(contestants) => contestants,
        Err(e) => {
            tracing::error!("Could not read dataset {}: {}", args.dataset.display(), e);
            std::process::exit(1);
        }
    };

    let mut client = match DrawClient::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Could not connect to server {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let mut sent = 0usize;
    let mut winners_total = 0usize;
    for (batch_number, batch) in contestants.chunks(args.batch_size.max(1)).enumerate() {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("Termination signal received");
            let _ = client.close();
            std::process::exit(luckydraw::TERMINATION_EXIT_CODE);
        }

        let winners = match client.submit(batch) {
            Ok(winners) => winners,
            Err(DrawError::Application(message)) => {
                tracing::error!("Application logic error: {}", message);
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!("Error: {}", e);
                std::process::exit(1);
            }
        };

        sent += batch.len();
        winners_total += winners.len();
        tracing::info!("Batch {}: {} winners", batch_number + 1, winners.len());
        if args.verbose {
            for winner in &winners {
                tracing::info!(
                    "Winner: {} {} | Document: {} | Birthdate: {}",
                    winner.first_name(),
                    winner.last_name(),
                    winner.document(),
                    winner.birth_date_iso()
                );
            }
        }
    }

    if let Err(e) = client.close() {
        tracing::warn!("Could not close socket connection: {}", e);
    }

    tracing::info!("Winners amount: {}", winners_total);
    tracing::info!("Total participants amount: {}", sent);
    if sent > 0 {
        tracing::info!(
            "Finished participants evaluations, winner rate is: {:.4}",
            winners_total as f64 / sent as f64
        );
    }
}
