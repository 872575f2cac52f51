//! luckydraw Server Binary
//!
//! Starts the TCP server for luckydraw.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use luckydraw::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// luckydraw Server
#[derive(Parser, Debug)]
#[command(name = "luckydraw-server")]
#[command(about = "Parallel contest-result server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, env = "SERVER_LISTEN", default_value = "0.0.0.0:12345")]
    listen: String,

    /// Port override for the listen address
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Accept backlog
    #[arg(short, long, env = "SERVER_LISTEN_BACKLOG", default_value = "7")]
    backlog: u32,

    /// Worker threads (default: available cores minus two, at least one)
    #[arg(short, long, env = "SERVER_WORKERS")]
    workers: Option<usize>,

    /// Winners file
    #[arg(short, long, env = "SERVER_RESULTS_PATH", default_value = "./winners")]
    results: String,

    /// Draw modulus: a contestant wins when its hash is divisible by it
    #[arg(long, env = "DRAW_MODULUS", default_value = "17")]
    modulus: u32,

    /// Simulated evaluation cost per contestant, in milliseconds
    #[arg(long, env = "DRAW_EVALUATION_DELAY_MS", default_value = "1")]
    evaluation_delay_ms: u64,

    /// Join window for all threads after a termination signal, in milliseconds
    #[arg(long, default_value = "5000")]
    shutdown_timeout_ms: u64,
}

fn init_tracing() {
    // RUST_LOG wins; LOGGING_LEVEL (e.g. DEBUG) is honoured for deployments
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOGGING_LEVEL")
                .map_err(|e| e.to_string())
                .and_then(|level| {
                    EnvFilter::try_new(level.to_lowercase()).map_err(|e| e.to_string())
                })
        })
        .unwrap_or_else(|_| EnvFilter::new("info,luckydraw=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

fn listen_addr(args: &Args) -> Result<String, String> {
    match args.port {
        None => Ok(args.listen.clone()),
        Some(port) => {
            let mut addr: SocketAddr = args
                .listen
                .parse()
                .map_err(|e| format!("invalid listen address {:?}: {}", args.listen, e))?;
            addr.set_port(port);
            Ok(addr.to_string())
        }
    }
}

fn main() {
    init_tracing();
    let args = Args::parse();

    tracing::info!("luckydraw Server v{}", luckydraw::VERSION);

    let listen = match listen_addr(&args) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    // Build config from args
    let mut builder = Config::builder()
        .listen_addr(listen)
        .listen_backlog(args.backlog)
        .results_path(&args.results)
        .winner_modulus(args.modulus)
        .evaluation_delay(Duration::from_millis(args.evaluation_delay_ms))
        .shutdown_timeout(Duration::from_millis(args.shutdown_timeout_ms));
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    let config = builder.build();

    tracing::info!("Results file: {}", config.results_path.display());
    tracing::info!("Worker pool size: {}", config.workers);

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    // SIGINT / SIGTERM only trigger the shutdown context
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown.trigger() {
            tracing::info!("Termination signal received");
        }
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    match server.run() {
        Ok(report) => {
            if !report.is_clean() {
                tracing::warn!("Units left running at exit: {:?}", report.stragglers);
            }
            tracing::info!("Server stopped");
            std::process::exit(luckydraw::TERMINATION_EXIT_CODE);
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}
