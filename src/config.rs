//! Configuration for luckydraw
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DrawError, Result};

/// Main configuration for a luckydraw server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Accept backlog handed to listen(2)
    pub listen_backlog: u32,

    /// How often the acceptor re-checks the shutdown context while idle
    pub accept_poll_interval: Duration,

    // -------------------------------------------------------------------------
    // Worker Pool Configuration
    // -------------------------------------------------------------------------
    /// Number of worker threads; also the work queue capacity
    pub workers: usize,

    // -------------------------------------------------------------------------
    // Draw Configuration
    // -------------------------------------------------------------------------
    /// A contestant wins when `hash % winner_modulus == 0`
    pub winner_modulus: u32,

    /// Simulated per-contestant evaluation cost
    pub evaluation_delay: Duration,

    // -------------------------------------------------------------------------
    // Persistence Configuration
    // -------------------------------------------------------------------------
    /// Append-only file receiving one line per winner
    pub results_path: PathBuf,

    // -------------------------------------------------------------------------
    // Shutdown Configuration
    // -------------------------------------------------------------------------
    /// Join window for all execution units after the termination signal
    pub shutdown_timeout: Duration,
}

/// Default pool size: leave two cores for the acceptor and the writer
pub fn default_worker_count() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    parallelism.saturating_sub(2).max(1)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:12345".to_string(),
            listen_backlog: 7,
            accept_poll_interval: Duration::from_millis(50),
            workers: default_worker_count(),
            winner_modulus: 17,
            evaluation_delay: Duration::from_millis(1),
            results_path: PathBuf::from("./winners"),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DrawError::Config("workers must be at least 1".to_string()));
        }
        if self.winner_modulus == 0 {
            return Err(DrawError::Config(
                "winner_modulus must be at least 1".to_string(),
            ));
        }
        if self.listen_backlog == 0 {
            return Err(DrawError::Config(
                "listen_backlog must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the accept backlog
    pub fn listen_backlog(mut self, backlog: u32) -> Self {
        self.config.listen_backlog = backlog;
        self
    }

    /// Set the acceptor poll interval
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.config.accept_poll_interval = interval;
        self
    }

    /// Set the worker pool size
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count;
        self
    }

    /// Set the draw modulus
    pub fn winner_modulus(mut self, modulus: u32) -> Self {
        self.config.winner_modulus = modulus;
        self
    }

    /// Set the simulated evaluation cost per contestant
    pub fn evaluation_delay(mut self, delay: Duration) -> Self {
        self.config.evaluation_delay = delay;
        self
    }

    /// Set the result store path
    pub fn results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.results_path = path.into();
        self
    }

    /// Set the shutdown join window
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
