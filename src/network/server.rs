//! TCP Server
//!
//! Wires the acceptor, the worker pool and the persistence writer
//! together, and coordinates their shutdown.
//!
//! ## Shutdown order
//! 1. Acceptor stops, closing the listener and any connection in hand
//! 2. Trigger: live worker streams are shut down, idle units wake up
//! 3. Workers exit, draining unclaimed connections from the Work Queue
//! 4. Remaining Work Queue items are closed, then the sentinel is sent
//! 5. Writer drains everything before the sentinel and closes the store
//!
//! Every wait in steps 3–5 shares one join window.

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::Config;
use crate::contest::{HashDraw, WinnerPredicate};
use crate::error::{DrawError, Result};
use crate::persist::{writer_queue, ResultWriter, WriterMessage, WriterStats};
use crate::shutdown::Shutdown;
use super::acceptor::{bind_listener, Acceptor};
use super::connection::ConnectionSummary;
use super::queue::{drain_work_queue, work_queue};
use super::worker::{Worker, WorkerReport};

const WRITER_UNIT: &str = "writer";

// =============================================================================
// Statistics
// =============================================================================

/// Live counters shared by the acceptor and the workers
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicU64,
    peak_queue_depth: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
    contestants: AtomicU64,
    winners: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    /// Deepest Work Queue observed right after an admission
    pub peak_queue_depth: usize,
    /// Connections currently being served
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub requests: u64,
    pub contestants: u64,
    pub winners: u64,
}

impl ServerStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_depth(&self, depth: usize) {
        self.peak_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self, waited: Duration) {
        self.active.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Connection waited {:?} in the work queue", waited);
    }

    pub(crate) fn record_connection(&self, summary: &ConnectionSummary, failed: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.requests.fetch_add(summary.requests, Ordering::Relaxed);
        self.contestants.fetch_add(summary.contestants, Ordering::Relaxed);
        self.winners.fetch_add(summary.winners, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            contestants: self.contestants.load(Ordering::Relaxed),
            winners: self.winners.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a completed [`Server::run`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub stats: StatsSnapshot,
    pub workers: WorkerReport,
    pub writer: WriterStats,
    /// Connections closed unserved by the coordinator itself
    pub drained: usize,
    /// Units that did not reach a terminal state within the join window
    pub stragglers: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.stragglers.is_empty()
    }
}

// =============================================================================
// Unit bookkeeping
// =============================================================================

/// Reports the unit as finished when its thread body ends, panics included
struct DoneGuard {
    name: String,
    done: Sender<String>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.done.send(std::mem::take(&mut self.name));
    }
}

fn spawn_unit<T, F>(name: String, done: &Sender<String>, body: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = DoneGuard {
        name: name.clone(),
        done: done.clone(),
    };
    let handle = thread::Builder::new().name(name).spawn(move || {
        let _guard = guard;
        body()
    })?;
    Ok(handle)
}

/// Wait until every unit in `group` has reported, or the deadline passes
fn await_units(
    done: &Receiver<String>,
    pending: &mut HashSet<String>,
    group: &[String],
    deadline: Instant,
) {
    while group.iter().any(|name| pending.contains(name)) {
        match done.recv_deadline(deadline) {
            Ok(name) => {
                tracing::debug!("Unit {} reached a terminal state", name);
                pending.remove(&name);
            }
            Err(_) => break,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// TCP server for luckydraw
pub struct Server {
    config: Config,
    listener: TcpListener,
    predicate: Arc<dyn WinnerPredicate>,
    shutdown: Shutdown,
    stats: Arc<ServerStats>,
}

impl Server {
    /// Bind a server that draws with [`HashDraw`] as configured
    pub fn bind(config: Config) -> Result<Self> {
        let predicate = Arc::new(HashDraw::new(
            config.winner_modulus,
            config.evaluation_delay,
        ));
        Self::bind_with_predicate(config, predicate)
    }

    /// Bind a server with a caller-supplied predicate
    pub fn bind_with_predicate(
        config: Config,
        predicate: Arc<dyn WinnerPredicate>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = bind_listener(&config.listen_addr, config.listen_backlog)?;
        tracing::info!(
            "Listening on {} (backlog {}, {} workers)",
            listener.local_addr()?,
            config.listen_backlog,
            config.workers
        );

        Ok(Self {
            config,
            listener,
            predicate,
            shutdown: Shutdown::new(),
            stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for triggering shutdown from another thread or a signal handler
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Start the server (blocking)
    ///
    /// The calling thread becomes the acceptor. Returns once shutdown has
    /// been triggered and every unit has terminated or the join window has
    /// elapsed.
    pub fn run(self) -> Result<ShutdownReport> {
        let Server {
            config,
            listener,
            predicate,
            shutdown,
            stats,
        } = self;

        let (work_tx, work_rx) = work_queue(config.workers);
        let (winners_tx, winners_rx) = writer_queue();
        let (done_tx, done_rx) = channel::unbounded::<String>();
        let mut pending: HashSet<String> = HashSet::new();

        // Persistence writer: the only owner of the result store
        let writer = ResultWriter::open(
            &config.results_path,
            winners_rx,
            shutdown.clone(),
            config.shutdown_timeout,
        )?;
        let writer_handle = spawn_unit(WRITER_UNIT.to_string(), &done_tx, move || writer.run())?;
        pending.insert(WRITER_UNIT.to_string());

        // Worker pool
        let mut failure: Option<DrawError> = None;
        let mut worker_handles = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let name = format!("worker-{}", id);
            let worker = Worker::new(
                id,
                work_rx.clone(),
                winners_tx.clone(),
                Arc::clone(&predicate),
                shutdown.clone(),
                Arc::clone(&stats),
            );
            match spawn_unit(name.clone(), &done_tx, move || worker.run()) {
                Ok(handle) => {
                    pending.insert(name.clone());
                    worker_handles.push((name, handle));
                }
                Err(e) => {
                    tracing::error!("Failed to spawn {}: {}", name, e);
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(done_tx);

        // Acceptor runs on this thread until shutdown
        if failure.is_none() {
            let acceptor = Acceptor::new(
                listener,
                work_tx,
                shutdown.clone(),
                config.accept_poll_interval,
                Arc::clone(&stats),
            );
            if let Err(e) = acceptor.run() {
                tracing::error!("Acceptor failed: {}", e);
                failure = Some(e);
            }
        } else {
            drop(listener);
            drop(work_tx);
        }

        if shutdown.trigger() {
            tracing::info!("Shutdown initiated by the acceptor");
        }
        let deadline = Instant::now() + config.shutdown_timeout;
        let mut report = ShutdownReport::default();

        // Workers first: they are the only producers for the writer
        let worker_names: Vec<String> = worker_handles.iter().map(|(n, _)| n.clone()).collect();
        await_units(&done_rx, &mut pending, &worker_names, deadline);
        for (name, handle) in worker_handles {
            if pending.contains(&name) {
                tracing::error!("{} did not terminate within the join window", name);
                report.stragglers.push(name);
                continue;
            }
            match handle.join() {
                Ok(worker) => {
                    report.workers.connections += worker.connections;
                    report.workers.failed_connections += worker.failed_connections;
                    report.workers.requests += worker.requests;
                    report.workers.drained += worker.drained;
                }
                Err(_) => tracing::error!("{} panicked", name),
            }
        }

        report.drained = drain_work_queue(&work_rx);
        drop(work_rx);
        tracing::info!("Closed work queue");

        if let Err(e) = winners_tx.send(WriterMessage::Terminate) {
            tracing::warn!("Writer queue already closed, sentinel not delivered: {}", e);
        }
        drop(winners_tx);

        await_units(&done_rx, &mut pending, &[WRITER_UNIT.to_string()], deadline);
        if pending.contains(WRITER_UNIT) {
            tracing::error!("Writer did not terminate within the join window");
            report.stragglers.push(WRITER_UNIT.to_string());
        } else {
            match writer_handle.join() {
                Ok(Ok(writer_stats)) => report.writer = writer_stats,
                Ok(Err(e)) => tracing::error!("Writer failed while closing: {}", e),
                Err(_) => tracing::error!("Writer panicked"),
            }
        }

        report.stats = stats.snapshot();
        tracing::info!(
            "Server stopped: {} connections accepted, {} requests, {} winners persisted, {} stragglers",
            report.stats.accepted,
            report.stats.requests,
            report.writer.winners,
            report.stragglers.len()
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
