//! Worker
//!
//! One long-lived execution unit of the pool. A worker serves one
//! connection at a time and is reused for as many connections as arrive;
//! a failing connection never ends the worker.
//!
//! ```text
//! Idle ──recv──▶ Active ──close/error──▶ Idle
//!   │                │
//!   └──shutdown──────┴──▶ Terminating ──▶ Exited
//! ```

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use crossbeam::select;

use crate::contest::WinnerPredicate;
use crate::error::{DrawError, FailureKind};
use crate::persist::WriterMessage;
use crate::shutdown::Shutdown;
use super::connection::Connection;
use super::queue::{drain_work_queue, WorkItem};
use super::server::ServerStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Active,
    Terminating,
    Exited,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Active => "active",
            WorkerState::Terminating => "terminating",
            WorkerState::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Totals reported by a worker when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub connections: u64,
    pub failed_connections: u64,
    pub requests: u64,
    /// Unclaimed connections closed during shutdown
    pub drained: usize,
}

pub struct Worker {
    id: usize,
    state: WorkerState,
    queue: Receiver<WorkItem>,
    winners: Sender<WriterMessage>,
    predicate: Arc<dyn WinnerPredicate>,
    shutdown: Shutdown,
    stats: Arc<ServerStats>,
    report: WorkerReport,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Receiver<WorkItem>,
        winners: Sender<WriterMessage>,
        predicate: Arc<dyn WinnerPredicate>,
        shutdown: Shutdown,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            queue,
            winners,
            predicate,
            shutdown,
            stats,
            report: WorkerReport::default(),
        }
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::trace!("Worker {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Serve connections until shutdown
    pub fn run(mut self) -> WorkerReport {
        tracing::debug!("Worker {} started", self.id);

        loop {
            self.transition(WorkerState::Idle);

            let item = select! {
                recv(self.queue) -> item => match item {
                    Ok(item) => item,
                    Err(_) => break,
                },
                recv(self.shutdown.signal()) -> _ => break,
            };

            if self.shutdown.is_triggered() {
                item.close();
                self.report.drained += 1;
                break;
            }

            self.transition(WorkerState::Active);
            self.serve(item);
        }

        self.transition(WorkerState::Terminating);
        self.report.drained += drain_work_queue(&self.queue);
        self.transition(WorkerState::Exited);

        let Worker {
            id,
            winners,
            queue,
            report,
            ..
        } = self;
        drop(winners);
        drop(queue);

        tracing::debug!(
            "Worker {} exited: {} connections, {} requests, {} drained",
            id,
            report.connections,
            report.requests,
            report.drained
        );
        report
    }

    fn serve(&mut self, item: WorkItem) {
        let peer = item.peer;
        let waited = item.accepted_at.elapsed();

        let mut connection = match Connection::new(item.stream, &self.shutdown) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Worker {} could not set up connection from {}: {}", self.id, peer, e);
                self.report.failed_connections += 1;
                return;
            }
        };
        self.stats.record_dequeued(waited);

        self.report.connections += 1;
        match connection.serve(self.predicate.as_ref(), &self.winners, &self.shutdown) {
            Ok(summary) => {
                self.stats.record_connection(&summary, false);
            }
            Err(e) => {
                self.report.failed_connections += 1;
                self.stats.record_connection(&connection.summary(), true);
                match e.kind() {
                    FailureKind::ConnectionClosed => {
                        tracing::info!("Socket from {} closed unexpectedly", peer);
                    }
                    FailureKind::Transport => {
                        tracing::info!("Error while reading socket from {}: {}", peer, e);
                    }
                    _ if matches!(e, DrawError::ShuttingDown) => {
                        tracing::info!("Closing connection from {} for shutdown", peer);
                    }
                    _ => {
                        tracing::warn!("Connection from {} failed: {}", peer, e);
                    }
                }
                if e.is_reportable() {
                    connection.report_error(&e);
                }
            }
        }
        self.report.requests += connection.summary().requests;
        connection.close();
    }
}
