//! Persistence writer
//!
//! Drains the Writer Queue into the result store, one item at a time.

use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crossbeam::select;

use crate::contest::Contestant;
use crate::error::Result;
use crate::shutdown::Shutdown;
use super::ResultStore;

/// Item carried by the Writer Queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterMessage {
    /// Winners of one request, in input order
    Batch(Vec<Contestant>),

    /// Termination sentinel; always the last item the writer dequeues
    Terminate,
}

/// Create the Writer Queue
///
/// Unbounded: reporting winners never applies backpressure to workers.
pub fn writer_queue() -> (Sender<WriterMessage>, Receiver<WriterMessage>) {
    channel::unbounded()
}

/// Totals reported by the writer when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub batches: u64,
    pub winners: u64,
}

/// The single execution unit allowed to write the result store
pub struct ResultWriter {
    store: ResultStore,
    queue: Receiver<WriterMessage>,
    shutdown: Shutdown,
    /// How long to keep draining after the shutdown signal
    drain_window: Duration,
    stats: WriterStats,
}

impl ResultWriter {
    /// Open the store; the returned writer holds its only handle
    pub fn open(
        path: &Path,
        queue: Receiver<WriterMessage>,
        shutdown: Shutdown,
        drain_window: Duration,
    ) -> Result<Self> {
        let store = ResultStore::open(path)?;
        tracing::info!("Result store opened at {}", path.display());
        Ok(Self {
            store,
            queue,
            shutdown,
            drain_window,
            stats: WriterStats::default(),
        })
    }

    /// Run until the sentinel arrives, every sender is gone, or the drain
    /// window after shutdown elapses
    pub fn run(mut self) -> Result<WriterStats> {
        let mut drain_deadline: Option<Instant> = None;

        loop {
            let message = match drain_deadline {
                Some(deadline) => match self.queue.recv_deadline(deadline) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::warn!(
                            "Writer drain window elapsed with {} items still queued",
                            self.queue.len()
                        );
                        break;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => select! {
                    recv(self.queue) -> message => match message {
                        Ok(message) => message,
                        Err(_) => {
                            tracing::debug!("All writer queue senders dropped");
                            break;
                        }
                    },
                    recv(self.shutdown.signal()) -> _ => {
                        tracing::info!("Writer received shutdown signal, draining queue");
                        drain_deadline = Some(Instant::now() + self.drain_window);
                        continue;
                    }
                },
            };

            match message {
                WriterMessage::Terminate => {
                    tracing::debug!("Writer received termination sentinel");
                    break;
                }
                WriterMessage::Batch(winners) => self.persist(&winners),
            }
        }

        // Release the queue handle before the store
        drop(self.queue);
        self.store.close()?;
        tracing::info!(
            "Writer exited: {} batches, {} winners persisted",
            self.stats.batches,
            self.stats.winners
        );
        Ok(self.stats)
    }

    fn persist(&mut self, winners: &[Contestant]) {
        match self.store.append_batch(winners) {
            Ok(count) => {
                self.stats.batches += 1;
                self.stats.winners += count as u64;
                tracing::trace!("Persisted batch of {} winners", count);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to persist {} winners to {}: {}",
                    winners.len(),
                    self.store.path().display(),
                    e
                );
            }
        }
    }
}
