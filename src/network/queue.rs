//! Work Queue
//!
//! Bounded hand-off of admitted connections from the acceptor to the
//! worker pool. Capacity equals the pool size, so a full queue means every
//! worker is busy and the acceptor stalls.

use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpStream};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};

/// A connection admitted by the acceptor, not yet claimed by a worker
#[derive(Debug)]
pub struct WorkItem {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl WorkItem {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            accepted_at: Instant::now(),
        }
    }

    /// Close a connection that will never be served
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(SocketShutdown::Both) {
            tracing::debug!("Unserved connection from {} already closed: {}", self.peer, e);
        }
    }
}

/// Create the Work Queue
pub fn work_queue(capacity: usize) -> (Sender<WorkItem>, Receiver<WorkItem>) {
    channel::bounded(capacity.max(1))
}

/// Close every connection still waiting in the queue
///
/// Returns how many were closed.
pub fn drain_work_queue(queue: &Receiver<WorkItem>) -> usize {
    let mut closed = 0;
    for item in queue.try_iter() {
        tracing::debug!("Closing unclaimed connection from {}", item.peer);
        item.close();
        closed += 1;
    }
    closed
}
