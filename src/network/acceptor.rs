//! Connection Acceptor
//!
//! Owns the listening socket and admits connections into the Work Queue.
//! Admission control is nothing more than the blocking put: with every
//! worker busy and the queue full, the acceptor stops calling `accept`
//! and new clients wait in the kernel backlog.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{SendTimeoutError, Sender};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{DrawError, Result};
use crate::shutdown::Shutdown;
use super::queue::WorkItem;
use super::server::ServerStats;

/// Bind a TCP listener honouring `backlog`
pub fn bind_listener(addr: &str, backlog: u32) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| DrawError::Config(format!("invalid listen address {:?}: {}", addr, e)))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    Ok(socket.into())
}

/// Accept loop
pub struct Acceptor {
    listener: TcpListener,
    queue: Sender<WorkItem>,
    shutdown: Shutdown,
    poll_interval: Duration,
    stats: Arc<ServerStats>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        queue: Sender<WorkItem>,
        shutdown: Shutdown,
        poll_interval: Duration,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            listener,
            queue,
            shutdown,
            poll_interval,
            stats,
        }
    }

    /// Accept until shutdown; consumes the listener and the queue handle
    pub fn run(self) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        tracing::info!("Proceeding to accept new connections");

        while !self.shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::info!("Got connection from {}", peer);
                    self.stats.record_accepted();

                    let item = WorkItem::new(stream, peer);
                    let configured = item
                        .stream
                        .set_nonblocking(false)
                        .and_then(|_| item.stream.set_nodelay(true));
                    if let Err(e) = configured {
                        tracing::warn!("Dropping connection from {}: {}", peer, e);
                        item.close();
                        continue;
                    }

                    if !self.admit(item) {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    self.shutdown.wait_timeout(self.poll_interval);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // e.g. EMFILE; back off instead of spinning
                    tracing::warn!("Accept failed: {}", e);
                    self.shutdown.wait_timeout(self.poll_interval);
                }
            }
        }

        let Acceptor { listener, queue, .. } = self;
        drop(queue);
        drop(listener);
        tracing::info!("Closed server socket");
        Ok(())
    }

    /// Blocking put into the Work Queue, abandoned on shutdown
    ///
    /// Returns false when the item could not be queued; the item is closed.
    ///
    /// While this blocks, the acceptor holds one accepted connection on top
    /// of the queue's capacity. That connection is the only one admitted
    /// beyond the bound; no further `accept` happens until it is queued.
    fn admit(&self, mut item: WorkItem) -> bool {
        loop {
            match self.queue.send_timeout(item, self.poll_interval) {
                Ok(()) => {
                    self.stats.record_queue_depth(self.queue.len());
                    return true;
                }
                Err(SendTimeoutError::Timeout(pending)) => {
                    if self.shutdown.is_triggered() {
                        tracing::info!("Closing in-flight connection from {}", pending.peer);
                        pending.close();
                        return false;
                    }
                    tracing::trace!("Work queue full, holding connection from {}", pending.peer);
                    item = pending;
                }
                Err(SendTimeoutError::Disconnected(pending)) => {
                    tracing::warn!("Work queue closed, dropping connection from {}", pending.peer);
                    pending.close();
                    return false;
                }
            }
        }
    }
}
