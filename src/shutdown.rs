//! Shutdown context
//!
//! A cloneable handle shared by every execution unit. Triggering it:
//! 1. Sets a flag that loops can poll between steps
//! 2. Drops the only sender of a broadcast channel, which wakes every
//!    `crossbeam::select!` waiting on [`Shutdown::signal`]
//! 3. Shuts down every registered live stream, unblocking workers parked
//!    in socket reads
//!
//! Triggering is idempotent; only the first call does any work.

use std::collections::HashMap;
use std::net::{Shutdown as SocketShutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{DrawError, Result};

/// Shared shutdown context
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

struct Inner {
    triggered: AtomicBool,

    /// Dropped on trigger; never sent on
    notifier: Mutex<Option<Sender<()>>>,

    signal: Receiver<()>,

    /// Clones of live client streams, used only to call `shutdown()`
    streams: Mutex<HashMap<u64, TcpStream>>,

    next_stream_id: AtomicU64,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notifier, signal) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                notifier: Mutex::new(Some(notifier)),
                signal,
                streams: Mutex::new(HashMap::new()),
                next_stream_id: AtomicU64::new(1),
            }),
        }
    }

    /// Request shutdown
    ///
    /// Returns true for the call that actually initiated it.
    pub fn trigger(&self) -> bool {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }

        drop(self.inner.notifier.lock().take());

        let streams: Vec<(u64, TcpStream)> = self.inner.streams.lock().drain().collect();
        for (id, stream) in streams {
            if let Err(e) = stream.shutdown(SocketShutdown::Both) {
                tracing::debug!("Stream {} already closed during shutdown: {}", id, e);
            }
        }
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Channel that becomes disconnected once shutdown is triggered
    ///
    /// Intended for `select!`: a `recv` on it only ever completes with an
    /// error, and that error means "stop".
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until shutdown is triggered or `timeout` elapses
    ///
    /// Returns true when shutdown was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.signal.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) | Ok(()) => self.is_triggered(),
        }
    }

    /// Publish a live stream so that a trigger can force it closed
    ///
    /// Fails with [`DrawError::ShuttingDown`] (after closing the stream) if
    /// shutdown has already begun.
    pub fn register_stream(&self, stream: &TcpStream) -> Result<StreamRegistration> {
        let handle = stream.try_clone()?;
        let mut streams = self.inner.streams.lock();
        if self.is_triggered() {
            let _ = handle.shutdown(SocketShutdown::Both);
            return Err(DrawError::ShuttingDown);
        }
        let id = self.inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
        streams.insert(id, handle);
        Ok(StreamRegistration {
            id,
            shutdown: self.clone(),
        })
    }

    /// Number of streams currently registered
    pub fn registered_streams(&self) -> usize {
        self.inner.streams.lock().len()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a stream from the registry when dropped
pub struct StreamRegistration {
    id: u64,
    shutdown: Shutdown,
}

impl Drop for StreamRegistration {
    fn drop(&mut self) {
        self.shutdown.inner.streams.lock().remove(&self.id);
    }
}
