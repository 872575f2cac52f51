//! Connection Handler
//!
//! Runs the request/response loop for one client connection.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown as SocketShutdown, TcpStream};

use crossbeam::channel::Sender;

use crate::contest::{select_winners, WinnerPredicate};
use crate::error::{DrawError, Result};
use crate::persist::WriterMessage;
use crate::protocol::{read_next_request, write_error, write_response};
use crate::shutdown::{Shutdown, StreamRegistration};

/// What one connection amounted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub requests: u64,
    pub contestants: u64,
    pub winners: u64,
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: String,

    /// Keeps the stream reachable by the shutdown context
    _registration: StreamRegistration,

    summary: ConnectionSummary,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and registers the stream for forced shutdown.
    pub fn new(stream: TcpStream, shutdown: &Shutdown) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let registration = shutdown.register_stream(&stream)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            peer_addr,
            _registration: registration,
            summary: ConnectionSummary::default(),
        })
    }

    /// Serve requests until the client disconnects or something fails
    ///
    /// A clean disconnect between frames returns `Ok`; a peer that goes away
    /// mid-frame is [`DrawError::ConnectionClosed`]. Every other outcome is
    /// returned as the error that ended the connection; the caller decides
    /// whether it is worth an Error frame.
    pub fn serve(
        &mut self,
        predicate: &dyn WinnerPredicate,
        winners: &Sender<WriterMessage>,
        shutdown: &Shutdown,
    ) -> Result<ConnectionSummary> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let contestants = match read_next_request(&mut self.reader) {
                Ok(Some(contestants)) => contestants,
                Ok(None) | Err(DrawError::ConnectionClosed) | Err(DrawError::Transport(_))
                    if shutdown.is_triggered() =>
                {
                    return Err(DrawError::ShuttingDown);
                }
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(self.summary);
                }
                Err(e) => return Err(e),
            };

            let received = contestants.len();
            tracing::trace!("Received {} contestants from {}", received, self.peer_addr);

            let batch = select_winners(predicate, contestants, || shutdown.is_triggered())
                .ok_or(DrawError::ShuttingDown)?;

            write_response(&mut self.writer, &batch)?;

            self.summary.requests += 1;
            self.summary.contestants += received as u64;
            self.summary.winners += batch.len() as u64;

            if batch.is_empty() {
                continue;
            }
            let count = batch.len();
            if winners.send(WriterMessage::Batch(batch)).is_err() {
                tracing::warn!(
                    "Writer queue closed; {} winners from {} were not persisted",
                    count,
                    self.peer_addr
                );
            }
        }
    }

    /// Best-effort Error frame
    pub fn report_error(&mut self, error: &DrawError) {
        if let Err(e) = write_error(&mut self.writer, &error.to_string()) {
            tracing::debug!("Could not send error frame to {}: {}", self.peer_addr, e);
        }
    }

    /// Flush what is buffered and close both directions
    pub fn close(mut self) {
        let _ = self.writer.flush();
        if let Err(e) = self.writer.get_ref().shutdown(SocketShutdown::Both) {
            tracing::trace!("Connection {} already closed: {}", self.peer_addr, e);
        }
        tracing::debug!("Closed connection from {}", self.peer_addr);
    }

    pub fn summary(&self) -> ConnectionSummary {
        self.summary
    }
}
