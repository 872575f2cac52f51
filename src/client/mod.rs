//! Client Module
//!
//! The other endpoint of the protocol: submit contestant batches and
//! collect the winners.

pub mod dataset;

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown as SocketShutdown, TcpStream, ToSocketAddrs};

use crate::contest::Contestant;
use crate::error::Result;
use crate::protocol::{read_response, write_request};

/// Blocking protocol client over one connection
pub struct DrawClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl DrawClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Send one batch and wait for its winners
    ///
    /// An Error frame from the server is returned as
    /// [`DrawError::Application`](crate::DrawError::Application).
    pub fn submit(&mut self, contestants: &[Contestant]) -> Result<Vec<Contestant>> {
        write_request(&mut self.writer, contestants)?;
        read_response(&mut self.reader)
    }

    /// Close the connection; the server sees a clean disconnect
    pub fn close(self) -> Result<()> {
        let stream = self.writer.into_inner().map_err(|e| e.into_error())?;
        stream.shutdown(SocketShutdown::Both)?;
        Ok(())
    }
}
