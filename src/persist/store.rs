//! Result store
//!
//! Append-only winners file. Exactly one `ResultStore` exists per server,
//! owned by the writer thread.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::contest::Contestant;
use crate::error::{DrawError, Result};

/// Append-only winners file
pub struct ResultStore {
    /// Store file path
    path: PathBuf,
    /// Buffered handle; `None` once closed
    writer: Option<BufWriter<File>>,
    /// Lines appended through this handle
    lines_written: u64,
}

impl ResultStore {
    /// Open (or create) the store for appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            lines_written: 0,
        })
    }

    /// Append one line per winner, in order, and flush
    ///
    /// The batch is rendered up front and handed to the file in one
    /// `write_all`, so a batch is never split by another writer's output.
    pub fn append_batch(&mut self, winners: &[Contestant]) -> Result<usize> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            DrawError::Storage(format!("result store {} is closed", self.path.display()))
        })?;

        let rendered: String = winners.iter().map(Contestant::result_line).collect();
        writer.write_all(rendered.as_bytes())?;
        writer.flush()?;

        self.lines_written += winners.len() as u64;
        Ok(winners.len())
    }

    /// Flush, sync and release the handle; later calls are no-ops
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close result store {}: {}", self.path.display(), e);
        }
    }
}
