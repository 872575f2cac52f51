//! Persistence Module
//!
//! The single-writer result pipeline.
//!
//! ## Responsibilities
//! - Carry winner batches from workers to the writer (Writer Queue)
//! - Own the only write handle to the result store
//! - Append one line per winner, batch by batch, never overlapping
//!
//! ## Store Format
//! ```text
//! Full name: <first> <last> | Document: <document> | Date of Birth: <DD/MM/YYYY>\n
//! ```

mod store;
mod writer;

pub use store::ResultStore;
pub use writer::{writer_queue, ResultWriter, WriterMessage, WriterStats};
