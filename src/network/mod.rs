//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor (the thread calling `Server::run`)
//! - Bounded work queue sized to the pool: admission control
//! - Worker thread pool, one connection per worker at a time
//! - Winners forwarded to the persistence writer

mod acceptor;
mod connection;
mod queue;
mod server;
mod worker;

pub use acceptor::{bind_listener, Acceptor};
pub use connection::{Connection, ConnectionSummary};
pub use queue::{drain_work_queue, work_queue, WorkItem};
pub use server::{Server, ServerStats, ShutdownReport, StatsSnapshot};
pub use worker::{Worker, WorkerReport, WorkerState};
