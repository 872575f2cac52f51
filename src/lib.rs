//! # luckydraw
//!
//! A contest-result server with:
//! - A self-delimiting, error-aware binary protocol
//! - A fixed pool of worker threads doing the draw in true parallel
//! - Admission control through a bounded work queue
//! - A single writer owning the append-only result store
//! - Explicit, idempotent, deadlock-free shutdown
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ TCP
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Acceptor                               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Work Queue (bounded = pool size)
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!   ┌───────────┐ ┌───────────┐ ┌───────────┐
//!   │ Worker 0  │ │ Worker 1  │ │ Worker N  │   codec ⇄ client
//!   └─────┬─────┘ └─────┬─────┘ └─────┬─────┘
//!         └─────────────┼─────────────┘
//!                       │ Writer Queue (unbounded)
//!                       ▼
//!               ┌───────────────┐
//!               │    Writer     │ ──▶ winners file
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod contest;
pub mod protocol;
pub mod persist;
pub mod shutdown;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DrawError, FailureKind, Result};
pub use config::Config;
pub use contest::{Contestant, HashDraw, WinnerPredicate};
pub use network::{Server, ShutdownReport};
pub use shutdown::Shutdown;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of luckydraw
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status after a graceful stop on a termination signal
///
/// Always SIGTERM's code (128 + 15). SIGINT stops the server the same way
/// and also exits with this status; the handler does not record which
/// signal arrived.
pub const TERMINATION_EXIT_CODE: i32 = 128 + 15;
