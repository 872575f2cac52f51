//! Error types for luckydraw
//!
//! Provides a unified error type for all operations. The first four
//! variants are the per-connection failure taxonomy; a worker matches on
//! them to decide whether the client still deserves an Error frame.

use thiserror::Error;

/// Result type alias using DrawError
pub type Result<T> = std::result::Result<T, DrawError>;

/// Unified error type for luckydraw operations
#[derive(Debug, Error)]
pub enum DrawError {
    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    /// Peer closed the stream before a frame was complete
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Application error: {0}")]
    Application(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    #[error("Server is shutting down")]
    ShuttingDown,
}

/// Coarse classification of a [`DrawError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConnectionClosed,
    ProtocolViolation,
    Transport,
    Application,
    Internal,
}

impl DrawError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DrawError::ConnectionClosed => FailureKind::ConnectionClosed,
            DrawError::Protocol(_) => FailureKind::ProtocolViolation,
            DrawError::Transport(_) => FailureKind::Transport,
            DrawError::Application(_) => FailureKind::Application,
            DrawError::Storage(_) | DrawError::Config(_) | DrawError::ShuttingDown => {
                FailureKind::Internal
            }
        }
    }

    /// Whether the transport is presumed usable enough to carry an Error frame
    pub fn is_reportable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::ProtocolViolation | FailureKind::Application
        )
    }
}
