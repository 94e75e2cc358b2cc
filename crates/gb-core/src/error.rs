//! # AppError
//!
//! Centralized error handling for the Goblin-Board core.
//! Malformed legacy data never shows up here; it degrades during decode.

use crate::models::ThreadId;
use thiserror::Error;

/// The primary error type for all gb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Board, Thread)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., message too long, banned word)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The thread reached its post limit and no longer accepts replies.
    #[error("thread {0} is archived")]
    Archived(ThreadId),

    /// Request contradicts stored state (e.g., reply addressed to the wrong board)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence reported no affected row for a write.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn thread_not_found(id: ThreadId) -> Self {
        Self::NotFound("thread".to_string(), id.to_string())
    }

    pub fn board_not_found(board: &str) -> Self {
        Self::NotFound("board".to_string(), board.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Wraps an adapter error crossing the port boundary.
    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for Goblin-Board logic.
pub type Result<T> = std::result::Result<T, AppError>;
