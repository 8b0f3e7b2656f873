//! Error types for the gdb-debug MCP server

use std::time::Duration;

use thiserror::Error;

use crate::mi::ParseError;
use crate::session::ReadyState;

/// Main error type for gdb sessions and the registry
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not ready (state: {0})")]
    NotReady(ReadyState),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Command '{command}' timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Target did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("gdb did not become ready within {0:?}")]
    StartTimeout(Duration),

    #[error("gdb process exited")]
    ProcessExited,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("gdb error: {message}")]
    DebuggerReported { message: String, code: Option<String> },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Session limit exceeded (max: {0})")]
    SessionLimitExceeded(usize),

    #[error("Failed to spawn gdb: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SessionError {
    /// Stable machine-readable tag for the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotReady(_) => "not_ready",
            SessionError::NotFound(_) => "not_found",
            SessionError::CommandTimeout { .. } => "command_timeout",
            SessionError::StopTimeout(_) => "stop_timeout",
            SessionError::StartTimeout(_) => "start_timeout",
            SessionError::ProcessExited => "process_exited",
            SessionError::Protocol(_) => "protocol_error",
            SessionError::DebuggerReported { .. } => "debugger_error",
            SessionError::InvalidCommand(_) => "invalid_command",
            SessionError::SessionLimitExceeded(_) => "session_limit_exceeded",
            SessionError::SpawnFailed(_) => "spawn_failed",
            SessionError::IoError(_) => "io_error",
        }
    }

    /// Bounded waits that ran out; the session itself is still usable
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::CommandTimeout { .. }
                | SessionError::StopTimeout(_)
                | SessionError::StartTimeout(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SessionError>;
