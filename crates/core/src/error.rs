//! Error types for the Parley turn engine.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own sub-enum, folded into the top-level `Error`.
//!
//! The taxonomy matters to the turn cycle: configuration errors abort the
//! turn, tool execution failures are downgraded in-band by the invoker,
//! backend errors propagate to the caller (which owns retry policy), and
//! invariant/step-limit violations are fatal programming errors.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors (fatal, abort the turn) ---
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // --- Backend errors (propagate to the caller) ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool errors (downgraded in-band by the invoker; fatal if raised here) ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Contributor hook failures (propagate, never swallowed) ---
    #[error("Contributor error: {0}")]
    Contributor(String),

    // --- Internal/programming errors ---
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// The turn cycle exceeded its step cap. Fatal and non-retryable.
    #[error("Turn exceeded the maximum of {0} steps")]
    StepLimitExceeded(u32),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Tool not resolved: {0}")]
    UnknownTool(String),

    #[error("Missing required capability: {0}")]
    MissingCapability(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
