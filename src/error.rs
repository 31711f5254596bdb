//! Error types for roistat
//!
//! All errors derive from `thiserror` for convenient propagation with `?`.
//! The taxonomy mirrors how failures are handled: transport and protocol
//! errors are usually caught locally (a failed chunk or AI batch is skipped),
//! while missing-context errors abort the whole operation.

use thiserror::Error;

/// Main error type for roistat operations
#[derive(Error, Debug)]
pub enum RoistatError {
    /// HTTP transport error (connection abort, DNS failure, client-level
    /// timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream returned a non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code returned by the server
        status: u16,
        /// Response body text, possibly empty
        body: String,
    },

    /// Request exceeded its deadline
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error (settings file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Websocket transport error
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Streaming session closed before any response text arrived
    #[error("Connection closed without response (code: {0})")]
    ClosedWithoutResponse(String),

    /// The model stream reported an error frame
    #[error("AI stream error: {0}")]
    AiStream(String),

    /// AI response could not be turned into a structured result, even after
    /// truncation repair
    #[error("AI response was not a valid array: {0}")]
    AiResponse(String),

    /// No AI batch produced a usable result
    #[error("No results were generated from any batch")]
    AllBatchesFailed,

    /// Required account/tenant context is missing; nothing can be fetched
    #[error("Missing context data: {0}")]
    MissingContext(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience type alias for Results in roistat
pub type Result<T> = std::result::Result<T, RoistatError>;
