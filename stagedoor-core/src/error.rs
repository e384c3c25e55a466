//! Custom error types for Stagedoor.
//!
//! This module defines explicit enum error types - no `Box<dyn Error>`,
//! no `anyhow::Result`. Pre-flight errors abort server start; per-request
//! errors are converted into a 500 response at the handler boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the local gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    // =========================================================================
    // Pre-flight errors - abort server start
    // =========================================================================
    #[error("Provider {name} is not supported")]
    UnsupportedProvider { name: String },

    #[error("This service has no functions with http events")]
    NoHttpFunctions,

    #[error(
        "Unable to communicate with docker.\n\
         \x20  Error: {message}\n\
         \x20 Follow https://docs.docker.com/get-started/ to make sure you have docker installed"
    )]
    BackendUnavailable { message: String },

    #[error(
        "Error starting server on localhost port {port}.\n\
         \x20 * Hint: You likely already have something listening on this port"
    )]
    PortInUse { port: u16 },

    #[error("Unexpected error while starting server: {message}")]
    Listen { message: String },

    // =========================================================================
    // Configuration errors
    // =========================================================================
    #[error("Service manifest not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Service manifest parse error: {message}")]
    ConfigParse { message: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Per-request errors - converted to a 500 response, never fatal
    // =========================================================================
    #[error("Function response is not parseable: {message}")]
    MalformedResponse { message: String },

    #[error("Execution backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Execution unit lifecycle error: {0}")]
    Lifecycle(#[from] UnitTransitionError),
}

/// Errors surfaced by the execution backend client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request `{operation}` failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("backend returned {status} for `{operation}`: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The backend reported a not-found condition. On unit creation this
    /// means the image is missing locally and a pull should be attempted.
    #[error("backend could not find the target of `{operation}`")]
    NotFound { operation: &'static str },

    #[error("pull of image `{image}` failed: {message}")]
    Pull { image: String, message: String },
}

/// State machine errors for the per-invocation unit lifecycle.
#[derive(Debug, Error)]
pub enum UnitTransitionError {
    #[error("cannot transition unit for {function} from {from} to {to}")]
    InvalidTransition {
        function: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;
