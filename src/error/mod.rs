//! Error module for the Amqp Rpc crate.
//!
//! This module provides a comprehensive error handling framework for the entire
//! crate, following idiomatic Rust patterns: explicit closed error enums, `?`
//! propagation, and a pluggable error reporter for side-channel observability.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod protocol;
pub mod transport;

/// Result type alias used throughout the crate.
pub type AmqpRpcResult<T> = Result<T, AmqpRpcError>;

/// Top-level error enum aggregating every closed taxonomy in the crate.
#[derive(Error, Debug)]
pub enum AmqpRpcError {
    /// Errors occurring during configuration loading or validation.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Wire-level protocol errors (see [`protocol::ProtocolError`]).
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    /// Local bind-time errors (see [`protocol::BindError`]).
    #[error("bind error: {0}")]
    Bind(#[from] protocol::BindError),

    /// Local client-side errors (see [`protocol::ClientError`]).
    #[error("client error: {0}")]
    Client(#[from] protocol::ClientError),

    /// Errors related to the abstract transport.
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Serialization/Deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Custom error with message for cases where specific error types are not defined.
    #[error("{0}")]
    Custom(String),
}

/// Error reporting structure to provide context and debugging information.
#[derive(Debug)]
pub struct ErrorContext {
    /// The original error that occurred.
    pub error: AmqpRpcError,

    /// The component where the error occurred.
    pub component: String,

    /// Additional context information to help with debugging.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Creates a new error context with the given error and component.
    pub fn new<S: Into<String>>(error: AmqpRpcError, component: S) -> Self {
        Self {
            error,
            component: component.into(),
            details: None,
        }
    }

    /// Adds detail information to the error context.
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error in {}: {}", self.component, self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }
        Ok(())
    }
}

/// Error reporter trait for reporting errors to various sinks.
pub trait ErrorReporter: Send + Sync + std::fmt::Debug {
    /// Report an error with context.
    fn report(&self, context: ErrorContext);
}

/// A simple error reporter implementation that logs errors using `tracing`.
#[derive(Default, Debug)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: ErrorContext) {
        tracing::error!(
            error = %context.error,
            component = %context.component,
            details = context.details.as_deref().unwrap_or("None"),
            "error reported"
        );
    }
}

/// Global error reporter slot. Set once during startup via
/// [`set_error_reporter`]; reads fall back to stderr if unset.
static ERROR_REPORTER: once_cell::sync::OnceCell<Arc<dyn ErrorReporter>> =
    once_cell::sync::OnceCell::new();

/// Reports an error through the globally configured reporter, falling back to
/// stderr if none has been installed yet.
pub fn report_error(context: ErrorContext) {
    match ERROR_REPORTER.get() {
        Some(reporter) => reporter.report(context),
        None => eprintln!("Error: {context}"),
    }
}

/// Sets the global error reporter. Subsequent calls after the first are
/// ignored, matching `OnceCell`'s set-once semantics.
pub fn set_error_reporter(reporter: Arc<dyn ErrorReporter>) {
    let _ = ERROR_REPORTER.set(reporter);
}
