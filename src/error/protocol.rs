// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Errors that cross the wire, plus the local-only errors raised to embedders.
//!
//! This module defines the closed JSON-RPC-2.0-compatible error taxonomy used by
//! both halves of the RPC layer, and the local errors that never leave the process
//! (bind-time mistakes, malformed `notify` calls, request timeouts).

use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes. Only the five codes named in the wire
/// contract are reconstructable from a response; anything else collapses to
/// the base [`ProtocolError::Other`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError = -32700,
    /// The JSON sent is not a valid request object.
    InvalidRequest = -32600,
    /// The method does not exist or is not available.
    MethodNotFound = -32601,
    /// Invalid method parameter(s).
    InvalidParams = -32602,
    /// Internal error while dispatching the request.
    InternalError = -32603,
}

impl ErrorCode {
    /// Creates an [`ErrorCode`] from a raw integer, if it is one of the five
    /// recognized codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            -32603 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Returns the integer error code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> i32 {
        code as i32
    }
}

/// A protocol error as it travels on the wire inside `ResponseEnvelope::Error`.
///
/// The client reconstructs one of the typed variants below from `code` on
/// receipt; an unrecognized code becomes [`ProtocolError::Other`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Invalid JSON was received (-32700). `data` carries the offending text.
    #[error("parse error: {message}")]
    Parse {
        /// Human readable message.
        message: String,
        /// Offending payload, when available.
        data: Option<serde_json::Value>,
    },

    /// The request envelope was not a valid request object (-32600).
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human readable message.
        message: String,
        /// Additional context, when available.
        data: Option<serde_json::Value>,
    },

    /// The named method is not registered (-32601).
    #[error("method not found: {message}")]
    MethodNotFound {
        /// Human readable message, e.g. "No such method: nope".
        message: String,
        /// Additional context, when available.
        data: Option<serde_json::Value>,
    },

    /// Parameters failed schema validation, or could not be mapped to the
    /// handler's declared parameter names (-32602).
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Human readable message.
        message: String,
        /// Additional context, when available (e.g. `data.messages`).
        data: Option<serde_json::Value>,
    },

    /// The handler raised an uncaught error while executing (-32603).
    #[error("internal error: {message}")]
    Internal {
        /// Human readable message.
        message: String,
        /// Additional context, when available.
        data: Option<serde_json::Value>,
    },

    /// A code outside the five recognized codes; preserved verbatim so the
    /// caller can still inspect it.
    #[error("protocol error {code}: {message}")]
    Other {
        /// The raw numeric code.
        code: i32,
        /// Human readable message.
        message: String,
        /// Additional context, when available.
        data: Option<serde_json::Value>,
    },
}

impl ProtocolError {
    /// The numeric code this error carries on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => ErrorCode::ParseError.code(),
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest.code(),
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound.code(),
            Self::InvalidParams { .. } => ErrorCode::InvalidParams.code(),
            Self::Internal { .. } => ErrorCode::InternalError.code(),
            Self::Other { code, .. } => *code,
        }
    }

    /// The message this error carries on the wire.
    pub fn message(&self) -> &str {
        match self {
            Self::Parse { message, .. }
            | Self::InvalidRequest { message, .. }
            | Self::MethodNotFound { message, .. }
            | Self::InvalidParams { message, .. }
            | Self::Internal { message, .. }
            | Self::Other { message, .. } => message,
        }
    }

    /// The `data` payload this error carries on the wire, if any.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Parse { data, .. }
            | Self::InvalidRequest { data, .. }
            | Self::MethodNotFound { data, .. }
            | Self::InvalidParams { data, .. }
            | Self::Internal { data, .. }
            | Self::Other { data, .. } => data.as_ref(),
        }
    }

    /// Reconstructs a typed [`ProtocolError`] from a wire `code`/`message`/`data`
    /// triple, per Design Notes §9 ("build a lookup by code → constructor").
    pub fn from_wire(code: i32, message: String, data: Option<serde_json::Value>) -> Self {
        match ErrorCode::from_code(code) {
            Some(ErrorCode::ParseError) => Self::Parse { message, data },
            Some(ErrorCode::InvalidRequest) => Self::InvalidRequest { message, data },
            Some(ErrorCode::MethodNotFound) => Self::MethodNotFound { message, data },
            Some(ErrorCode::InvalidParams) => Self::InvalidParams { message, data },
            Some(ErrorCode::InternalError) => Self::Internal { message, data },
            None => Self::Other { code, message, data },
        }
    }

    /// Builds the internal-error variant the dispatch pipeline defaults to
    /// when a handler's failure carries no explicit protocol error.
    pub fn internal(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::Internal {
            message: message.into(),
            data,
        }
    }
}

/// Local errors raised synchronously to the embedder while binding methods.
///
/// These never cross the wire; they are programming mistakes in the host
/// application, caught at `bind()` time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A method with this name is already registered on this server.
    #[error("duplicate method registration: {0}")]
    DuplicateMethod(String),

    /// An invocable was bound without a name and none could be introspected.
    #[error("invalid method name: {0}")]
    InvalidMethodName(String),

    /// A `params` schema referenced properties outside the handler's
    /// declared parameter list, or was not an object-typed schema.
    #[error("invalid validation definition: {0}")]
    InvalidValidationDefinition(String),
}

/// Local errors raised to the embedder from the client side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A locally malformed call, e.g. `notify` with a `replyTo` set.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The deadline elapsed before a response arrived.
    #[error("request timed out")]
    RequestTimeout,

    /// The response receiver's link reported an error; all pending requests
    /// are rejected with it.
    #[error("link error: {0}")]
    LinkError(String),
}
