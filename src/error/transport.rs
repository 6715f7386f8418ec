// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Errors surfaced by the abstract transport (`crate::transport`).
//!
//! The RPC core treats the transport as an opaque collaborator (§6); these are
//! the only failure modes it needs to understand in order to propagate
//! correctly to callers.

use thiserror::Error;

/// Errors that can occur while creating or using a transport link.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Failed to attach a receiver at the given address.
    #[error("failed to create receiver at {address}: {message}")]
    ReceiverAttach {
        /// The address the receiver was attached to, or "<dynamic>".
        address: String,
        /// Underlying failure description.
        message: String,
    },

    /// Failed to attach a sender to the given address.
    #[error("failed to create sender to {address}: {message}")]
    SenderAttach {
        /// The address the sender targeted.
        address: String,
        /// Underlying failure description.
        message: String,
    },

    /// Sending a message over an established sender failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The link reported an error asynchronously (e.g. broker closed it).
    #[error("link error: {0}")]
    LinkError(String),

    /// The link was already closed when an operation was attempted on it.
    #[error("link closed")]
    Closed,
}
