// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! An RPC layer over a settlement-capable message transport.
//!
//! [`RpcServer`](protocol::RpcServer) and [`RpcClient`](protocol::RpcClient)
//! are generic over any [`TransportClient`](transport::TransportClient); the
//! only implementation shipped here is
//! [`transport::mock::MockTransport`], an in-process transport used by
//! tests and the demo binary.
//!
//! # Architecture
//!
//! - Strict component boundaries: wire contract, validator, registry,
//!   server, and client each live in their own module.
//! - Dependency injection for testability: both halves are generic over the
//!   transport, never coupled to a concrete broker client.
//! - Async-first: dispatch and correlation are built on `tokio`.
//! - Comprehensive error handling and propagation via a closed error
//!   taxonomy (see [`error`]).

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod tests;

/// Crate version, read from `Cargo.toml` at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs the tracing-backed error reporter and a default global
/// configuration. Optional: embedders that manage their own tracing
/// subscriber and configuration may skip this and use the modules
/// directly.
pub fn init() -> error::AmqpRpcResult<()> {
    error::set_error_reporter(std::sync::Arc::new(error::TracingErrorReporter));
    config::init_default_config()?;
    Ok(())
}
