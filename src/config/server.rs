//! Server-side RPC options.
//!
//! Mirrors the `server` scope of the options table in spec.md §6: everything
//! an embedder can set when calling `RpcServer::new`/`listen`, excluding the
//! `interceptor`/`completionInterceptor`/`logger` hooks, which are values, not
//! configuration, and are passed directly to the constructor.

use super::ConfigResult;
use super::Validate;
use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Server-side options recognized by `RpcServer::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcServerOptions {
    /// Address the receiver link attaches to.
    pub address: String,

    /// When true, a request for an unregistered method is dropped silently
    /// instead of producing a `MethodNotFound` reply (useful for servers that
    /// share a queue and partition the method namespace).
    pub ignore_unknown_methods: bool,
}

impl Default for RpcServerOptions {
    fn default() -> Self {
        Self {
            address: "rpc/requests".to_string(),
            ignore_unknown_methods: false,
        }
    }
}

impl Validate for RpcServerOptions {
    fn validate(&self) -> ConfigResult<()> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server address cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
