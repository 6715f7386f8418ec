//! Client-side RPC options.
//!
//! Mirrors the `client` scope of the options table in spec.md §6.

use super::ConfigResult;
use super::Validate;
use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Default per-request deadline, in milliseconds, when [`RpcClientOptions::timeout_ms`]
/// is left at its default. Matches spec.md §4.5 ("default 5000; disabled if 0/unset").
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Client-side options recognized by `RpcClient::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcClientOptions {
    /// Address the sender attaches to.
    pub address: String,

    /// Static reply address to anchor the response receiver at, instead of a
    /// broker-assigned dynamic address. `None` requests a dynamic receiver.
    pub response_address: Option<String>,

    /// Per-request deadline in milliseconds. `0` disables the timeout.
    pub timeout_ms: u64,
}

impl Default for RpcClientOptions {
    fn default() -> Self {
        Self {
            address: "rpc/requests".to_string(),
            response_address: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Validate for RpcClientOptions {
    fn validate(&self) -> ConfigResult<()> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client address cannot be empty".to_string(),
            ));
        }
        if let Some(addr) = &self.response_address {
            if addr.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "response_address cannot be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}
