//! Test modules for the Amqp Rpc crate.
//!
//! Beyond the `#[cfg(test)]` units embedded alongside each module, this
//! tree holds cross-cutting tests for the error and configuration layers.

pub mod config_tests;
