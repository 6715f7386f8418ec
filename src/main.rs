// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Amqp Rpc demo binary.
//!
//! Wires an [`RpcServer`] and [`RpcClient`] together over an in-process
//! [`MockTransport`] and runs one request/response and one notification, to
//! exercise the crate the way an embedder would. There is no real broker
//! integration here — see [`amqp_rpc::transport`] for the abstract
//! transport contract a real one would implement.

mod config;
mod error;
mod protocol;
mod transport;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use config::client::RpcClientOptions;
use config::server::RpcServerOptions;
use error::{set_error_reporter, AmqpRpcResult, TracingErrorReporter};
use protocol::registry::handler_fn;
use protocol::{CallParams, RpcClient, RpcServer};
use transport::mock::MockTransport;

/// Command line arguments for the Amqp Rpc demo binary.
#[derive(Parser, Debug)]
#[clap(name = "Amqp Rpc", version, author, about)]
struct Args {
    /// Path to configuration file.
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Command to execute.
    #[clap(subcommand)]
    command: Option<Command>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo server/client exchange.
    Demo,

    /// Validate the configuration file.
    Validate,

    /// Generate a default configuration file.
    GenConfig {
        /// Path to output configuration file.
        #[clap(short, long, value_parser)]
        output: PathBuf,
    },
}

/// Initializes the logging system.
fn init_logging() -> AmqpRpcResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_line_number(true)
        .with_file(true)
        .with_thread_names(true)
        .pretty()
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        error::AmqpRpcError::Custom(format!("failed to set global tracing subscriber: {e}"))
    })
}

/// Binds an `echo(one, two, three)` method and a `forward` method that
/// demonstrates the pass-through rule (spec.md §4.1), then listens.
fn spawn_demo_server(transport: MockTransport, options: RpcServerOptions) -> Arc<RpcServer<MockTransport>> {
    let server = RpcServer::new(transport, options);
    server
        .bind(
            "echo",
            ["one", "two", "three"],
            handler_fn(|args| async move { Ok(Value::Array(args)) }),
        )
        .expect("echo is bound exactly once");
    server
        .bind(
            "forward",
            ["target"],
            handler_fn(|args| async move {
                let target = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!({ "method": target }))
            }),
        )
        .expect("forward is bound exactly once");

    let listening = server.clone();
    tokio::spawn(async move {
        if let Err(e) = listening.listen().await {
            tracing::error!(error = %e, "demo server stopped");
        }
    });
    server
}

async fn run_demo(server_options: RpcServerOptions, client_options: RpcClientOptions) -> AmqpRpcResult<()> {
    let transport = MockTransport::new();
    let _server = spawn_demo_server(transport.clone(), server_options.clone());
    tokio::task::yield_now().await;

    let client = RpcClient::connect(
        transport,
        RpcClientOptions {
            // The demo always wires the client straight to the demo server's
            // own (possibly configured) address, regardless of what a config
            // file happened to set, so the two stay self-consistent.
            address: server_options.address.clone(),
            ..client_options
        },
    )
    .await?;

    let result = client
        .call("echo", vec![json!(1), json!("two"), json!(false)])
        .await
        .map_err(|e| error::AmqpRpcError::Custom(e.to_string()))?;
    info!(?result, "echo call resolved");

    client
        .notify("echo", vec![json!("fire-and-forget")])
        .await
        .map_err(|e| error::AmqpRpcError::Custom(e.to_string()))?;
    info!("notification sent");

    Ok(())
}

fn main() -> AmqpRpcResult<()> {
    init_logging()?;
    set_error_reporter(Arc::new(TracingErrorReporter));

    let args = <Args as clap::Parser>::parse();
    let env_prefix = "AMQP_RPC";
    let config_loader = config::ConfigLoader::new(args.config.as_deref(), env_prefix);

    match args.command.unwrap_or(Command::Demo) {
        Command::Demo => {
            info!("running amqp_rpc demo exchange");

            let config = match config_loader.load() {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!("configuration error: {e}");
                    process::exit(1);
                }
            };
            config::init_global_config(config);
            let config = config::get_global_config().get();

            let runtime = tokio::runtime::Runtime::new()
                .map_err(|e| error::AmqpRpcError::Custom(format!("failed to start runtime: {e}")))?;
            runtime.block_on(run_demo(config.server.clone(), config.client.clone()))
        }
        Command::Validate => {
            info!("validating configuration");
            match config_loader.load() {
                Ok(_) => {
                    info!("configuration validated successfully");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("configuration validation error: {e}");
                    process::exit(1);
                }
            }
        }
        Command::GenConfig { output } => {
            info!("generating default configuration");
            let default_config = config::AppConfig::default();

            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| error::AmqpRpcError::Custom(e.to_string()))?;
            }

            let toml = toml::to_string_pretty(&default_config)
                .map_err(|e| error::AmqpRpcError::Custom(format!("failed to serialize config: {e}")))?;
            std::fs::write(&output, toml).map_err(|e| error::AmqpRpcError::Custom(e.to_string()))?;

            info!("default configuration written to {:?}", output);
            Ok(())
        }
    }
}
