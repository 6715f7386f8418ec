//! Tests for the configuration module.
//!
//! Covers default validity, validation failures, and file/env-var loading
//! for [`AppConfig`] and its `server`/`client`/`log` scopes.

use crate::config::{client::RpcClientOptions, server::RpcServerOptions, AppConfig, ConfigLoader, Validate};
use std::fs;

#[test]
fn default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn empty_server_address_is_rejected() {
    let mut config = AppConfig::default();
    config.server.address = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn empty_client_address_is_rejected() {
    let mut config = AppConfig::default();
    config.client.address = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn blank_response_address_is_rejected_but_unset_is_fine() {
    let mut config = RpcClientOptions::default();
    assert!(config.validate().is_ok());

    config.response_address = Some(String::new());
    assert!(config.validate().is_err());

    config.response_address = Some("client/replies".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut config = AppConfig::default();
    config.log.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn load_config_from_toml_file() {
    let dir = std::env::temp_dir().join(format!("amqp_rpc_test_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("config_file_test.toml");

    let config_content = r#"
    [server]
    address = "rpc/from-file"
    ignore_unknown_methods = true

    [client]
    address = "rpc/from-file"
    timeout_ms = 1234
    "#;
    fs::write(&config_path, config_content).unwrap();

    let loader = ConfigLoader::new(Some(&config_path), "AMQP_RPC_TEST_FILE");
    let config = loader.load().unwrap();

    assert_eq!(config.server.address, "rpc/from-file");
    assert!(config.server.ignore_unknown_methods);
    assert_eq!(config.client.timeout_ms, 1234);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn env_var_override_takes_precedence_over_file() {
    let dir = std::env::temp_dir().join(format!("amqp_rpc_test_env_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("config_env_test.toml");

    fs::write(
        &config_path,
        r#"
        [server]
        address = "rpc/from-file"
        "#,
    )
    .unwrap();

    std::env::set_var("AMQP_RPC_TEST_ENV__SERVER__ADDRESS", "rpc/from-env");

    let loader = ConfigLoader::new(Some(&config_path), "AMQP_RPC_TEST_ENV");
    let config = loader.load().unwrap();
    assert_eq!(config.server.address, "rpc/from-env");

    std::env::remove_var("AMQP_RPC_TEST_ENV__SERVER__ADDRESS");
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn loading_a_malformed_file_fails() {
    let dir = std::env::temp_dir().join(format!("amqp_rpc_test_bad_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("invalid.toml");
    fs::write(&config_path, "[server\naddress = not valid toml").unwrap();

    let loader = ConfigLoader::new(Some(&config_path), "AMQP_RPC_TEST_BAD");
    assert!(loader.load().is_err());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_config_file_is_reported() {
    let loader = ConfigLoader::new(
        Some("/nonexistent/amqp_rpc_config.toml"),
        "AMQP_RPC_TEST_MISSING",
    );
    assert!(loader.load().is_err());
}

#[test]
fn server_options_default_address() {
    assert_eq!(RpcServerOptions::default().address, "rpc/requests");
}
