//! Config module tests

use std::time::Duration;

use super::*;

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("DOCBRIDGE_TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${DOCBRIDGE_TEST_VAR_SIMPLE}\"");
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("DOCBRIDGE_TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    std::env::remove_var("DOCBRIDGE_TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${DOCBRIDGE_TEST_VAR_UNSET:-default_value}\"");
    assert_eq!(result, "value = \"default_value\"");

    std::env::set_var("DOCBRIDGE_TEST_VAR_SET", "env_value");
    let result = substitute_env_vars("value = \"${DOCBRIDGE_TEST_VAR_SET:-default_value}\"");
    assert_eq!(result, "value = \"env_value\"");
    std::env::remove_var("DOCBRIDGE_TEST_VAR_SET");
}

#[test]
fn test_substitute_env_vars_missing_no_default() {
    std::env::remove_var("DOCBRIDGE_TEST_VAR_MISSING");
    let result = substitute_env_vars("value = \"${DOCBRIDGE_TEST_VAR_MISSING}\"");
    assert_eq!(result, "value = \"\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("docbridge.toml");

    std::env::set_var("DOCBRIDGE_TEST_MONGO_HOST", "db.internal");

    let config_content = r#"
[broker]
host = "broker.internal"
keep_alive = ${DOCBRIDGE_TEST_KEEP_ALIVE:-30}

[store]
uri = "mongodb://${DOCBRIDGE_TEST_MONGO_HOST}:27017"
"#;

    std::fs::write(&config_path, config_content).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.broker.host, "broker.internal");
    assert_eq!(config.broker.keep_alive, 30);
    assert_eq!(config.store.uri, "mongodb://db.internal:27017");
    assert_eq!(config.store.database, "mqtt");

    std::env::remove_var("DOCBRIDGE_TEST_MONGO_HOST");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config::load(temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.broker.address(), "localhost:1883");
    assert_eq!(config.store.collection, "messages");
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.log.level, "info");
    assert_eq!(config.broker.host, "localhost");
    assert_eq!(config.broker.effective_port(), 1883);
    assert_eq!(config.broker.keep_alive, 60);
    assert_eq!(config.broker.topic_filter, "#");
    assert_eq!(config.store.uri, "mongodb://localhost:27017");
    assert_eq!(config.store.database, "mqtt");
    assert_eq!(config.store.collection, "messages");
    assert_eq!(config.forwarder.workers, 0);
    assert_eq!(config.forwarder.overflow, OverflowPolicy::Block);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_full_config() {
    let toml = r##"
[log]
level = "debug"

[broker]
host = "mqtt.example.com"
client_id = "edge-forwarder"
username = "forwarder"
password = "secret"
keep_alive = 30
clean_session = false
topic_filter = "sensors/#"
qos = 1
connect_timeout = "10s"
reconnect = false
reconnect_interval = "500ms"
max_reconnect_interval = "30s"

[broker.tls]
ca_cert = "/etc/docbridge/ca.pem"
server_name = "mqtt.example.com"

[store]
uri = "fjall:///var/lib/docbridge"
database = "telemetry"
collection = "readings"

[forwarder]
workers = 4
queue_capacity = 256
overflow = "drop"
"##;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.broker.host, "mqtt.example.com");
    assert_eq!(config.broker.effective_port(), 8883);
    assert_eq!(config.broker.client_id, "edge-forwarder");
    assert_eq!(config.broker.username.as_deref(), Some("forwarder"));
    assert!(!config.broker.clean_session);
    assert_eq!(config.broker.topic_filter, "sensors/#");
    assert_eq!(config.broker.qos, 1);
    assert_eq!(config.broker.connect_timeout, Duration::from_secs(10));
    assert!(!config.broker.reconnect);
    assert_eq!(config.broker.reconnect_interval, Duration::from_millis(500));
    assert_eq!(
        config.broker.tls.as_ref().unwrap().server_name.as_deref(),
        Some("mqtt.example.com")
    );
    assert_eq!(config.store.database, "telemetry");
    assert_eq!(config.forwarder.workers, 4);
    assert_eq!(config.forwarder.queue_capacity, 256);
    assert_eq!(config.forwarder.overflow, OverflowPolicy::Drop);
}

#[test]
fn test_invalid_qos() {
    let toml = r#"
[broker]
qos = 2
"#;
    assert!(matches!(
        Config::parse(toml),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_invalid_topic_filter() {
    let toml = r#"
[broker]
topic_filter = "sensors/#/temp"
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_password_without_username() {
    let toml = r#"
[broker]
password = "secret"
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_tls_requires_ca_cert() {
    let toml = r#"
[broker.tls]
ca_cert = ""
"#;
    assert!(Config::parse(toml).is_err());

    let toml = r#"
[broker.tls]
ca_cert = "/etc/docbridge/ca.pem"
client_cert = "/etc/docbridge/client.pem"
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_reconnect_bounds() {
    let toml = r#"
[broker]
reconnect_interval = "10s"
max_reconnect_interval = "5s"
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_empty_store_names() {
    let toml = r#"
[store]
collection = ""
"#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_pool_requires_queue_capacity() {
    let toml = r#"
[forwarder]
workers = 2
queue_capacity = 0
"#;
    assert!(Config::parse(toml).is_err());

    // Inline mode ignores the queue
    let toml = r#"
[forwarder]
workers = 0
queue_capacity = 0
"#;
    assert!(Config::parse(toml).is_ok());
}

#[test]
fn test_unknown_overflow_policy() {
    let toml = r#"
[forwarder]
overflow = "spill"
"#;
    assert!(matches!(Config::parse(toml), Err(ConfigError::Parse(_))));
}
