use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use relay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let shared_secret = if config.gateway.shared_secret.expose_secret().is_empty() {
        "<unset (permissive trust)>"
    } else {
        "<redacted>"
    };

    let lines = vec![
        "effective config (source precedence: overrides > env > file > default):".to_string(),
        render_line(
            "environment",
            &format!("{:?}", config.environment),
            source("environment", "RELAY_ENVIRONMENT"),
        ),
        render_line("database.url", &config.database.url, source("database.url", "RELAY_DATABASE_URL")),
        render_line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            source("database.max_connections", "RELAY_DATABASE_MAX_CONNECTIONS"),
        ),
        render_line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            source("database.timeout_secs", "RELAY_DATABASE_TIMEOUT_SECS"),
        ),
        render_line(
            "database.busy_timeout_ms",
            &config.database.busy_timeout_ms.to_string(),
            source("database.busy_timeout_ms", "RELAY_DATABASE_BUSY_TIMEOUT_MS"),
        ),
        render_line(
            "identity.verify_url",
            config.identity.verify_url.as_deref().unwrap_or("<unset (dev verifier)>"),
            source("identity.verify_url", "RELAY_IDENTITY_VERIFY_URL"),
        ),
        render_line(
            "identity.timeout_secs",
            &config.identity.timeout_secs.to_string(),
            source("identity.timeout_secs", "RELAY_IDENTITY_TIMEOUT_SECS"),
        ),
        render_line(
            "gateway.shared_secret",
            shared_secret,
            source("gateway.shared_secret", "RELAY_GATEWAY_SECRET"),
        ),
        render_line(
            "gateway.routing_cache_ttl_secs",
            &config.gateway.routing_cache_ttl_secs.to_string(),
            source("gateway.routing_cache_ttl_secs", "RELAY_GATEWAY_CACHE_TTL_SECS"),
        ),
        render_line(
            "gateway.upstream_timeout_secs",
            &config.gateway.upstream_timeout_secs.to_string(),
            source("gateway.upstream_timeout_secs", "RELAY_GATEWAY_UPSTREAM_TIMEOUT_SECS"),
        ),
        render_line(
            "gateway.fallback_endpoint",
            config.gateway.fallback_endpoint.as_deref().unwrap_or("<unset>"),
            source("gateway.fallback_endpoint", "RELAY_GATEWAY_FALLBACK_ENDPOINT"),
        ),
        render_line(
            "rate_limit.default_per_minute",
            &config.rate_limit.default_per_minute.to_string(),
            source("rate_limit.default_per_minute", "RELAY_RATE_LIMIT_PER_MINUTE"),
        ),
        render_line(
            "access.global_access",
            &config.access.global_access.to_string(),
            source("access.global_access", "RELAY_GLOBAL_ACCESS"),
        ),
        render_line(
            "server.bind_address",
            &config.server.bind_address,
            source("server.bind_address", "RELAY_SERVER_BIND_ADDRESS"),
        ),
        render_line(
            "server.port",
            &config.server.port.to_string(),
            source("server.port", "RELAY_SERVER_PORT"),
        ),
        render_line(
            "server.role",
            &format!("{:?}", config.server.role),
            source("server.role", "RELAY_SERVER_ROLE"),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", "RELAY_LOGGING_LEVEL"),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", "RELAY_LOGGING_FORMAT"),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
