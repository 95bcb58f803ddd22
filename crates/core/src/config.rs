use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub gateway: GatewayConfig,
    pub rate_limit: RateLimitConfig,
    pub access: AccessConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// How long a connection waits on a locked database before giving up.
    /// SQLite under WAL still serializes writers, so deployments with heavy
    /// write contention may need to raise this.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://relay.db".to_string(),
            max_connections: 5,
            timeout_secs: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// Verification endpoint of the external identity provider. Optional in
    /// development (a static verifier can be wired in instead), required in
    /// production.
    pub verify_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Shared secret binding gateway and tenant backends. Empty outside
    /// production enables the permissive dev trust mode; empty in production
    /// fails validation.
    pub shared_secret: SecretString,
    pub routing_cache_ttl_secs: u64,
    pub upstream_timeout_secs: u64,
    /// Only consulted in global-access mode, where no tenant binding exists
    /// to route by.
    pub fallback_endpoint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub default_per_minute: u32,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// Grants access without a tenant binding when no tenant restricts
    /// domains or emails. Single-tenant and development deployments only.
    pub global_access: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub role: ServerRole,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerRole {
    Gateway,
    Backend,
    Combined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub environment: Option<Environment>,
    pub database_url: Option<String>,
    pub identity_verify_url: Option<String>,
    pub gateway_shared_secret: Option<String>,
    pub routing_cache_ttl_secs: Option<u64>,
    pub upstream_timeout_secs: Option<u64>,
    pub default_rate_limit: Option<u32>,
    pub global_access: Option<bool>,
    pub server_role: Option<ServerRole>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig::default(),
            identity: IdentityConfig { verify_url: None, timeout_secs: 10 },
            gateway: GatewayConfig {
                shared_secret: String::new().into(),
                routing_cache_ttl_secs: 300,
                upstream_timeout_secs: 300,
                fallback_endpoint: None,
            },
            rate_limit: RateLimitConfig { default_per_minute: 10 },
            access: AccessConfig { global_access: false },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                role: ServerRole::Combined,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Validation(format!(
                "unsupported environment `{other}` (expected development|production)"
            ))),
        }
    }
}

impl std::str::FromStr for ServerRole {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gateway" => Ok(Self::Gateway),
            "backend" => Ok(Self::Backend),
            "combined" => Ok(Self::Combined),
            other => Err(ConfigError::Validation(format!(
                "unsupported server role `{other}` (expected gateway|backend|combined)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(environment) = patch.environment {
            self.environment = environment;
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(busy_timeout_ms) = database.busy_timeout_ms {
                self.database.busy_timeout_ms = busy_timeout_ms;
            }
        }

        if let Some(identity) = patch.identity {
            if let Some(verify_url) = identity.verify_url {
                self.identity.verify_url = Some(verify_url);
            }
            if let Some(timeout_secs) = identity.timeout_secs {
                self.identity.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(shared_secret_value) = gateway.shared_secret {
                self.gateway.shared_secret = secret_value(shared_secret_value);
            }
            if let Some(routing_cache_ttl_secs) = gateway.routing_cache_ttl_secs {
                self.gateway.routing_cache_ttl_secs = routing_cache_ttl_secs;
            }
            if let Some(upstream_timeout_secs) = gateway.upstream_timeout_secs {
                self.gateway.upstream_timeout_secs = upstream_timeout_secs;
            }
            if let Some(fallback_endpoint) = gateway.fallback_endpoint {
                self.gateway.fallback_endpoint = Some(fallback_endpoint);
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(default_per_minute) = rate_limit.default_per_minute {
                self.rate_limit.default_per_minute = default_per_minute;
            }
        }

        if let Some(access) = patch.access {
            if let Some(global_access) = access.global_access {
                self.access.global_access = global_access;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(role) = server.role {
                self.server.role = role;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RELAY_ENVIRONMENT") {
            self.environment = value.parse()?;
        }

        if let Some(value) = read_env("RELAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RELAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RELAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RELAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RELAY_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RELAY_DATABASE_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = parse_u64("RELAY_DATABASE_BUSY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("RELAY_IDENTITY_VERIFY_URL") {
            self.identity.verify_url = Some(value);
        }
        if let Some(value) = read_env("RELAY_IDENTITY_TIMEOUT_SECS") {
            self.identity.timeout_secs = parse_u64("RELAY_IDENTITY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RELAY_GATEWAY_SECRET") {
            self.gateway.shared_secret = secret_value(value);
        }
        if let Some(value) = read_env("RELAY_GATEWAY_CACHE_TTL_SECS") {
            self.gateway.routing_cache_ttl_secs =
                parse_u64("RELAY_GATEWAY_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("RELAY_GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            self.gateway.upstream_timeout_secs =
                parse_u64("RELAY_GATEWAY_UPSTREAM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RELAY_GATEWAY_FALLBACK_ENDPOINT") {
            self.gateway.fallback_endpoint = Some(value);
        }

        if let Some(value) = read_env("RELAY_RATE_LIMIT_PER_MINUTE") {
            self.rate_limit.default_per_minute = parse_u32("RELAY_RATE_LIMIT_PER_MINUTE", &value)?;
        }

        if let Some(value) = read_env("RELAY_GLOBAL_ACCESS") {
            self.access.global_access = parse_bool("RELAY_GLOBAL_ACCESS", &value)?;
        }

        if let Some(value) = read_env("RELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RELAY_SERVER_PORT") {
            self.server.port = parse_u16("RELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RELAY_SERVER_ROLE") {
            self.server.role = value.parse()?;
        }
        if let Some(value) = read_env("RELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("RELAY_LOGGING_LEVEL").or_else(|| read_env("RELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RELAY_LOGGING_FORMAT").or_else(|| read_env("RELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(environment) = overrides.environment {
            self.environment = environment;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(identity_verify_url) = overrides.identity_verify_url {
            self.identity.verify_url = Some(identity_verify_url);
        }
        if let Some(gateway_shared_secret) = overrides.gateway_shared_secret {
            self.gateway.shared_secret = secret_value(gateway_shared_secret);
        }
        if let Some(routing_cache_ttl_secs) = overrides.routing_cache_ttl_secs {
            self.gateway.routing_cache_ttl_secs = routing_cache_ttl_secs;
        }
        if let Some(upstream_timeout_secs) = overrides.upstream_timeout_secs {
            self.gateway.upstream_timeout_secs = upstream_timeout_secs;
        }
        if let Some(default_rate_limit) = overrides.default_rate_limit {
            self.rate_limit.default_per_minute = default_rate_limit;
        }
        if let Some(global_access) = overrides.global_access {
            self.access.global_access = global_access;
        }
        if let Some(server_role) = overrides.server_role {
            self.server.role = server_role;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_identity(self.environment, &self.identity)?;
        validate_gateway(self.environment, &self.gateway)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// True when trust signatures must be enforced rather than warned about.
    pub fn trust_enforced(&self) -> bool {
        !self.gateway.shared_secret.expose_secret().is_empty()
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }
    if database.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if database.busy_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "database.busy_timeout_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(environment: Environment, identity: &IdentityConfig) -> Result<(), ConfigError> {
    if let Some(url) = &identity.verify_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "identity.verify_url must be an http(s) URL".to_string(),
            ));
        }
    } else if environment == Environment::Production {
        return Err(ConfigError::Validation(
            "identity.verify_url is required in production".to_string(),
        ));
    }

    if identity.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "identity.timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(environment: Environment, gateway: &GatewayConfig) -> Result<(), ConfigError> {
    // An unset secret in production would let anyone who reaches a backend
    // forge the identity headers. Refuse to start.
    if environment == Environment::Production
        && gateway.shared_secret.expose_secret().is_empty()
    {
        return Err(ConfigError::Validation(
            "gateway.shared_secret must be set in production".to_string(),
        ));
    }

    if gateway.routing_cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "gateway.routing_cache_ttl_secs must be greater than zero".to_string(),
        ));
    }
    if gateway.upstream_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "gateway.upstream_timeout_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(endpoint) = &gateway.fallback_endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "gateway.fallback_endpoint must be an http(s) URL".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if rate_limit.default_per_minute == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.default_per_minute must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "unsupported logging.level `{other}` (expected trace|debug|info|warn|error)"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    environment: Option<Environment>,
    database: Option<DatabasePatch>,
    identity: Option<IdentityPatch>,
    gateway: Option<GatewayPatch>,
    rate_limit: Option<RateLimitPatch>,
    access: Option<AccessPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityPatch {
    verify_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    shared_secret: Option<String>,
    routing_cache_ttl_secs: Option<u64>,
    upstream_timeout_secs: Option<u64>,
    fallback_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    default_per_minute: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AccessPatch {
    global_access: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    role: Option<ServerRole>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, Environment, LoadOptions,
        ServerRole,
    };

    fn load_from_toml(contents: &str) -> Result<AppConfig, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");

        AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
    }

    #[test]
    fn defaults_are_valid_for_development() {
        let config = AppConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.gateway.routing_cache_ttl_secs, 300);
        assert!(!config.trust_enforced());
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let config = load_from_toml(
            r#"
            environment = "production"

            [database]
            url = "sqlite://gateway.db"
            busy_timeout_ms = 15000

            [identity]
            verify_url = "https://identity.example.com/verify"

            [gateway]
            shared_secret = "super-secret"
            routing_cache_ttl_secs = 120

            [server]
            role = "gateway"
            port = 9000
            "#,
        )
        .expect("config should load");

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database.url, "sqlite://gateway.db");
        assert_eq!(config.database.busy_timeout_ms, 15_000);
        assert_eq!(config.gateway.routing_cache_ttl_secs, 120);
        assert_eq!(config.gateway.shared_secret.expose_secret(), "super-secret");
        assert_eq!(config.server.role, ServerRole::Gateway);
        assert_eq!(config.server.port, 9000);
        assert!(config.trust_enforced());
    }

    #[test]
    fn production_without_shared_secret_is_rejected() {
        let result = load_from_toml(
            r#"
            environment = "production"

            [identity]
            verify_url = "https://identity.example.com/verify"
            "#,
        );

        let message = result.err().expect("validation error").to_string();
        assert!(message.contains("gateway.shared_secret"));
    }

    #[test]
    fn production_without_identity_verify_url_is_rejected() {
        let result = load_from_toml(
            r#"
            environment = "production"

            [gateway]
            shared_secret = "super-secret"
            "#,
        );

        let message = result.err().expect("validation error").to_string();
        assert!(message.contains("identity.verify_url"));
    }

    #[test]
    fn programmatic_overrides_win_over_file_values() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"[rate_limit]\ndefault_per_minute = 5\n").expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                default_rate_limit: Some(42),
                global_access: Some(true),
                ..ConfigOverrides::default()
            },
        })
        .expect("config should load");

        assert_eq!(config.rate_limit.default_per_minute, 42);
        assert!(config.access.global_access);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist/relay.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn interpolation_rejects_unterminated_expression() {
        let result = interpolate_env_vars("secret = \"${RELAY_UNTERMINATED");
        assert!(matches!(result, Err(ConfigError::UnterminatedInterpolation)));
    }

    #[test]
    fn interpolation_reports_missing_variable() {
        let result = interpolate_env_vars("secret = \"${RELAY_DEFINITELY_NOT_SET_ANYWHERE}\"");
        assert!(matches!(result, Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "RELAY_DEFINITELY_NOT_SET_ANYWHERE"));
    }

    #[test]
    fn zero_busy_timeout_is_rejected() {
        let mut config = AppConfig::default();
        config.database.busy_timeout_ms = 0;
        let message = config.validate().err().expect("validation error").to_string();
        assert!(message.contains("database.busy_timeout_ms"));
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.default_per_minute = 0;
        let message = config.validate().err().expect("validation error").to_string();
        assert!(message.contains("rate_limit.default_per_minute"));
    }
}
