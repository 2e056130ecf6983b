use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_SIGNING_KEY_BYTES: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_base_url: Option<String>,
    pub graceful_shutdown_secs: u64,
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Origin used to build provider callback URLs.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind_address, self.port),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub signing_key: SecretString,
    pub correlation_ttl_secs: u64,
    pub external_login_ttl_secs: u64,
    pub google: ProviderCredentials,
    pub facebook: ProviderCredentials,
}

#[derive(Clone, Debug, Default)]
pub struct ProviderCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

impl ProviderCredentials {
    pub fn is_enabled(&self) -> bool {
        let has_id = self.client_id.as_deref().map(|id| !id.trim().is_empty()).unwrap_or(false);
        let has_secret = self
            .client_secret
            .as_ref()
            .map(|secret| !secret.expose_secret().trim().is_empty())
            .unwrap_or(false);
        has_id && has_secret
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub expire_days: u32,
    pub sliding_expiration: bool,
    pub secure_cookies: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub public_base_url: Option<String>,
    pub signing_key: Option<String>,
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
            database: DatabaseConfig {
                url: "sqlite://storefront.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                public_base_url: None,
                graceful_shutdown_secs: 15,
                static_dir: PathBuf::from("wwwroot"),
            },
            auth: AuthConfig {
                signing_key: String::new().into(),
                correlation_ttl_secs: 900,
                external_login_ttl_secs: 900,
                google: ProviderCredentials::default(),
                facebook: ProviderCredentials::default(),
            },
            session: SessionConfig {
                cookie_name: "storefront_session".to_string(),
                expire_days: 30,
                sliding_expiration: true,
                secure_cookies: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("storefront.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = Some(public_base_url);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = static_dir;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(signing_key_value) = auth.signing_key {
                self.auth.signing_key = secret_value(signing_key_value);
            }
            if let Some(correlation_ttl_secs) = auth.correlation_ttl_secs {
                self.auth.correlation_ttl_secs = correlation_ttl_secs;
            }
            if let Some(external_login_ttl_secs) = auth.external_login_ttl_secs {
                self.auth.external_login_ttl_secs = external_login_ttl_secs;
            }
            if let Some(google) = auth.google {
                google.apply_to(&mut self.auth.google);
            }
            if let Some(facebook) = auth.facebook {
                facebook.apply_to(&mut self.auth.facebook);
            }
        }

        if let Some(session) = patch.session {
            if let Some(cookie_name) = session.cookie_name {
                self.session.cookie_name = cookie_name;
            }
            if let Some(expire_days) = session.expire_days {
                self.session.expire_days = expire_days;
            }
            if let Some(sliding_expiration) = session.sliding_expiration {
                self.session.sliding_expiration = sliding_expiration;
            }
            if let Some(secure_cookies) = session.secure_cookies {
                self.session.secure_cookies = secure_cookies;
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
        if let Some(value) = read_env("STOREFRONT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("STOREFRONT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STOREFRONT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STOREFRONT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_PORT") {
            self.server.port = parse_u16("STOREFRONT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(value);
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SERVER_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("STOREFRONT_AUTH_SIGNING_KEY") {
            self.auth.signing_key = secret_value(value);
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_CORRELATION_TTL_SECS") {
            self.auth.correlation_ttl_secs =
                parse_u64("STOREFRONT_AUTH_CORRELATION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_EXTERNAL_LOGIN_TTL_SECS") {
            self.auth.external_login_ttl_secs =
                parse_u64("STOREFRONT_AUTH_EXTERNAL_LOGIN_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_GOOGLE_CLIENT_ID") {
            self.auth.google.client_id = Some(value);
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_GOOGLE_CLIENT_SECRET") {
            self.auth.google.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_FACEBOOK_CLIENT_ID") {
            self.auth.facebook.client_id = Some(value);
        }
        if let Some(value) = read_env("STOREFRONT_AUTH_FACEBOOK_CLIENT_SECRET") {
            self.auth.facebook.client_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("STOREFRONT_SESSION_COOKIE_NAME") {
            self.session.cookie_name = value;
        }
        if let Some(value) = read_env("STOREFRONT_SESSION_EXPIRE_DAYS") {
            self.session.expire_days = parse_u32("STOREFRONT_SESSION_EXPIRE_DAYS", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSION_SLIDING_EXPIRATION") {
            self.session.sliding_expiration =
                parse_bool("STOREFRONT_SESSION_SLIDING_EXPIRATION", &value)?;
        }
        if let Some(value) = read_env("STOREFRONT_SESSION_SECURE_COOKIES") {
            self.session.secure_cookies = parse_bool("STOREFRONT_SESSION_SECURE_COOKIES", &value)?;
        }

        let log_level =
            read_env("STOREFRONT_LOGGING_LEVEL").or_else(|| read_env("STOREFRONT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STOREFRONT_LOGGING_FORMAT").or_else(|| read_env("STOREFRONT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(public_base_url) = overrides.public_base_url {
            self.server.public_base_url = Some(public_base_url);
        }
        if let Some(signing_key) = overrides.signing_key {
            self.auth.signing_key = secret_value(signing_key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("storefront.toml"), PathBuf::from("config/storefront.toml")]
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

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(base_url) = &server.public_base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "server.public_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let signing_key = auth.signing_key.expose_secret();
    if signing_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.signing_key is required. Generate one with `openssl rand -hex 32`".to_string(),
        ));
    }
    if signing_key.len() < MIN_SIGNING_KEY_BYTES {
        return Err(ConfigError::Validation(format!(
            "auth.signing_key must be at least {MIN_SIGNING_KEY_BYTES} bytes"
        )));
    }

    if auth.correlation_ttl_secs == 0 || auth.correlation_ttl_secs > 3600 {
        return Err(ConfigError::Validation(
            "auth.correlation_ttl_secs must be in range 1..=3600".to_string(),
        ));
    }
    if auth.external_login_ttl_secs == 0 || auth.external_login_ttl_secs > 3600 {
        return Err(ConfigError::Validation(
            "auth.external_login_ttl_secs must be in range 1..=3600".to_string(),
        ));
    }

    validate_provider("google", &auth.google)?;
    validate_provider("facebook", &auth.facebook)?;
    Ok(())
}

fn validate_provider(name: &str, credentials: &ProviderCredentials) -> Result<(), ConfigError> {
    let has_id = credentials.client_id.is_some();
    let has_secret = credentials.client_secret.is_some();
    if has_id && !has_secret {
        return Err(ConfigError::Validation(format!(
            "auth.{name}.client_secret is required when auth.{name}.client_id is set"
        )));
    }
    if has_secret && !has_id {
        return Err(ConfigError::Validation(format!(
            "auth.{name}.client_id is required when auth.{name}.client_secret is set"
        )));
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    let name = session.cookie_name.as_str();
    let valid_name = !name.is_empty()
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    if !valid_name {
        return Err(ConfigError::Validation(
            "session.cookie_name must be non-empty and use only [A-Za-z0-9_.-]".to_string(),
        ));
    }

    if session.expire_days == 0 || session.expire_days > 365 {
        return Err(ConfigError::Validation(
            "session.expire_days must be in range 1..=365".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
    graceful_shutdown_secs: Option<u64>,
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    signing_key: Option<String>,
    correlation_ttl_secs: Option<u64>,
    external_login_ttl_secs: Option<u64>,
    google: Option<ProviderPatch>,
    facebook: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl ProviderPatch {
    fn apply_to(self, credentials: &mut ProviderCredentials) {
        if let Some(client_id) = self.client_id {
            credentials.client_id = Some(client_id);
        }
        if let Some(client_secret_value) = self.client_secret {
            credentials.client_secret = Some(secret_value(client_secret_value));
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    cookie_name: Option<String>,
    expire_days: Option<u32>,
    sliding_expiration: Option<bool>,
    secure_cookies: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
