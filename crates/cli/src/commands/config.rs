use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use storefront_core::config::{AppConfig, LoadOptions, ProviderCredentials};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            Some(field.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let mut fields = vec![
        Field::new("database.url", "STOREFRONT_DATABASE_URL", config.database.url.clone()),
        Field::new(
            "database.max_connections",
            "STOREFRONT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "STOREFRONT_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "STOREFRONT_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", "STOREFRONT_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "server.public_base_url",
            "STOREFRONT_SERVER_PUBLIC_BASE_URL",
            config.server.public_base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            "STOREFRONT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new(
            "server.static_dir",
            "STOREFRONT_SERVER_STATIC_DIR",
            config.server.static_dir.display().to_string(),
        ),
        Field::new(
            "auth.signing_key",
            "STOREFRONT_AUTH_SIGNING_KEY",
            redact_secret(&config.auth.signing_key),
        ),
        Field::new(
            "auth.correlation_ttl_secs",
            "STOREFRONT_AUTH_CORRELATION_TTL_SECS",
            config.auth.correlation_ttl_secs.to_string(),
        ),
        Field::new(
            "auth.external_login_ttl_secs",
            "STOREFRONT_AUTH_EXTERNAL_LOGIN_TTL_SECS",
            config.auth.external_login_ttl_secs.to_string(),
        ),
    ];

    fields.extend(provider_fields(
        ("auth.google.client_id", "STOREFRONT_AUTH_GOOGLE_CLIENT_ID"),
        ("auth.google.client_secret", "STOREFRONT_AUTH_GOOGLE_CLIENT_SECRET"),
        &config.auth.google,
    ));
    fields.extend(provider_fields(
        ("auth.facebook.client_id", "STOREFRONT_AUTH_FACEBOOK_CLIENT_ID"),
        ("auth.facebook.client_secret", "STOREFRONT_AUTH_FACEBOOK_CLIENT_SECRET"),
        &config.auth.facebook,
    ));

    fields.extend([
        Field::new(
            "session.cookie_name",
            "STOREFRONT_SESSION_COOKIE_NAME",
            config.session.cookie_name.clone(),
        ),
        Field::new(
            "session.expire_days",
            "STOREFRONT_SESSION_EXPIRE_DAYS",
            config.session.expire_days.to_string(),
        ),
        Field::new(
            "session.sliding_expiration",
            "STOREFRONT_SESSION_SLIDING_EXPIRATION",
            config.session.sliding_expiration.to_string(),
        ),
        Field::new(
            "session.secure_cookies",
            "STOREFRONT_SESSION_SECURE_COOKIES",
            config.session.secure_cookies.to_string(),
        ),
        Field::new("logging.level", "STOREFRONT_LOGGING_LEVEL", config.logging.level.clone()),
        Field::new(
            "logging.format",
            "STOREFRONT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]);

    fields
}

fn provider_fields(
    (id_key, id_env): (&'static str, &'static str),
    (secret_key, secret_env): (&'static str, &'static str),
    credentials: &ProviderCredentials,
) -> [Field; 2] {
    let secret =
        credentials.client_secret.as_ref().map_or_else(|| "<unset>".to_string(), redact_secret);

    [
        Field::new(id_key, id_env, credentials.client_id.as_deref().unwrap_or("<unset>")),
        Field::new(secret_key, secret_env, secret),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("storefront.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/storefront.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
