use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use libdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config),
        Err(error) => format!("config validation failed: {error}"),
    }
}

/// Effective config, one line per field, with where each value came from.
pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = config.llm.api_key.as_ref().map(|key| redact_secret(key.expose_secret()));
    let fields: [(&str, String, &[&str]); 16] = [
        ("database.url", config.database.url.clone(), &["LIBDESK_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["LIBDESK_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["LIBDESK_DATABASE_TIMEOUT_SECS"],
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), &["LIBDESK_LLM_PROVIDER"]),
        ("llm.model", config.llm.model.clone(), &["LIBDESK_LLM_MODEL"]),
        (
            "llm.base_url",
            config.llm.endpoint_base().to_string(),
            &["LIBDESK_LLM_BASE_URL"],
        ),
        (
            "llm.api_key",
            api_key.unwrap_or_else(|| "<unset>".to_string()),
            &["LIBDESK_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["LIBDESK_LLM_TIMEOUT_SECS"]),
        (
            "agent.max_tool_rounds",
            config.agent.max_tool_rounds.to_string(),
            &["LIBDESK_AGENT_MAX_TOOL_ROUNDS"],
        ),
        (
            "agent.history_limit",
            config.agent.history_limit.to_string(),
            &["LIBDESK_AGENT_HISTORY_LIMIT"],
        ),
        (
            "inventory.low_stock_threshold",
            config.inventory.low_stock_threshold.to_string(),
            &["LIBDESK_INVENTORY_LOW_STOCK_THRESHOLD"],
        ),
        ("server.bind_address", config.server.bind_address.clone(), &["LIBDESK_SERVER_BIND_ADDRESS"]),
        ("server.port", config.server.port.to_string(), &["LIBDESK_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["LIBDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["LIBDESK_LOGGING_LEVEL", "LIBDESK_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["LIBDESK_LOGGING_FORMAT", "LIBDESK_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("libdesk.toml"), PathBuf::from("config/libdesk.toml")]
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
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

/// Keeps a recognisable key prefix (`sk-`) and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
