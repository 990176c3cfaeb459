use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use registrar_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Effective configuration with the layer each value came from.
pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str], overridden: bool| {
        if overridden {
            return "flag".to_string();
        }
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };
    let overrides = &options.overrides;

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &redact_url(&config.database.url),
        source("database.url", &["REGISTRAR_DATABASE_URL"], overrides.database_url.is_some()),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["REGISTRAR_DATABASE_MAX_CONNECTIONS"], false),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["REGISTRAR_DATABASE_TIMEOUT_SECS"], false),
    ));
    lines.push(render_line(
        "execution.claim_timeout_secs",
        &config.execution.claim_timeout_secs.to_string(),
        source("execution.claim_timeout_secs", &["REGISTRAR_EXECUTION_CLAIM_TIMEOUT_SECS"], false),
    ));
    lines.push(render_line(
        "notifications.sink",
        &format!("{:?}", config.notifications.sink),
        source(
            "notifications.sink",
            &["REGISTRAR_NOTIFICATIONS_SINK"],
            overrides.notification_sink.is_some(),
        ),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source(
            "logging.level",
            &["REGISTRAR_LOGGING_LEVEL", "REGISTRAR_LOG_LEVEL"],
            overrides.log_level.is_some(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source(
            "logging.format",
            &["REGISTRAR_LOGGING_FORMAT", "REGISTRAR_LOG_FORMAT"],
            overrides.log_format.is_some(),
        ),
    ));
    lines.push(render_line(
        "workflows.disabled",
        &render_list(&config.workflows.disabled),
        source("workflows.disabled", &["REGISTRAR_WORKFLOWS_DISABLED"], false),
    ));
    for (request_type, roles) in &config.workflows.overrides {
        let key = format!("workflows.overrides.{request_type}");
        lines.push(render_line(&key, &render_list(roles), source(key.as_str(), &[], false)));
    }

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("registrar.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/registrar.toml");
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

fn render_list(values: &[String]) -> String {
    if values.is_empty() {
        return "<none>".to_string();
    }
    values.join(", ")
}

/// Hides credentials embedded as `user:password@host`.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) if credentials.contains(':') => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        _ => url.to_string(),
    }
}
