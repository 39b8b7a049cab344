use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use funnelsight_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in effective_values(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

type Setting = (&'static str, String, &'static [&'static str]);

fn setting(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Setting {
    (key, value, env_keys)
}

/// Key path, rendered value and env overrides of every reported setting.
fn effective_values(config: &AppConfig) -> Vec<Setting> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        setting("warehouse.url", config.warehouse.url.clone(), &["FUNNELSIGHT_WAREHOUSE_URL"]),
        setting(
            "warehouse.max_connections",
            config.warehouse.max_connections.to_string(),
            &["FUNNELSIGHT_WAREHOUSE_MAX_CONNECTIONS"],
        ),
        setting(
            "warehouse.timeout_secs",
            config.warehouse.timeout_secs.to_string(),
            &["FUNNELSIGHT_WAREHOUSE_TIMEOUT_SECS"],
        ),
        setting(
            "warehouse.table",
            config.warehouse.table.clone(),
            &["FUNNELSIGHT_WAREHOUSE_TABLE"],
        ),
        setting(
            "warehouse.max_rows",
            config.warehouse.max_rows.to_string(),
            &["FUNNELSIGHT_WAREHOUSE_MAX_ROWS"],
        ),
        setting(
            "llm.provider",
            config.llm.provider.as_str().to_string(),
            &["FUNNELSIGHT_LLM_PROVIDER"],
        ),
        setting("llm.model", config.llm.model.clone(), &["FUNNELSIGHT_LLM_MODEL"]),
        setting(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["FUNNELSIGHT_LLM_BASE_URL"],
        ),
        setting("llm.api_key", api_key, &["FUNNELSIGHT_LLM_API_KEY"]),
        setting(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["FUNNELSIGHT_LLM_TIMEOUT_SECS"],
        ),
        setting(
            "llm.max_retries",
            config.llm.max_retries.to_string(),
            &["FUNNELSIGHT_LLM_MAX_RETRIES"],
        ),
        setting("llm.business_temperature", config.llm.business_temperature.to_string(), &[]),
        setting("llm.data_temperature", config.llm.data_temperature.to_string(), &[]),
        setting(
            "workflow.max_tool_rounds",
            config.workflow.max_tool_rounds.to_string(),
            &["FUNNELSIGHT_WORKFLOW_MAX_TOOL_ROUNDS"],
        ),
        setting(
            "workflow.fallback_window_days",
            config.workflow.fallback_window_days.to_string(),
            &["FUNNELSIGHT_WORKFLOW_FALLBACK_WINDOW_DAYS"],
        ),
        setting(
            "workflow.max_clarifying_questions",
            config.workflow.max_clarifying_questions.to_string(),
            &[],
        ),
        setting(
            "workflow.checkpoint_backend",
            config.workflow.checkpoint_backend.as_str().to_string(),
            &["FUNNELSIGHT_WORKFLOW_CHECKPOINT_BACKEND"],
        ),
        setting("workflow.checkpoint_history", config.workflow.checkpoint_history.to_string(), &[]),
        setting(
            "logging.level",
            config.logging.level.clone(),
            &["FUNNELSIGHT_LOGGING_LEVEL", "FUNNELSIGHT_LOG_LEVEL"],
        ),
        setting(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["FUNNELSIGHT_LOGGING_FORMAT", "FUNNELSIGHT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("funnelsight.toml"), PathBuf::from("config/funnelsight.toml")]
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

/// Keeps a recognisable key prefix such as `sk-` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
