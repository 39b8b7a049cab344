use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WarehouseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// Funnel table every analytical query must reference.
    pub table: String,
    /// Rows handed back to the data agent per query.
    pub max_rows: usize,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    /// Provider default when unset: the hosted API or a local Ollama.
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub business_temperature: f32,
    pub data_temperature: f32,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub interpretation_history_window: usize,
    pub interpretation_truncate_chars: usize,
    pub synthesis_history_window: usize,
    pub synthesis_truncate_chars: usize,
    pub verbosity_history_window: usize,
    pub max_clarifying_questions: usize,
    pub max_tool_rounds: usize,
    pub fallback_window_days: u32,
    pub checkpoint_backend: CheckpointBackend,
    /// Query invocations kept per thread checkpoint.
    pub checkpoint_history: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    Disabled,
    Memory,
    Sqlite,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub warehouse_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub checkpoint_backend: Option<CheckpointBackend>,
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
            warehouse: WarehouseConfig {
                url: "sqlite://funnelsight.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                table: "funnels_resumido".to_string(),
                max_rows: 200,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_retries: 2,
                business_temperature: 0.3,
                data_temperature: 0.1,
            },
            workflow: WorkflowConfig {
                interpretation_history_window: 6,
                interpretation_truncate_chars: 200,
                synthesis_history_window: 4,
                synthesis_truncate_chars: 100,
                verbosity_history_window: 4,
                max_clarifying_questions: 3,
                max_tool_rounds: 3,
                fallback_window_days: 30,
                checkpoint_backend: CheckpointBackend::Sqlite,
                checkpoint_history: 20,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
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

impl std::str::FromStr for CheckpointBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported checkpoint backend `{other}` (expected disabled|memory|sqlite)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl CheckpointBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
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
                options.config_path.unwrap_or_else(|| PathBuf::from("funnelsight.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(warehouse) = patch.warehouse {
            if let Some(url) = warehouse.url {
                self.warehouse.url = url;
            }
            if let Some(max_connections) = warehouse.max_connections {
                self.warehouse.max_connections = max_connections;
            }
            if let Some(timeout_secs) = warehouse.timeout_secs {
                self.warehouse.timeout_secs = timeout_secs;
            }
            if let Some(table) = warehouse.table {
                self.warehouse.table = table;
            }
            if let Some(max_rows) = warehouse.max_rows {
                self.warehouse.max_rows = max_rows;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(temperature) = llm.business_temperature {
                self.llm.business_temperature = temperature;
            }
            if let Some(temperature) = llm.data_temperature {
                self.llm.data_temperature = temperature;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(value) = workflow.interpretation_history_window {
                self.workflow.interpretation_history_window = value;
            }
            if let Some(value) = workflow.interpretation_truncate_chars {
                self.workflow.interpretation_truncate_chars = value;
            }
            if let Some(value) = workflow.synthesis_history_window {
                self.workflow.synthesis_history_window = value;
            }
            if let Some(value) = workflow.synthesis_truncate_chars {
                self.workflow.synthesis_truncate_chars = value;
            }
            if let Some(value) = workflow.verbosity_history_window {
                self.workflow.verbosity_history_window = value;
            }
            if let Some(value) = workflow.max_clarifying_questions {
                self.workflow.max_clarifying_questions = value;
            }
            if let Some(value) = workflow.max_tool_rounds {
                self.workflow.max_tool_rounds = value;
            }
            if let Some(value) = workflow.fallback_window_days {
                self.workflow.fallback_window_days = value;
            }
            if let Some(value) = workflow.checkpoint_backend {
                self.workflow.checkpoint_backend = value;
            }
            if let Some(value) = workflow.checkpoint_history {
                self.workflow.checkpoint_history = value;
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
        if let Some(value) = read_env("FUNNELSIGHT_WAREHOUSE_URL") {
            self.warehouse.url = value;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WAREHOUSE_MAX_CONNECTIONS") {
            self.warehouse.max_connections =
                parse_u32("FUNNELSIGHT_WAREHOUSE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WAREHOUSE_TIMEOUT_SECS") {
            self.warehouse.timeout_secs = parse_u64("FUNNELSIGHT_WAREHOUSE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WAREHOUSE_TABLE") {
            self.warehouse.table = value;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WAREHOUSE_MAX_ROWS") {
            self.warehouse.max_rows = parse_usize("FUNNELSIGHT_WAREHOUSE_MAX_ROWS", &value)?;
        }

        if let Some(value) = read_env("FUNNELSIGHT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FUNNELSIGHT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("FUNNELSIGHT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("FUNNELSIGHT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FUNNELSIGHT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("FUNNELSIGHT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("FUNNELSIGHT_WORKFLOW_MAX_TOOL_ROUNDS") {
            self.workflow.max_tool_rounds =
                parse_usize("FUNNELSIGHT_WORKFLOW_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WORKFLOW_FALLBACK_WINDOW_DAYS") {
            self.workflow.fallback_window_days =
                parse_u32("FUNNELSIGHT_WORKFLOW_FALLBACK_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("FUNNELSIGHT_WORKFLOW_CHECKPOINT_BACKEND") {
            self.workflow.checkpoint_backend = value.parse()?;
        }

        let log_level =
            read_env("FUNNELSIGHT_LOGGING_LEVEL").or_else(|| read_env("FUNNELSIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FUNNELSIGHT_LOGGING_FORMAT").or_else(|| read_env("FUNNELSIGHT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(warehouse_url) = overrides.warehouse_url {
            self.warehouse.url = warehouse_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(backend) = overrides.checkpoint_backend {
            self.workflow.checkpoint_backend = backend;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_warehouse(&self.warehouse)?;
        validate_llm(&self.llm)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("funnelsight.toml"), PathBuf::from("config/funnelsight.toml")]
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

fn validate_warehouse(warehouse: &WarehouseConfig) -> Result<(), ConfigError> {
    let url = warehouse.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "warehouse.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if warehouse.max_connections == 0 {
        return Err(ConfigError::Validation(
            "warehouse.max_connections must be greater than zero".to_string(),
        ));
    }

    if warehouse.timeout_secs == 0 || warehouse.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "warehouse.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let table = warehouse.table.trim();
    let identifier = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !identifier {
        return Err(ConfigError::Validation(format!(
            "warehouse.table `{table}` must be a plain identifier such as `funnels_resumido`"
        )));
    }

    if warehouse.max_rows == 0 || warehouse.max_rows > 10_000 {
        return Err(ConfigError::Validation(
            "warehouse.max_rows must be in range 1..=10000".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    for (name, value) in
        [("business_temperature", llm.business_temperature), ("data_temperature", llm.data_temperature)]
    {
        if !(0.0..=2.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "llm.{name} must be in range 0.0..=2.0"
            )));
        }
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set FUNNELSIGHT_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_clarifying_questions > 3 {
        return Err(ConfigError::Validation(
            "workflow.max_clarifying_questions must be at most 3".to_string(),
        ));
    }

    if workflow.max_tool_rounds == 0 || workflow.max_tool_rounds > 10 {
        return Err(ConfigError::Validation(
            "workflow.max_tool_rounds must be in range 1..=10".to_string(),
        ));
    }

    if workflow.fallback_window_days == 0 || workflow.fallback_window_days > 366 {
        return Err(ConfigError::Validation(
            "workflow.fallback_window_days must be in range 1..=366".to_string(),
        ));
    }

    if workflow.interpretation_truncate_chars == 0 || workflow.synthesis_truncate_chars == 0 {
        return Err(ConfigError::Validation(
            "workflow truncation limits must be greater than zero".to_string(),
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    warehouse: Option<WarehousePatch>,
    llm: Option<LlmPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WarehousePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    table: Option<String>,
    max_rows: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    business_temperature: Option<f32>,
    data_temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    interpretation_history_window: Option<usize>,
    interpretation_truncate_chars: Option<usize>,
    synthesis_history_window: Option<usize>,
    synthesis_truncate_chars: Option<usize>,
    verbosity_history_window: Option<usize>,
    max_clarifying_questions: Option<usize>,
    max_tool_rounds: Option<usize>,
    fallback_window_days: Option<u32>,
    checkpoint_backend: Option<CheckpointBackend>,
    checkpoint_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
