use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};

use funnelsight_agent::RunResponse;
use funnelsight_core::domain::conversation::ConversationTurn;

use crate::bootstrap::bootstrap_with_config;
use crate::commands::{build_runtime, load_config, CommandFailure, CommandResult};
use crate::logging::init_logging;

#[derive(Debug, Clone, Default)]
pub struct AskArgs {
    pub question: String,
    pub thread: Option<String>,
    pub history: Option<PathBuf>,
    pub json: bool,
    pub as_of: Option<NaiveDate>,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let history = match args.history.as_deref().map(read_history).transpose() {
        Ok(history) => history.unwrap_or_default(),
        Err(message) => return CommandResult::failure("ask", "input_validation", message, 2),
    };

    let runtime = match build_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let thread_id = args.thread.clone().unwrap_or_else(default_thread_id);
    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config, args.as_of)
            .await
            .map_err(|error| (error.error_class(), error.to_string(), error.exit_code()))?;
        let response = app.orchestrator.run(&args.question, &thread_id, &history).await;
        app.pool.close().await;
        Ok::<RunResponse, CommandFailure>(response)
    });

    match result {
        Ok(response) => render_response(&response, args.json),
        Err(failure) => CommandResult::from_failure("ask", failure),
    }
}

/// Answer text for people, the full response for `--json`. Failed runs exit 1.
pub fn render_response(response: &RunResponse, json: bool) -> CommandResult {
    let exit_code = if response.success { 0 } else { 1 };
    if !json {
        return CommandResult { exit_code, output: response.response.clone() };
    }

    match serde_json::to_string_pretty(response) {
        Ok(output) => CommandResult { exit_code, output },
        Err(error) => CommandResult::failure(
            "ask",
            "serialization",
            format!("could not serialize the response: {error}"),
            1,
        ),
    }
}

/// Reads a JSON array of `{ "role": "user" | "assistant", "content": "..." }`.
pub fn read_history(path: &Path) -> Result<Vec<ConversationTurn>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read history file `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("history file `{}` is not valid: {error}", path.display()))
}

pub(crate) fn default_thread_id() -> String {
    format!("cli-{}", Utc::now().format("%Y%m%d%H%M%S"))
}
