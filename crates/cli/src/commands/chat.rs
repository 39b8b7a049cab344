use std::io::{self, BufRead, Write};

use chrono::NaiveDate;
use tracing::info;

use funnelsight_agent::{AnalysisOrchestrator, Transcript};

use crate::bootstrap::bootstrap_with_config;
use crate::commands::ask::default_thread_id;
use crate::commands::{build_runtime, load_config, CommandFailure, CommandResult};
use crate::logging::init_logging;

const EXIT_WORDS: &[&str] = &["exit", "quit", ":q"];
const RESET_COMMAND: &str = "/reset";

pub fn run(thread: Option<String>, as_of: Option<NaiveDate>) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let runtime = match build_runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let thread_id = thread.unwrap_or_else(default_thread_id);
    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config, as_of)
            .await
            .map_err(|error| (error.error_class(), error.to_string(), error.exit_code()))?;
        let stdin = io::stdin();
        let answered = session(&app.orchestrator, &thread_id, stdin.lock(), io::stdout())
            .await
            .map_err(|error| ("terminal_io", error.to_string(), 1u8))?;
        app.pool.close().await;
        Ok::<usize, CommandFailure>(answered)
    });

    match result {
        Ok(answered) => CommandResult::success(
            "chat",
            format!("chat on thread `{thread_id}` ended after {answered} question(s)"),
        ),
        Err(failure) => CommandResult::from_failure("chat", failure),
    }
}

/// Reads questions line by line until EOF or an exit word and prints each
/// answer. The in-memory transcript is passed as history on every run.
/// Returns the number of questions sent to the orchestrator.
pub async fn session<R, W>(
    orchestrator: &AnalysisOrchestrator,
    thread_id: &str,
    input: R,
    mut output: W,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut transcript = Transcript::default();
    let mut asked = 0;
    writeln!(output, "Ask about traffic, conversion or funnel steps. Type `exit` to leave.")?;

    let mut lines = input.lines();
    loop {
        write!(output, "> ")?;
        output.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_ascii_lowercase().as_str()) {
            break;
        }
        if question == RESET_COMMAND {
            transcript.clear();
            writeln!(output, "History cleared.")?;
            continue;
        }

        let response = orchestrator.run(question, thread_id, transcript.turns()).await;
        asked += 1;
        writeln!(output, "{}\n", response.response)?;
        if response.success {
            transcript.record_exchange(question, response.response);
        }
        info!(
            event_name = "cli.chat.turn",
            thread_id = %thread_id,
            turns = transcript.len(),
            "chat turn completed"
        );
    }
    writeln!(output)?;
    Ok(asked)
}
