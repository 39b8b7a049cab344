pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::commands::ask::AskArgs;

#[derive(Debug, Parser)]
#[command(
    name = "funnelsight",
    about = "Funnelsight operator CLI",
    long_about = "Ask questions about web funnel performance, manage the warehouse and inspect \
                  the runtime configuration.",
    after_help = "Examples:\n  funnelsight ask \"conversion rate Chile last month\"\n  \
                  funnelsight chat --thread weekly-review\n  funnelsight doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer one question and print the response")]
    Ask {
        question: String,
        #[arg(long, help = "Conversation thread id; reuse it to keep follow-up context")]
        thread: Option<String>,
        #[arg(long, help = "JSON array of earlier turns with `role` and `content` fields")]
        history: Option<PathBuf>,
        #[arg(long, help = "Emit the full response with metadata as JSON")]
        json: bool,
        #[arg(long, value_name = "YYYY-MM-DD", help = "Reference date used as today")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Interactive question loop that keeps history in memory")]
    Chat {
        #[arg(long, help = "Conversation thread id")]
        thread: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD", help = "Reference date used as today")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Apply pending warehouse migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo funnel dataset")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, reasoning client setup and warehouse readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the question workflow as a Mermaid flowchart")]
    Graph,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, thread, history, json, as_of } => {
            commands::ask::run(AskArgs { question, thread, history, json, as_of })
        }
        Command::Chat { thread, as_of } => commands::chat::run(thread, as_of),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Graph => commands::CommandResult { exit_code: 0, output: commands::graph::run() },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
