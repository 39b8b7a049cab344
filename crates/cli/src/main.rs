use std::process::ExitCode;

fn main() -> ExitCode {
    funnelsight_cli::run()
}
