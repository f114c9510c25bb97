use stacksignal::cli::{self, CliInvocation};
use stacksignal::infra::{ConfigError, init_logging, resolve_settings};
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cli(#[from] cli::CliRunError),
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    init_logging();

    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Command(command) => {
            let settings = resolve_settings()?;
            cli::run(command, &settings)?;
            Ok(())
        }
    }
}

fn print_help() {
    let text = format!(
        "{name} - browse bug reports and client logs captured by the StackSignal widget\n\nUSAGE:\n  {name} sessions [SOURCE] [--limit N] [--offset N] [--json] [--watch]\n  {name} submissions [SOURCE] [--session ID] [--json]\n  {name} logs [SOURCE] [--session ID] [--submission ID] [--full] [--limit N] [--offset N] [--json]\n  {name} embed [--client-id ID]           Print the widget embed snippet\n  {name} token set TOKEN | token clear    Store or remove the API token\n  {name} --help | --version\n\nSOURCE:\n  Path to a JSON file (array of records or an API response envelope), or - for stdin.\n  Omitted: fetch GET <api>/bug with the stored token.\n\nFLAGS:\n  --limit N        Max rows to print (default: 20)\n  --offset N       Skip first N rows (default: 0)\n  --session ID     Select a session (default: first)\n  --submission ID  Select a submission (default: first of the session)\n  --full           Print timestamp, every argument and the stack trace of each log\n  --json           Output structured JSON\n  --watch          Re-print sessions whenever SOURCE changes (file sources only)\n\nOUTPUT:\n  sessions: session_id<TAB>age<TAB>logs<TAB>submissions<TAB>errors<TAB>bug\n  submissions: submission_id<TAB>created<TAB>logs<TAB>errors<TAB>warnings<TAB>info<TAB>bug\n  logs: time<TAB>type<TAB>preview\n\nENV:\n  STACKSIGNAL_API_URL     Backend origin (default: http://localhost:4000)\n  STACKSIGNAL_TOKEN       API token (default: contents of <state>/token)\n  STACKSIGNAL_STATE_DIR   State directory (default: ~/.stacksignal)\n  STACKSIGNAL_CLIENT_ID   Client id for `embed`\n  STACKSIGNAL_TIMEOUT_MS  Fetch timeout in milliseconds (default: 8000)\n  STACKSIGNAL_LOG         Log filter, e.g. debug (falls back to RUST_LOG, then warn)\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}
