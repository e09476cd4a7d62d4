use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Bare integers are seconds; anything else goes through humantime (`250ms`, `1m 30s`).
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr, text summary on stdout.
    HumanReadable,
    /// NDJSON on stdout: progress lines, then one line per metric, threshold and check,
    /// then a `summary` line.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "swarmr",
    author,
    version,
    about = "Declarative HTTP load testing",
    long_about = "swarmr drives concurrent virtual users through an HTTP request described by a YAML plan, records k6-style metrics, applies checks and evaluates thresholds.\n\n`${NAME}` in the plan resolves from the process environment (and `--env KEY=VALUE`), `{{field}}` from the selected dataset record, `{{__vu}}` and `{{__iter}}` from the running iteration.",
    after_help = "Examples:\n  swarmr run plans/notifications.yaml\n  swarmr run plans/notifications.yaml --vus 10 --iterations 15\n  swarmr run plans/archive.yaml --duration 30s --env BASE_URL=https://example.com\n  swarmr run plans/archive.yaml --output json\n\nExit codes: 0 thresholds passed, 1 thresholds failed, 2 fatal error."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test plan
    #[command(
        long_about = "Load a plan, run it with the configured number of virtual users and print a summary.\n\nCLI flags override values from the plan file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the plan (.yaml)
    pub plan: PathBuf,

    /// Iterations per VU (overrides the plan)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Number of virtual users (overrides the plan, default 1)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Add/override env vars visible to `${NAME}` (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Fail on the first malformed dataset line instead of skipping it
    #[arg(long)]
    pub strict_data: bool,
}
