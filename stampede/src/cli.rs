use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Stage-driven HTTP load generator",
    long_about = "stampede ramps a population of virtual users through configured stages, \
hammers one HTTP endpoint, and judges the collected metrics against thresholds.\n\n\
A scenario YAML file declares the target, the ramp stages, and the thresholds; \
CLI flags override individual values.",
    after_help = "Examples:\n  stampede run scenarios/smoke.yaml\n  stampede run scenarios/load.yaml --base-url http://10.0.0.5:8000\n  stampede run scenarios/quick.yaml --max-vus 50"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load scenario against a target
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario file (.yaml)
    pub scenario: PathBuf,

    /// Override the scenario's base URL
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Override the initial VU count
    #[arg(long)]
    pub start_vus: Option<u64>,

    /// Cap the VU population regardless of stage targets
    #[arg(long)]
    pub max_vus: Option<u64>,

    /// Override the pause between VU iterations (e.g. 1s, 250ms)
    #[arg(long, value_parser = parse_duration)]
    pub think_time: Option<Duration>,

    /// Override the per-request timeout (e.g. 120s)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Refuse to start when the health probe fails
    #[arg(long)]
    pub strict_health: bool,
}
