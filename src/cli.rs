//! CLI argument parsing for smokers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;

use smokers::coordination::SmokingPolicy;

/// Generate the after-help text listing where configuration is read from.
fn generate_after_help() -> String {
    let mut lines = Vec::new();

    lines.push("\x1b[1mConfig lookup:\x1b[0m".to_string());
    let primary = dirs::config_dir()
        .map(|dir| dir.join("smokers").join("smokers.yml"))
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<config dir>/smokers/smokers.yml".to_string());
    lines.push(format!("  1. --config <PATH>\n  2. {}\n  3. ./smokers.yml", primary));

    lines.push(String::new());
    lines.push("Set RUST_LOG=debug (or pass --verbose) to log every table transition.".to_string());

    lines.join("\n")
}

static AFTER_HELP: LazyLock<String> = LazyLock::new(generate_after_help);

#[derive(Parser)]
#[command(
    name = "smokers",
    about = "One agent, three smokers, one table",
    version,
    after_help = AFTER_HELP.as_str()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seat the agent and the smokers and run until Ctrl-C
    Run {
        /// Stop after this many placements
        #[arg(short, long)]
        rounds: Option<u64>,

        /// Seed the agent's choice of ingredients
        #[arg(short, long)]
        seed: Option<u64>,

        /// Smoking policy (exclusive, concurrent)
        #[arg(short, long)]
        policy: Option<SmokingPolicy>,

        /// Print events as JSON lines instead of narration
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}
