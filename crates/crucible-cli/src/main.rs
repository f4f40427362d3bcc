mod commands;
mod obs;

use clap::{Parser, Subcommand};
use commands::Command;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(about = "Crucible strategy validation pipeline", version, arg_required_else_help = true)]
#[command(
    after_help = "Examples:\n  crucible run --config configs/crucible.toml --cycles 10\n  crucible status --config configs/crucible.toml\n  crucible leaderboard --config configs/crucible.toml --out runs/leaderboard.csv\n  crucible check-config --config configs/crucible.toml\n"
)]
struct Cli {
    /// Log level filter (overridden by CRUCIBLE_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Log format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
    /// Expose Prometheus metrics on host:port.
    #[arg(long, global = true)]
    metrics_addr: Option<String>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Drive ingest and scheduling cycles against the shared pool.
    Run {
        #[arg(long)]
        config: PathBuf,
        /// Stop after this many cycles; default runs until drained or halted.
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Show work item status counts and the current execution mode.
    Status {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rank scored strategies by weighted metrics.
    Leaderboard {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Promote a scored strategy to selected, or retire it.
    Promote {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        id: String,
        /// Target status: selected or retired.
        #[arg(long, default_value = "selected")]
        to: String,
    },
    /// Parse and validate a config file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = obs::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
    if let Err(err) = obs::init_metrics(cli.metrics_addr.as_deref()) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }

    let command = match cli.command {
        CliCommand::Run { config, cycles } => Command::Run { config, cycles },
        CliCommand::Status { config, json } => Command::Status { config, json },
        CliCommand::Leaderboard { config, out, limit } => Command::Leaderboard {
            config,
            out,
            limit,
        },
        CliCommand::Promote { config, id, to } => Command::Promote { config, id, to },
        CliCommand::CheckConfig { config } => Command::CheckConfig { config },
    };

    if let Err(err) = commands::run(command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
