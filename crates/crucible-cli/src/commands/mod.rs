mod common;
mod leaderboard;
mod run;
mod status;

use crucible_application::config::load_config;
use crucible_application::coordination::ClaimCoordinator;
use crucible_domain::value_objects::work_item::WorkStatus;
use std::path::PathBuf;

pub enum Command {
    Run {
        config: PathBuf,
        cycles: Option<u64>,
    },
    Status {
        config: PathBuf,
        json: bool,
    },
    Leaderboard {
        config: PathBuf,
        out: Option<PathBuf>,
        limit: usize,
    },
    Promote {
        config: PathBuf,
        id: String,
        to: String,
    },
    CheckConfig {
        config: PathBuf,
    },
}

pub fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Run { config, cycles } => run::execute(&config, cycles),
        Command::Status { config, json } => status::execute(&config, json),
        Command::Leaderboard { config, out, limit } => {
            leaderboard::execute(&config, out.as_deref(), limit)
        }
        Command::Promote { config, id, to } => {
            let parsed = load_config(&config)?;
            let next = match to.trim().to_lowercase().as_str() {
                "selected" => WorkStatus::Selected,
                "retired" => WorkStatus::Retired,
                other => return Err(format!("--to must be selected or retired, got {other}")),
            };
            let store = common::build_store(&parsed)?;
            ClaimCoordinator::new(store).promote(&id, next)?;
            println!("{} -> {}", id, next.as_str());
            Ok(())
        }
        Command::CheckConfig { config } => {
            let parsed = load_config(&config)?;
            println!(
                "config OK: run_id={} symbol={} store={}",
                parsed.run.run_id,
                parsed.run.symbol,
                if parsed.store.url.is_some() {
                    "postgres"
                } else {
                    "memory"
                }
            );
            Ok(())
        }
    }
}
