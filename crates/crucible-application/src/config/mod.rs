use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// All numeric thresholds live here. The source documents this system grew
/// out of disagree on the exact figures, so nothing below is authoritative
/// beyond being a default.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    pub symbol: String,
    pub out_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Postgres URL; omitted means the in-process store (single-node runs).
    pub url: Option<String>,
    pub work_items_table: String,
    pub bars_table: String,
    pub pool_max_size: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub retries: u32,
    pub batch_limit: usize,
}

/// Execution collaborator reporting endpoint; omitted means nothing is live
/// and the risk gate sees a zero snapshot.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5000,
            retries: 2,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Bars CSV used when `store.url` is not set.
    pub csv_path: Option<String>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    /// Chronological tail reserved for holdout scoring.
    pub holdout_pct: f64,
    pub min_bars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ValidationConfig {
    pub shuffle_iterations: u32,
    pub significance: f64,
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            shuffle_iterations: 100,
            significance: 0.05,
            seed: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct StabilityConfig {
    pub windows: usize,
    pub train_pct: f64,
    pub max_param_cv: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            windows: 4,
            train_pct: 0.75,
            max_param_cv: 0.5,
        }
    }
}

/// A limit of zero means the stage is not rate limited.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct QuotaConfig {
    pub validate_daily_limit: u32,
    pub score_daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            validate_daily_limit: 200,
            score_daily_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub sequential_max: usize,
    pub concurrent_io_max: usize,
    pub multi_process_max: usize,
    pub workers_sequential: usize,
    pub workers_concurrent_io: usize,
    pub workers_multi_process: usize,
    pub workers_hybrid: usize,
    pub lease_secs: i64,
    pub cycle_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sequential_max: 50,
            concurrent_io_max: 100,
            multi_process_max: 500,
            workers_sequential: 1,
            workers_concurrent_io: 4,
            workers_multi_process: 8,
            workers_hybrid: 12,
            lease_secs: 300,
            cycle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RiskConfig {
    pub pause_drawdown_pct: f64,
    pub halt_drawdown_pct: f64,
    pub pause_consecutive_losses: u32,
    pub halt_consecutive_losses: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            pause_drawdown_pct: 0.15,
            halt_drawdown_pct: 0.30,
            pause_consecutive_losses: 5,
            halt_consecutive_losses: 10,
        }
    }
}

impl RiskConfig {
    pub fn thresholds(&self) -> crucible_domain::services::risk::RiskThresholds {
        crucible_domain::services::risk::RiskThresholds {
            pause_drawdown_pct: self.pause_drawdown_pct,
            halt_drawdown_pct: self.halt_drawdown_pct,
            pause_consecutive_losses: self.pause_consecutive_losses,
            halt_consecutive_losses: self.halt_consecutive_losses,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    config.validate()?;
    Ok((config, contents))
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.data.holdout_pct > 0.0 && self.data.holdout_pct < 1.0) {
            return Err("data.holdout_pct must be in (0, 1)".to_string());
        }
        if self.data.min_bars < self.stability.windows * 2 {
            return Err("data.min_bars must cover at least 2 bars per walk-forward window".to_string());
        }
        if self.validation.shuffle_iterations == 0 {
            return Err("validation.shuffle_iterations must be >= 1".to_string());
        }
        if !(self.validation.significance > 0.0 && self.validation.significance < 1.0) {
            return Err("validation.significance must be in (0, 1)".to_string());
        }
        if self.scheduler.lease_secs <= 0 {
            return Err("scheduler.lease_secs must be positive".to_string());
        }
        let s = &self.scheduler;
        if !(s.sequential_max < s.concurrent_io_max && s.concurrent_io_max < s.multi_process_max) {
            return Err(
                "scheduler mode thresholds must be strictly increasing".to_string(),
            );
        }
        if s.workers_sequential == 0
            || s.workers_concurrent_io == 0
            || s.workers_multi_process == 0
            || s.workers_hybrid == 0
        {
            return Err("scheduler worker counts must be >= 1".to_string());
        }
        Ok(())
    }
}
