use crucible_application::config::Config;
use crucible_domain::repositories::execution::ExecutionReporter;
use crucible_domain::repositories::generation::GenerationClient;
use crucible_domain::repositories::market_data::BarRepository;
use crucible_domain::repositories::work_items::WorkItemStore;
use crucible_infrastructure::artifacts::FilesystemArtifacts;
use crucible_infrastructure::execution::{HttpExecutionReporter, NullExecutionReporter};
use crucible_infrastructure::generation::HttpGenerationClient;
use crucible_infrastructure::optimizer::GridSearchOptimizer;
use crucible_infrastructure::persistence::csv_bars::CsvBarRepository;
use crucible_infrastructure::persistence::memory::MemoryWorkItemStore;
use crucible_infrastructure::persistence::postgres_bars::PostgresBarRepository;
use crucible_infrastructure::persistence::postgres_work_items::PostgresWorkItemStore;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_POOL_MAX_SIZE: u32 = 4;

pub struct Wiring {
    pub store: Arc<dyn WorkItemStore>,
    pub bars: Box<dyn BarRepository>,
    pub generation: Box<dyn GenerationClient>,
    pub execution: Box<dyn ExecutionReporter>,
    pub optimizer: GridSearchOptimizer,
    pub artifacts: FilesystemArtifacts,
}

pub fn build_store(config: &Config) -> Result<Arc<dyn WorkItemStore>, String> {
    match &config.store.url {
        Some(url) => {
            let store = PostgresWorkItemStore::new(
                url,
                config.store.work_items_table.clone(),
                config.store.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE),
            )?;
            store.ensure_schema()?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("store.url not set; using in-process store (state is not durable)");
            Ok(Arc::new(MemoryWorkItemStore::new()))
        }
    }
}

pub fn build_wiring(config: &Config) -> Result<Wiring, String> {
    let store = build_store(config)?;

    let bars: Box<dyn BarRepository> = match (&config.store.url, &config.data.csv_path) {
        (Some(url), _) => Box::new(PostgresBarRepository::new(
            url,
            config.store.bars_table.clone(),
            config.store.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE),
        )?),
        (None, Some(path)) => Box::new(CsvBarRepository::new(PathBuf::from(path))),
        (None, None) => {
            return Err(
                "no bar source: set store.url (postgres) or data.csv_path (csv)".to_string(),
            )
        }
    };

    let generation = Box::new(HttpGenerationClient::new(
        config.generation.url.clone(),
        config.generation.timeout_ms,
        config.generation.retries,
    )?);

    let execution: Box<dyn ExecutionReporter> = match &config.execution.url {
        Some(url) => Box::new(HttpExecutionReporter::new(
            url.clone(),
            config.execution.timeout_ms,
            config.execution.retries,
        )?),
        None => Box::new(NullExecutionReporter),
    };

    Ok(Wiring {
        store,
        bars,
        generation,
        execution,
        optimizer: GridSearchOptimizer::default(),
        artifacts: FilesystemArtifacts::new(),
    })
}
