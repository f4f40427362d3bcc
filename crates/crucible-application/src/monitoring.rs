use crucible_domain::entities::metric_set::MetricSet;
use crucible_domain::repositories::execution::ExecutionReporter;
use crucible_domain::repositories::work_items::WorkItemStore;
use crucible_domain::services::metrics;
use crucible_domain::value_objects::timeframe::Timeframe;

#[derive(Debug, Clone)]
pub struct LiveMetrics {
    pub item_id: String,
    pub live: MetricSet,
}

/// Live-monitoring view: realized outcomes from the execution collaborator
/// scored with the same metrics engine as offline scoring. There is one
/// expectancy formula in this system; live and offline figures differing on
/// identical inputs would be a correctness bug.
pub fn live_metric_sets(
    execution: &dyn ExecutionReporter,
    store: &dyn WorkItemStore,
    limit: usize,
) -> Result<Vec<LiveMetrics>, String> {
    let scored = store.fetch_scored(limit)?;
    let mut out = Vec::with_capacity(scored.len());
    for item in scored {
        let timeframe = Timeframe::parse(&item.payload.timeframe)?;
        let outcomes = execution.live_outcomes(&item.id)?;
        out.push(LiveMetrics {
            live: metrics::metric_set(
                &outcomes,
                timeframe.bars_per_day(),
                item.stability.unwrap_or(0.0),
            ),
            item_id: item.id,
        });
    }
    Ok(out)
}
