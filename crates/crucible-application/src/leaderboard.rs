use crucible_domain::repositories::artifacts::LeaderboardRow;
use crucible_domain::repositories::work_items::WorkItemStore;

/// Ranking view over scored items: best weighted Sharpe first, walk-forward
/// stability as the tiebreaker. Reads only SCORED items and their weighted
/// metric sets.
pub fn build_leaderboard(
    store: &dyn WorkItemStore,
    limit: usize,
) -> Result<Vec<LeaderboardRow>, String> {
    let scored = store.fetch_scored(limit)?;
    let mut rows: Vec<LeaderboardRow> = scored
        .into_iter()
        .filter_map(|item| {
            let weighted = item.weighted?;
            Some(LeaderboardRow {
                item_id: item.id,
                kind: item.payload.kind,
                timeframe: item.payload.timeframe,
                weighted,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.weighted
            .sharpe
            .total_cmp(&a.weighted.sharpe)
            .then_with(|| b.weighted.stability.total_cmp(&a.weighted.stability))
    });
    Ok(rows)
}
