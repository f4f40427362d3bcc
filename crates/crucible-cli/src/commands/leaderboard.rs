use super::common;
use crucible_application::config::load_config;
use crucible_application::leaderboard::build_leaderboard;
use crucible_domain::repositories::artifacts::ArtifactWriter;
use crucible_infrastructure::artifacts::FilesystemArtifacts;
use std::path::Path;

pub fn execute(config_path: &Path, out: Option<&Path>, limit: usize) -> Result<(), String> {
    let config = load_config(config_path)?;
    let store = common::build_store(&config)?;

    let rows = build_leaderboard(store.as_ref(), limit)?;
    if rows.is_empty() {
        println!("no scored strategies yet");
        return Ok(());
    }

    println!(
        "{:<4} {:<34} {:<12} {:<8} {:>8} {:>12} {:>9} {:>7} {:>10}",
        "rank", "item_id", "kind", "tf", "sharpe", "expectancy", "win_rate", "trades", "stability"
    );
    for (rank, row) in rows.iter().enumerate() {
        println!(
            "{:<4} {:<34} {:<12} {:<8} {:>8.3} {:>12.4} {:>9.3} {:>7} {:>10.3}",
            rank + 1,
            row.item_id,
            row.kind,
            row.timeframe,
            row.weighted.sharpe,
            row.weighted.expectancy,
            row.weighted.win_rate,
            row.weighted.trade_count,
            row.weighted.stability
        );
    }

    if let Some(path) = out {
        FilesystemArtifacts::new().write_leaderboard_csv(path, &rows)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
