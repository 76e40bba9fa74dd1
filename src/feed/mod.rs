// Price feed sources: synthetic generation and file replay
pub mod synthetic;

pub use synthetic::{MarketScenario, SyntheticFeed};

use crate::error::Result;
use crate::models::PriceTick;
use std::path::Path;

/// Load a JSON array of ticks for replay, sorted by timestamp
pub async fn load_ticks(path: impl AsRef<Path>) -> Result<Vec<PriceTick>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let mut ticks: Vec<PriceTick> = serde_json::from_str(&content)?;

    ticks.sort_by_key(|tick| tick.timestamp);

    tracing::info!(count = ticks.len(), path = %path.display(), "Loaded ticks for replay");

    Ok(ticks)
}
