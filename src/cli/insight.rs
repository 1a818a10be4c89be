//! Insight commands: generate, preview, history

use super::{build_state, open_storage, print_json};
use learnlens_core::{error::Result, AppConfig, InsightQuery, LearnerId};

/// Generate and persist an insight, printing the result
pub async fn generate(config: &AppConfig, raw_id: &str) -> Result<()> {
    let state = build_state(config).await?;
    let result = state.insights().generate_insight(raw_id).await?;
    print_json(&result)
}

/// Preview without persisting
pub async fn preview(config: &AppConfig, raw_id: &str) -> Result<()> {
    let id = LearnerId::parse(raw_id)?;
    let query = InsightQuery::new(open_storage(config).await?, config.history.clone());
    print_json(&query.preview_insight(id).await?)
}

/// Print a page of history
pub async fn history(
    config: &AppConfig,
    raw_id: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<()> {
    let id = LearnerId::parse(raw_id)?;
    let query = InsightQuery::new(open_storage(config).await?, config.history.clone());
    print_json(&query.get_history(id, limit, offset).await?)
}
