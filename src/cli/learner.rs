//! Learner identity seeding

use learnlens_core::{error::Result, AppConfig, InsightStore, LearnerId};

/// Register or rename a learner
pub async fn add(config: &AppConfig, id: i64, name: &str) -> Result<()> {
    let id = LearnerId::try_from(id)?;
    let storage = super::open_storage(config).await?;
    storage.register_learner(id, name).await?;
    println!(" Learner {} registered as '{}'", id, name);
    Ok(())
}
