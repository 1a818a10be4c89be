//! Test utilities for storage initialization
//!
//! libSQL's `:memory:` mode gives each connection its own database, so test
//! storage lives in a temp file that is removed when the returned
//! [`TempDir`] drops.

use crate::storage::libsql::{ConnectionMode, LibsqlStorage};
use crate::storage::InsightStore;
use crate::types::LearnerId;
use tempfile::TempDir;

/// Create a migrated storage backend in a fresh temp directory
pub async fn create_test_storage() -> (LibsqlStorage, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("learnlens_test.db");

    let storage = LibsqlStorage::new_with_validation(
        ConnectionMode::Local(path.to_string_lossy().to_string()),
        true,
    )
    .await
    .expect("Failed to create test storage");

    (storage, dir)
}

pub fn learner(id: i64) -> LearnerId {
    LearnerId::try_from(id).expect("test learner ids are positive")
}

/// Register a learner identity and return its id
pub async fn seed_learner(storage: &LibsqlStorage, id: i64, name: &str) -> LearnerId {
    let id = learner(id);
    storage
        .register_learner(id, name)
        .await
        .expect("Failed to seed learner");
    id
}
