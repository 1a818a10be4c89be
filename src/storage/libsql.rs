//! LibSQL storage backend implementation
//!
//! Persists learners, metrics aggregates, the current insight per learner and
//! the insight history using Turso/libSQL (local SQLite file or remote).
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision,
//! so lexical order equals chronological order.

use crate::config::DatabaseConfig;
use crate::error::{InsightError, Result};
use crate::storage::InsightStore;
use crate::types::{
    FeatureVector, InsightCommit, InsightCurrent, InsightHistoryEntry, LatestInsight, LearnerId,
    MetricsAggregate, MetricsInput,
};
use ::libsql::{params, Builder, Connection, Database, TransactionBehavior};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, info, warn};

/// Embedded migrations, applied in order
const MIGRATIONS: [(&str, &str); 2] = [
    (
        "001_initial_schema.sql",
        include_str!("../../migrations/libsql/001_initial_schema.sql"),
    ),
    (
        "002_add_indexes.sql",
        include_str!("../../migrations/libsql/002_add_indexes.sql"),
    ),
];

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT_MS: u64 = 5000;

const METRICS_COLUMNS: &str = "learner_id, total_active_days, avg_completion_time_hours, \
     total_journeys_completed, total_submissions, rejected_submissions, avg_exam_score, \
     cluster_label, created_at, updated_at";

const HISTORY_COLUMNS: &str =
    "id, learner_id, learning_style, confidence_score, insight_text, created_at";

/// Database connection mode
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Local file-based database
    Local(String),
    /// Remote database (Turso Cloud)
    Remote { url: String, token: String },
}

impl ConnectionMode {
    /// Pick the connection mode for a configured database URL
    ///
    /// - "libsql://..." → Remote (requires `auth_token`)
    /// - Other → Local file path
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if config.url.starts_with("libsql://") {
            let token = config.auth_token.clone().ok_or_else(|| {
                InsightError::Config("database.auth_token is required for libsql:// URLs".into())
            })?;
            Ok(ConnectionMode::Remote {
                url: config.url.clone(),
                token,
            })
        } else if config.url == ":memory:" {
            // libSQL gives every connection its own in-memory database, which
            // would lose the schema between calls.
            Err(InsightError::Config(
                "in-memory databases are not supported; use a file path".into(),
            ))
        } else {
            Ok(ConnectionMode::Local(config.url.clone()))
        }
    }
}

/// LibSQL storage backend
pub struct LibsqlStorage {
    db: Database,
    local: bool,
}

impl LibsqlStorage {
    /// Validate database file before opening
    ///
    /// Returns `Ok(true)` if the file exists and carries a SQLite header,
    /// `Ok(false)` if it is missing and `must_exist` is false.
    fn validate_database_file(db_path: &str, must_exist: bool) -> Result<bool> {
        use std::io::Read;
        use std::path::Path;

        let path = Path::new(db_path);

        if !path.exists() {
            if must_exist {
                return Err(InsightError::Database(format!(
                    "Database file not found at '{}'. Run 'learnlens init' first or check database.url.",
                    db_path
                )));
            }
            return Ok(false);
        }

        let mut header = [0u8; 16];
        let mut file = std::fs::File::open(path).map_err(|e| {
            InsightError::Database(format!("Cannot read database file at '{}': {}", db_path, e))
        })?;

        // A freshly created, still-empty file is fine: SQLite initializes it.
        let read = file.read(&mut header)?;
        if read == 0 {
            return Ok(true);
        }

        if read < 16 || &header != b"SQLite format 3\0" {
            return Err(InsightError::Database(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database.",
                db_path
            )));
        }

        debug!("Database file validation passed: {}", db_path);
        Ok(true)
    }

    /// Create a new LibSQL storage backend with validation
    ///
    /// # Arguments
    /// * `mode` - Connection mode (local or remote)
    /// * `create_if_missing` - If true, create the database file (and its
    ///   parent directory) when it doesn't exist
    pub async fn new_with_validation(mode: ConnectionMode, create_if_missing: bool) -> Result<Self> {
        info!(
            "Connecting to LibSQL database: {} (create_if_missing: {})",
            match &mode {
                ConnectionMode::Local(path) => path.as_str(),
                ConnectionMode::Remote { url, .. } => url.as_str(),
            },
            create_if_missing
        );

        let (db, local) = match mode {
            ConnectionMode::Local(ref path) => {
                let exists = Self::validate_database_file(path, !create_if_missing)?;

                if create_if_missing && !exists {
                    if let Some(parent) = std::path::Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent).map_err(|e| {
                                InsightError::Database(format!(
                                    "Failed to create database directory {}: {}",
                                    parent.display(),
                                    e
                                ))
                            })?;
                        }
                    }
                }

                let db = Builder::new_local(path).build().await.map_err(|e| {
                    InsightError::Database(format!("Failed to create local database: {}", e))
                })?;
                (db, true)
            }
            ConnectionMode::Remote { ref url, ref token } => {
                let db = Builder::new_remote(url.clone(), token.clone())
                    .build()
                    .await
                    .map_err(|e| {
                        InsightError::Database(format!("Failed to create remote database: {}", e))
                    })?;
                (db, false)
            }
        };

        let storage = Self { db, local };

        if storage.local {
            // WAL lets readers see the last committed state while a writer
            // holds the insight transaction open.
            let conn = storage.connect().await?;
            conn.query("PRAGMA journal_mode = WAL", params![]).await?;
        }

        storage.run_migrations().await?;

        info!("LibSQL database connection established");
        Ok(storage)
    }

    /// Open the configured database, creating it if needed
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        Self::new_with_validation(ConnectionMode::from_config(config)?, true).await
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.connect().await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| {
            InsightError::Migration(format!("Failed to create migrations table: {}", e))
        })?;

        for (name, sql) in MIGRATIONS {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![name],
                )
                .await?;

            let already_applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0)? > 0,
                None => false,
            };

            if already_applied {
                debug!("Skipping already applied migration: {}", name);
                continue;
            }

            conn.execute_batch(sql).await.map_err(|e| {
                InsightError::Migration(format!("Failed to execute {}: {}", name, e))
            })?;

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![name, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| InsightError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Executed migration: {}", name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Get a connection with per-connection pragmas applied
    async fn connect(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| InsightError::Database(format!("Failed to get connection: {}", e)))?;

        if self.local {
            conn.execute("PRAGMA foreign_keys = ON", params![]).await?;
            // busy_timeout answers with a row, so it goes through query()
            conn.query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), params![])
                .await?;
        }

        Ok(conn)
    }

    /// Raw connection for fault-injection tests
    #[cfg(test)]
    pub(crate) async fn raw_connection(&self) -> Result<Connection> {
        self.connect().await
    }

    fn format_timestamp(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| InsightError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
    }

    fn learner_from_row(raw: i64) -> Result<LearnerId> {
        LearnerId::try_from(raw)
            .map_err(|_| InsightError::Database(format!("Invalid learner id in row: {}", raw)))
    }

    /// Convert a libsql row (in `METRICS_COLUMNS` order) to an aggregate
    fn row_to_metrics(row: &::libsql::Row) -> Result<MetricsAggregate> {
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(MetricsAggregate {
            learner_id: Self::learner_from_row(row.get(0)?)?,
            features: FeatureVector {
                total_active_days: row.get(1)?,
                avg_completion_time_hours: row.get(2)?,
                total_journeys_completed: row.get(3)?,
                total_submissions: row.get(4)?,
                rejected_submissions: row.get(5)?,
                avg_exam_score: row.get(6)?,
            },
            cluster_label: row.get::<Option<i64>>(7)?,
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }

    /// Convert a libsql row (in `HISTORY_COLUMNS` order) to a history entry
    fn row_to_history(row: &::libsql::Row) -> Result<InsightHistoryEntry> {
        let created_at: String = row.get(5)?;

        Ok(InsightHistoryEntry {
            id: row.get(0)?,
            learner_id: Self::learner_from_row(row.get(1)?)?,
            learning_style: row.get(2)?,
            confidence_score: row.get(3)?,
            insight_text: row.get::<Option<String>>(4)?,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    /// Name of a learner, or `None` if the identity is unknown
    async fn learner_name_in(conn: &Connection, id: LearnerId) -> Result<Option<String>> {
        let mut rows = conn
            .query("SELECT name FROM learners WHERE id = ?", params![id.get()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn require_learner_in(conn: &Connection, id: LearnerId) -> Result<String> {
        Self::learner_name_in(conn, id)
            .await?
            .ok_or_else(|| InsightError::NotFound(format!("learner {} does not exist", id)))
    }

    async fn get_metrics_in(conn: &Connection, id: LearnerId) -> Result<Option<MetricsAggregate>> {
        let sql = format!(
            "SELECT {} FROM learning_metrics WHERE learner_id = ?",
            METRICS_COLUMNS
        );
        let mut rows = conn.query(&sql, params![id.get()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_metrics(&row)?)),
            None => Ok(None),
        }
    }

    /// Upsert every tracked column; a `None` cluster label keeps the stored one
    async fn upsert_metrics_in(
        conn: &Connection,
        id: LearnerId,
        features: &FeatureVector,
        cluster_label: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        features.validate()?;
        let now = Self::format_timestamp(now);

        conn.execute(
            r#"
            INSERT INTO learning_metrics (
                learner_id, total_active_days, avg_completion_time_hours,
                total_journeys_completed, total_submissions, rejected_submissions,
                avg_exam_score, cluster_label, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (learner_id) DO UPDATE SET
                total_active_days = excluded.total_active_days,
                avg_completion_time_hours = excluded.avg_completion_time_hours,
                total_journeys_completed = excluded.total_journeys_completed,
                total_submissions = excluded.total_submissions,
                rejected_submissions = excluded.rejected_submissions,
                avg_exam_score = excluded.avg_exam_score,
                cluster_label = COALESCE(excluded.cluster_label, learning_metrics.cluster_label),
                updated_at = excluded.updated_at
            "#,
            params![
                id.get(),
                features.total_active_days,
                features.avg_completion_time_hours,
                features.total_journeys_completed,
                features.total_submissions,
                features.rejected_submissions,
                features.avg_exam_score,
                cluster_label,
                now.clone(),
                now,
            ],
        )
        .await?;

        Ok(())
    }

    /// The three insight writes; caller owns the transaction
    async fn write_insight_in(
        conn: &Connection,
        commit: &InsightCommit,
    ) -> Result<InsightHistoryEntry> {
        let id = commit.learner_id;
        let stored_name = Self::require_learner_in(conn, id).await?;

        if let Some(name) = commit.learner_name.as_deref() {
            if !name.trim().is_empty() && name != stored_name {
                debug!("Refreshing display name for learner {}", id);
                conn.execute(
                    "UPDATE learners SET name = ? WHERE id = ?",
                    params![name, id.get()],
                )
                .await?;
            }
        }

        Self::upsert_metrics_in(
            conn,
            id,
            &commit.features,
            commit.cluster_label,
            commit.generated_at,
        )
        .await?;

        // History timestamps must strictly increase per learner.
        let mut rows = conn
            .query(
                "SELECT MAX(created_at) FROM insight_history WHERE learner_id = ?",
                params![id.get()],
            )
            .await?;
        let previous = match rows.next().await? {
            Some(row) => row.get::<Option<String>>(0)?,
            None => None,
        };
        let mut created_at = commit.generated_at;
        if let Some(previous) = previous {
            let previous = Self::parse_timestamp(&previous)?;
            if created_at <= previous {
                created_at = previous + Duration::microseconds(1);
            }
        }
        let created_at_str = Self::format_timestamp(created_at);

        let confidence = commit.confidence_score.clamp(0.0, 1.0);

        conn.execute(
            r#"
            INSERT INTO insight_history
                (learner_id, learning_style, confidence_score, insight_text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                id.get(),
                commit.learning_style.clone(),
                confidence,
                commit.insight_text.clone(),
                created_at_str.clone(),
            ],
        )
        .await?;
        let history_id = conn.last_insert_rowid();

        conn.execute(
            r#"
            INSERT INTO insight_current
                (learner_id, learning_style, confidence_score, insight_text, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (learner_id) DO UPDATE SET
                learning_style = excluded.learning_style,
                confidence_score = excluded.confidence_score,
                insight_text = excluded.insight_text,
                updated_at = excluded.updated_at
            "#,
            params![
                id.get(),
                commit.learning_style.clone(),
                confidence,
                commit.insight_text.clone(),
                created_at_str,
            ],
        )
        .await?;

        Ok(InsightHistoryEntry {
            id: history_id,
            learner_id: id,
            learning_style: commit.learning_style.clone(),
            confidence_score: confidence,
            insight_text: commit.insight_text.clone(),
            created_at,
        })
    }

    fn commit_error(e: ::libsql::Error) -> InsightError {
        let error_msg = e.to_string();
        if error_msg.contains("readonly") || error_msg.contains("permission") {
            InsightError::Database(
                "Transaction failed: database is read-only. Ensure file and WAL files have write permissions.".to_string(),
            )
        } else if error_msg.contains("locked") || error_msg.contains("busy") {
            InsightError::Database(
                "Transaction failed: database is locked. Another writer held it too long."
                    .to_string(),
            )
        } else {
            InsightError::Database(format!("Transaction commit failed: {}", error_msg))
        }
    }

    async fn query_history(
        &self,
        sql: &str,
        params: impl ::libsql::params::IntoParams,
    ) -> Result<Vec<InsightHistoryEntry>> {
        let conn = self.connect().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::row_to_history(&row)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl InsightStore for LibsqlStorage {
    async fn ping(&self) -> Result<()> {
        let conn = self.connect().await?;
        conn.query("SELECT 1", params![]).await.map_err(|e| {
            InsightError::Database(format!("Database health check failed: {}", e))
        })?;
        Ok(())
    }

    async fn register_learner(&self, id: LearnerId, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(InsightError::invalid("learner name must not be empty"));
        }

        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO learners (id, name, created_at) VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name
            "#,
            params![id.get(), name, Self::format_timestamp(Utc::now())],
        )
        .await?;

        debug!("Registered learner {}", id);
        Ok(())
    }

    async fn get_metrics(&self, id: LearnerId) -> Result<Option<MetricsAggregate>> {
        debug!("Fetching metrics for learner {}", id);
        let conn = self.connect().await?;
        Self::get_metrics_in(&conn, id).await
    }

    async fn upsert_metrics(
        &self,
        id: LearnerId,
        input: &MetricsInput,
    ) -> Result<MetricsAggregate> {
        debug!("Upserting metrics for learner {}", id);
        let features = input.features();
        features.validate()?;

        let conn = self.connect().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        let result = async {
            Self::require_learner_in(&tx, id).await?;
            Self::upsert_metrics_in(&tx, id, &features, input.cluster_label, Utc::now()).await?;
            Self::get_metrics_in(&tx, id).await?.ok_or_else(|| {
                InsightError::Database(format!("metrics for learner {} vanished after upsert", id))
            })
        }
        .await;

        match result {
            Ok(aggregate) => {
                tx.commit().await.map_err(Self::commit_error)?;
                Ok(aggregate)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback failed for learner {}: {}", id, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn initialize_metrics(&self, id: LearnerId) -> Result<MetricsAggregate> {
        let conn = self.connect().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        let result = async {
            Self::require_learner_in(&tx, id).await?;
            let now = Self::format_timestamp(Utc::now());
            let inserted = tx
                .execute(
                    r#"
                    INSERT INTO learning_metrics (learner_id, created_at, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT (learner_id) DO NOTHING
                    "#,
                    params![id.get(), now.clone(), now],
                )
                .await?;
            if inserted > 0 {
                info!("Initialized empty metrics for learner {}", id);
            }
            Self::get_metrics_in(&tx, id).await?.ok_or_else(|| {
                InsightError::Database(format!("metrics for learner {} missing after init", id))
            })
        }
        .await;

        match result {
            Ok(aggregate) => {
                tx.commit().await.map_err(Self::commit_error)?;
                Ok(aggregate)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback failed for learner {}: {}", id, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn commit_insight(&self, commit: &InsightCommit) -> Result<InsightHistoryEntry> {
        debug!(
            "Committing insight '{}' for learner {}",
            commit.learning_style, commit.learner_id
        );

        let conn = self.connect().await?;
        // IMMEDIATE takes the write lock up front so two generations for the
        // same learner cannot interleave their reads and writes.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(Self::commit_error)?;

        match Self::write_insight_in(&tx, commit).await {
            Ok(entry) => {
                tx.commit().await.map_err(Self::commit_error)?;
                debug!("Insight committed for learner {}", commit.learner_id);
                Ok(entry)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        "Rollback failed for learner {}: {}",
                        commit.learner_id, rollback_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn latest_insight(&self, id: LearnerId) -> Result<Option<LatestInsight>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT c.learner_id, c.learning_style, c.confidence_score, c.insight_text,
                       c.updated_at, l.name, m.cluster_label
                FROM insight_current c
                JOIN learners l ON l.id = c.learner_id
                LEFT JOIN learning_metrics m ON m.learner_id = c.learner_id
                WHERE c.learner_id = ?
                "#,
                params![id.get()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let updated_at: String = row.get(4)?;
        Ok(Some(LatestInsight {
            insight: InsightCurrent {
                learner_id: Self::learner_from_row(row.get(0)?)?,
                learning_style: row.get(1)?,
                confidence_score: row.get(2)?,
                insight_text: row.get::<Option<String>>(3)?,
                updated_at: Self::parse_timestamp(&updated_at)?,
            },
            name: row.get(5)?,
            cluster_label: row.get::<Option<i64>>(6)?,
        }))
    }

    async fn insight_history(
        &self,
        id: LearnerId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<InsightHistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM insight_history WHERE learner_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            HISTORY_COLUMNS
        );
        self.query_history(&sql, params![id.get(), limit as i64, offset as i64])
            .await
    }

    async fn insight_timeline(&self, id: LearnerId) -> Result<Vec<InsightHistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM insight_history WHERE learner_id = ? ORDER BY created_at ASC, id ASC",
            HISTORY_COLUMNS
        );
        self.query_history(&sql, params![id.get()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::{create_test_storage, learner, seed_learner};
    use chrono::TimeZone;

    fn commit_at(id: LearnerId, style: &str, ts: DateTime<Utc>) -> InsightCommit {
        InsightCommit {
            learner_id: id,
            features: FeatureVector {
                total_active_days: 3,
                ..Default::default()
            },
            cluster_label: None,
            learner_name: None,
            learning_style: style.to_string(),
            confidence_score: 0.5,
            insight_text: Some(format!("{} at {}", style, ts)),
            generated_at: ts,
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (storage, _dir) = create_test_storage().await;
        storage.run_migrations().await.unwrap();
        storage.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 1, "Ana").await;

        let input = MetricsInput {
            total_active_days: Some(12),
            avg_completion_time_hours: Some(3.5),
            total_journeys_completed: Some(4),
            total_submissions: Some(10),
            rejected_submissions: Some(2),
            avg_exam_score: Some(77.0),
            cluster_label: Some(2),
        };

        let first = storage.upsert_metrics(id, &input).await.unwrap();
        let second = storage.upsert_metrics(id, &input).await.unwrap();

        assert_eq!(first.features, second.features);
        assert_eq!(first.cluster_label, second.cluster_label);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);

        let stored = storage.get_metrics(id).await.unwrap().unwrap();
        assert_eq!(stored.features, second.features);
    }

    #[tokio::test]
    async fn test_upsert_zero_fills_and_keeps_cluster() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 2, "Budi").await;

        storage
            .upsert_metrics(
                id,
                &MetricsInput {
                    total_active_days: Some(30),
                    avg_exam_score: Some(90.0),
                    cluster_label: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = storage
            .upsert_metrics(
                id,
                &MetricsInput {
                    avg_exam_score: Some(60.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.features.total_active_days, 0);
        assert_eq!(updated.features.avg_exam_score, 60.0);
        assert_eq!(updated.cluster_label, Some(1));
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_and_unknown() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 3, "Citra").await;

        let err = storage
            .upsert_metrics(
                id,
                &MetricsInput {
                    total_submissions: Some(1),
                    rejected_submissions: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::InvalidArgument(_)));

        let err = storage
            .upsert_metrics(learner(999), &MetricsInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::NotFound(_)));
        assert!(storage.get_metrics(learner(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_if_absent() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 4, "Dewi").await;

        let created = storage.initialize_metrics(id).await.unwrap();
        assert_eq!(created.features, FeatureVector::default());

        storage
            .upsert_metrics(
                id,
                &MetricsInput {
                    total_journeys_completed: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let existing = storage.initialize_metrics(id).await.unwrap();
        assert_eq!(existing.features.total_journeys_completed, 9);

        let err = storage.initialize_metrics(learner(404)).await.unwrap_err();
        assert!(matches!(err, InsightError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_ordering_and_paging() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 5, "Eko").await;

        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2024, 3, 3, 8, 0, 0).unwrap();

        for (style, ts) in [("T1", t1), ("T2", t2), ("T3", t3)] {
            storage.commit_insight(&commit_at(id, style, ts)).await.unwrap();
        }

        let page = storage.insight_history(id, 2, 0).await.unwrap();
        let styles: Vec<_> = page.iter().map(|e| e.learning_style.as_str()).collect();
        assert_eq!(styles, vec!["T3", "T2"]);
        assert_eq!(page[0].created_at, t3);

        let rest = storage.insight_history(id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].learning_style, "T1");

        let timeline = storage.insight_timeline(id).await.unwrap();
        assert_eq!(timeline.first().unwrap().learning_style, "T1");
    }

    #[tokio::test]
    async fn test_history_timestamps_strictly_increase() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 6, "Fajar").await;
        let ts = Utc.with_ymd_and_hms(2024, 5, 5, 10, 0, 0).unwrap();

        let a = storage.commit_insight(&commit_at(id, "A", ts)).await.unwrap();
        let b = storage.commit_insight(&commit_at(id, "B", ts)).await.unwrap();
        assert!(b.created_at > a.created_at);

        let latest = storage.latest_insight(id).await.unwrap().unwrap();
        assert_eq!(latest.insight.learning_style, "B");
        assert_eq!(latest.insight.updated_at, b.created_at);
    }

    #[tokio::test]
    async fn test_latest_insight_joins_name_and_cluster() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 7, "Gita").await;
        assert!(storage.latest_insight(id).await.unwrap().is_none());

        let mut commit = commit_at(id, "Consistent Learner", Utc::now());
        commit.cluster_label = Some(3);
        commit.learner_name = Some("Gita Pratiwi".into());
        storage.commit_insight(&commit).await.unwrap();

        let latest = storage.latest_insight(id).await.unwrap().unwrap();
        assert_eq!(latest.name, "Gita Pratiwi");
        assert_eq!(latest.cluster_label, Some(3));
        assert_eq!(latest.insight.learning_style, "Consistent Learner");
    }

    #[tokio::test]
    async fn test_commit_for_unknown_learner_writes_nothing() {
        let (storage, _dir) = create_test_storage().await;
        let ghost = learner(77);

        let err = storage
            .commit_insight(&commit_at(ghost, "X", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::NotFound(_)));
        assert!(storage.get_metrics(ghost).await.unwrap().is_none());
        assert!(storage.insight_history(ghost, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_history_insert_rolls_back_everything() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 8, "Hadi").await;

        let conn = storage.raw_connection().await.unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_history BEFORE INSERT ON insight_history \
             BEGIN SELECT RAISE(ABORT, 'injected history failure'); END;",
        )
        .await
        .unwrap();

        let err = storage
            .commit_insight(&commit_at(id, "Doomed", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Database(_)));

        assert!(storage.get_metrics(id).await.unwrap().is_none());
        assert!(storage.latest_insight(id).await.unwrap().is_none());
        assert!(storage.insight_history(id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_current_upsert_rolls_back_everything() {
        let (storage, _dir) = create_test_storage().await;
        let id = seed_learner(&storage, 9, "Indah").await;

        storage
            .commit_insight(&commit_at(id, "Before", Utc::now()))
            .await
            .unwrap();

        let conn = storage.raw_connection().await.unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_current BEFORE UPDATE ON insight_current \
             BEGIN SELECT RAISE(ABORT, 'injected current failure'); END;",
        )
        .await
        .unwrap();

        let mut commit = commit_at(id, "After", Utc::now());
        commit.features.total_active_days = 99;
        assert!(storage.commit_insight(&commit).await.is_err());

        let history = storage.insight_history(id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].learning_style, "Before");
        let metrics = storage.get_metrics(id).await.unwrap().unwrap();
        assert_eq!(metrics.features.total_active_days, 3);
    }

    #[test]
    fn test_connection_mode_from_config() {
        let local = ConnectionMode::from_config(&DatabaseConfig {
            url: "/tmp/x.db".into(),
            auth_token: None,
        })
        .unwrap();
        assert!(matches!(local, ConnectionMode::Local(_)));

        let remote_without_token = ConnectionMode::from_config(&DatabaseConfig {
            url: "libsql://example.turso.io".into(),
            auth_token: None,
        });
        assert!(remote_without_token.is_err());

        let memory = ConnectionMode::from_config(&DatabaseConfig {
            url: ":memory:".into(),
            auth_token: None,
        });
        assert!(memory.is_err());
    }

    #[test]
    fn test_validate_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"definitely not sqlite, just text").unwrap();

        let err = LibsqlStorage::validate_database_file(path.to_str().unwrap(), false).unwrap_err();
        assert!(err.to_string().contains("not a valid SQLite database"));
    }
}
