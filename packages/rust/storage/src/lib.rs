//! libSQL storage for the relevance tag cache and tagging run log.
//!
//! The [`Storage`] struct wraps a local libSQL database. Tagging writes
//! through [`Storage::open`]; inspection commands use
//! [`Storage::open_readonly`], which rejects every write.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use jbook_shared::{JbookError, Relevance, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A cached relevance result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTag {
    pub relevance: Relevance,
    pub rationale: String,
}

/// A recorded tagging run.
#[derive(Debug, Clone, Serialize)]
pub struct TagRun {
    pub id: String,
    pub input_path: String,
    pub model_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: Option<serde_json::Value>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JbookError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(JbookError::Storage(format!(
                "cache database not found: {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;
        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    JbookError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JbookError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tag cache
    // -----------------------------------------------------------------------

    /// Look up a cached tag by prompt hash and model.
    pub async fn get_cached_tag(&self, prompt_hash: &str, model_id: &str) -> Result<Option<CachedTag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT label, rationale FROM tag_cache WHERE prompt_hash = ?1 AND model_id = ?2",
                params![prompt_hash, model_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let label: String = row.get(0).map_err(db_err)?;
                let rationale: String = row.get(1).map_err(db_err)?;
                Ok(Some(CachedTag {
                    relevance: label.parse()?,
                    rationale,
                }))
            }
            None => Ok(None),
        }
    }

    /// Store a tag, replacing any previous entry for the same key.
    pub async fn set_cached_tag(
        &self,
        prompt_hash: &str,
        model_id: &str,
        tag: &CachedTag,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO tag_cache (id, prompt_hash, model_id, label, rationale, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(prompt_hash, model_id) DO UPDATE SET
                   label = excluded.label,
                   rationale = excluded.rationale,
                   created_at = excluded.created_at",
                params![
                    id.as_str(),
                    prompt_hash,
                    model_id,
                    tag.relevance.as_str(),
                    tag.rationale.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete cached tags, for one model or all. Returns the number removed.
    pub async fn invalidate_tag_cache(&self, model_id: Option<&str>) -> Result<u64> {
        self.check_writable()?;
        let removed = match model_id {
            Some(model) => self
                .conn
                .execute("DELETE FROM tag_cache WHERE model_id = ?1", params![model])
                .await,
            None => self.conn.execute("DELETE FROM tag_cache", params![]).await,
        }
        .map_err(db_err)?;
        Ok(removed)
    }

    /// Number of cached tags.
    pub async fn cached_tag_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM tag_cache", params![])
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map(|n| n.max(0) as u64).map_err(db_err),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Tagging runs
    // -----------------------------------------------------------------------

    /// Record the start of a tagging run. Returns the generated run ID.
    pub async fn insert_tag_run(&self, input_path: &str, model_id: Option<&str>) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO tag_runs (id, input_path, model_id, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), input_path, model_id, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Mark a run finished and attach its statistics.
    pub async fn finish_tag_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE tag_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_tag_runs(&self, limit: u32) -> Result<Vec<TagRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, input_path, model_id, started_at, finished_at, stats_json
                 FROM tag_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            runs.push(row_to_tag_run(&row)?);
        }
        Ok(runs)
    }
}

fn row_to_tag_run(row: &libsql::Row) -> Result<TagRun> {
    let started: String = row.get(3).map_err(db_err)?;
    Ok(TagRun {
        id: row.get::<String>(0).map_err(db_err)?,
        input_path: row.get::<String>(1).map_err(db_err)?,
        model_id: row.get::<String>(2).ok(),
        started_at: parse_timestamp(&started)?,
        finished_at: row
            .get::<String>(4)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        stats: row
            .get::<String>(5)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JbookError::Storage(format!("invalid date: {e}")))
}

fn db_err(e: libsql::Error) -> JbookError {
    JbookError::Storage(e.to_string())
}
