//! SQL migration definitions for the tag cache database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: tag_cache, tag_runs",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Relevance labels keyed by prompt hash and model
CREATE TABLE IF NOT EXISTS tag_cache (
    id          TEXT PRIMARY KEY,
    prompt_hash TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    label       TEXT NOT NULL,
    rationale   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(prompt_hash, model_id)
);

-- One row per tagging run over a CSV
CREATE TABLE IF NOT EXISTS tag_runs (
    id          TEXT PRIMARY KEY,
    input_path  TEXT NOT NULL,
    model_id    TEXT,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_tag_runs_started ON tag_runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
