//! Version-tracked schema migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::StoreError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS analysis_records (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            branch_id TEXT NOT NULL,
            response_text TEXT NOT NULL,
            analysis TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_analysis_user_branch
            ON analysis_records(user_id, branch_id, created_at);

        CREATE TABLE IF NOT EXISTS conversation_states (
            user_id TEXT NOT NULL,
            branch_id TEXT NOT NULL,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, branch_id)
        );

        CREATE TABLE IF NOT EXISTS smart_prompts (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            prompt_type TEXT NOT NULL,
            suggested_responses TEXT NOT NULL,
            ai_provider TEXT NOT NULL,
            ai_model TEXT NOT NULL,
            ai_confidence REAL NOT NULL,
            ai_template TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
        );
        CREATE INDEX IF NOT EXISTS idx_prompts_user_branch
            ON smart_prompts(user_id, branch_id, status);
        CREATE INDEX IF NOT EXISTS idx_prompts_branch_type
            ON smart_prompts(branch_id, prompt_type, created_at);
        CREATE INDEX IF NOT EXISTS idx_prompts_expiry
            ON smart_prompts(expires_at);

        CREATE TABLE IF NOT EXISTS content_records (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            content TEXT NOT NULL,
            media_urls TEXT NOT NULL DEFAULT '[]',
            milestone_type TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_content_branch
            ON content_records(branch_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_content_author
            ON content_records(branch_id, author_id, created_at);

        CREATE TABLE IF NOT EXISTS branches (
            id TEXT PRIMARY KEY,
            tree_id TEXT NOT NULL,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS branch_members (
            branch_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (branch_id, user_id)
        );
    "#,
}];

/// Apply all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("create _migrations: {e}")))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| StoreError::Migration(format!("{}: {e}", migration.name)))?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| StoreError::Migration(format!("record {}: {e}", migration.name)))?;
        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("read version: {e}")))?;
    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| StoreError::Migration(format!("parse version: {e}"))),
        _ => Ok(0),
    }
}
