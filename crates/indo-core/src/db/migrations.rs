//! Schema versioning for the queue database

use crate::error::Result;
use libsql::Connection;

const CURRENT_VERSION: i32 = 1;

pub async fn run(conn: &Connection) -> Result<()> {
    if get_version(conn).await? < 1 {
        migrate_v1(conn).await?;
    }
    Ok(())
}

async fn get_version(conn: &Connection) -> Result<i32> {
    let has_table = scalar(
        conn,
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
    )
    .await?;
    if has_table == 0 {
        return Ok(0);
    }
    scalar(conn, "SELECT COALESCE(MAX(version), 0) FROM schema_version").await
}

async fn scalar(conn: &Connection, sql: &str) -> Result<i32> {
    let mut rows = conn.query(sql, ()).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i32>(0)?),
        None => Ok(0),
    }
}

/// Execute a migration's statements inside one transaction
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: mutation queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // seq breaks created_at ties so replay is strictly insertion order
            "CREATE TABLE IF NOT EXISTS mutation_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_table TEXT NOT NULL,
                action TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_mutation_queue_order ON mutation_queue(created_at, seq)",
            "CREATE INDEX IF NOT EXISTS idx_mutation_queue_table ON mutation_queue(entity_table)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated queue database to version {CURRENT_VERSION}");
    Ok(())
}
