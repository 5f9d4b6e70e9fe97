//! `SQLite` schema bootstrap logic.
//!
//! Uses `CREATE TABLE IF NOT EXISTS`, so it is safe to re-run on every start.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the slice table definition to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if the DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS slice (
    key         TEXT PRIMARY KEY NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";
    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
