//! Database migrations for the SQL public info base
//!
//! Each migration is applied in its own transaction and recorded in the
//! `pib_schema_version` table.

use super::PibError;
use crate::core_name::now_millis;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

/// Current schema version
pub const CURRENT_PIB_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
    pub down_sql: Option<&'static str>,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial identity, key and certificate schema",
        up_sql: r#"
            -- TPM paired with this PIB; at most one row
            CREATE TABLE IF NOT EXISTS tpm_info (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                tpm_locator TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL UNIQUE,          -- Name URI
                is_default INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity_id INTEGER NOT NULL,
                key_name TEXT NOT NULL UNIQUE,          -- Name URI
                key_type INTEGER NOT NULL,
                public_key BLOB NOT NULL,               -- SPKI DER
                is_default INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (identity_id) REFERENCES identities(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_keys_identity ON keys(identity_id);

            CREATE TABLE IF NOT EXISTS certificates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key_id INTEGER NOT NULL,
                certificate_name TEXT NOT NULL UNIQUE,  -- Name URI
                certificate_data BLOB NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (key_id) REFERENCES keys(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_certificates_key ON certificates(key_id);
        "#,
        down_sql: Some(
            r#"
            DROP INDEX IF EXISTS idx_certificates_key;
            DROP TABLE IF EXISTS certificates;
            DROP INDEX IF EXISTS idx_keys_identity;
            DROP TABLE IF EXISTS keys;
            DROP TABLE IF EXISTS identities;
            DROP TABLE IF EXISTS tpm_info;
            DROP TABLE IF EXISTS pib_schema_version;
        "#,
        ),
    }]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, PibError> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pib_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM pib_schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), PibError> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;
    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO pib_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now_millis() as i64],
        )?;
        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied PIB migration"
        );
    }

    Ok(())
}

/// Roll back the newest applied migration
pub fn rollback(pool: &Pool<SqliteConnectionManager>) -> Result<(), PibError> {
    let current_version = get_current_version(pool)?;
    let Some(migration) = get_migrations()
        .into_iter()
        .find(|m| m.version == current_version)
    else {
        return Ok(());
    };
    let down_sql = migration.down_sql.ok_or_else(|| {
        PibError::Storage(format!("Migration v{} cannot be rolled back", migration.version))
    })?;

    let conn = pool.get()?;
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(down_sql)?;
    tx.commit()?;
    info!(version = migration.version, "Rolled back PIB migration");
    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        let manager = SqliteConnectionManager::memory();
        Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create pool")
    }

    fn tables(pool: &Pool<SqliteConnectionManager>) -> Vec<String> {
        let conn = pool.get().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        names
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let tables = tables(&pool);
        for table in ["tpm_info", "identities", "keys", "certificates"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();
        migrate(&pool).expect("First migration failed");
        migrate(&pool).expect("Second migration failed");

        assert_eq!(get_current_version(&pool).unwrap(), CURRENT_PIB_SCHEMA_VERSION);
        assert_eq!(get_latest_version(), CURRENT_PIB_SCHEMA_VERSION);
    }

    #[test]
    fn test_rollback_drops_tables() {
        let pool = setup_test_pool();
        migrate(&pool).unwrap();
        rollback(&pool).unwrap();

        assert!(!tables(&pool).contains(&"identities".to_string()));
        assert_eq!(get_current_version(&pool).unwrap(), 0);
    }
}
