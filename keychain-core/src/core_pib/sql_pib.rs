//! SQLite public info base
//!
//! Names are stored as URIs. Deleting an identity or key cascades through
//! foreign keys, so every pooled connection enables `foreign_keys`.

use super::migrations;
use super::{Pib, PibError};
use crate::core_cert::{certificate_name_to_public_key_name, IdentityCertificate, PublicKey};
use crate::core_name::Name;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Database file inside the PIB directory
pub const PIB_DB_FILE: &str = "ndnsec-public-info.db";

/// SQLite-backed public info base
pub struct SqlPib {
    pool: Pool<SqliteConnectionManager>,
    location: String,
}

impl SqlPib {
    pub const SCHEME: &'static str = "pib-sqlite3";

    /// Open (creating if needed) the database in directory `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PibError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| PibError::Storage(format!("Cannot create {}: {}", dir.display(), e)))?;

        let manager = SqliteConnectionManager::file(dir.join(PIB_DB_FILE))
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::new(manager)?;
        Self::with_pool(pool, dir.display().to_string())
    }

    /// Open the directory named by a locator location; empty means `~/.ndn`
    pub fn from_location(location: &str) -> Result<Self, PibError> {
        if location.is_empty() {
            Self::open(default_pib_dir()?)
        } else {
            Self::open(location)
        }
    }

    /// Private in-memory database; one connection so every query sees it
    pub fn memory() -> Result<Self, PibError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::with_pool(pool, String::new())
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>, location: String) -> Result<Self, PibError> {
        migrations::migrate(&pool)?;
        Ok(Self { pool, location })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PibError> {
        Ok(self.pool.get()?)
    }
}

fn default_pib_dir() -> Result<PathBuf, PibError> {
    dirs::home_dir()
        .map(|home| home.join(".ndn"))
        .ok_or_else(|| PibError::Storage("Home directory not found".to_string()))
}

fn parse_names(uris: Vec<String>) -> Result<Vec<Name>, PibError> {
    uris.iter()
        .map(|uri| Name::from_uri(uri).map_err(PibError::from))
        .collect()
}

/// Row id of `identity`, inserting it when missing
fn ensure_identity(conn: &Connection, identity: &Name) -> Result<i64, PibError> {
    conn.execute(
        "INSERT OR IGNORE INTO identities (identity) VALUES (?)",
        params![identity.to_uri()],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM identities WHERE identity = ?",
        params![identity.to_uri()],
        |row| row.get(0),
    )?)
}

/// Insert or update a key, returning its row id
fn upsert_key(conn: &Connection, key_name: &Name, public_key: &PublicKey) -> Result<i64, PibError> {
    let identity_id = ensure_identity(conn, &key_name.prefix(-1))?;
    conn.execute(
        "INSERT INTO keys (identity_id, key_name, key_type, public_key) VALUES (?, ?, ?, ?)
         ON CONFLICT(key_name) DO UPDATE SET key_type = excluded.key_type,
                                             public_key = excluded.public_key",
        params![
            identity_id,
            key_name.to_uri(),
            public_key.key_type().code(),
            public_key.as_der(),
        ],
    )?;
    key_id(conn, key_name)?.ok_or_else(|| PibError::NotFound(format!("key {}", key_name)))
}

fn key_id(conn: &Connection, key_name: &Name) -> Result<Option<i64>, PibError> {
    Ok(conn
        .query_row(
            "SELECT id FROM keys WHERE key_name = ?",
            params![key_name.to_uri()],
            |row| row.get(0),
        )
        .optional()?)
}

impl Pib for SqlPib {
    fn locator(&self) -> String {
        format!("{}:{}", Self::SCHEME, self.location)
    }

    fn tpm_locator(&self) -> Result<Option<String>, PibError> {
        Ok(self
            .conn()?
            .query_row("SELECT tpm_locator FROM tpm_info WHERE id = 0", [], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set_tpm_locator(&self, locator: &str) -> Result<(), PibError> {
        self.conn()?.execute(
            "INSERT INTO tpm_info (id, tpm_locator) VALUES (0, ?)
             ON CONFLICT(id) DO UPDATE SET tpm_locator = excluded.tpm_locator",
            params![locator],
        )?;
        Ok(())
    }

    fn does_identity_exist(&self, identity: &Name) -> Result<bool, PibError> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT 1 FROM identities WHERE identity = ?",
                params![identity.to_uri()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn add_identity(&self, identity: &Name) -> Result<(), PibError> {
        ensure_identity(&*self.conn()?, identity)?;
        Ok(())
    }

    fn delete_identity(&self, identity: &Name) -> Result<(), PibError> {
        let removed = self.conn()?.execute(
            "DELETE FROM identities WHERE identity = ?",
            params![identity.to_uri()],
        )?;
        debug!(identity = %identity, removed, "Deleted identity");
        Ok(())
    }

    fn does_key_exist(&self, key_name: &Name) -> Result<bool, PibError> {
        Ok(key_id(&*self.conn()?, key_name)?.is_some())
    }

    fn add_key(&self, key_name: &Name, public_key: &PublicKey) -> Result<(), PibError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        upsert_key(&tx, key_name, public_key)?;
        tx.commit()?;
        Ok(())
    }

    fn public_key(&self, key_name: &Name) -> Result<PublicKey, PibError> {
        let der: Vec<u8> = self
            .conn()?
            .query_row(
                "SELECT public_key FROM keys WHERE key_name = ?",
                params![key_name.to_uri()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("key {}", key_name)))?;
        Ok(PublicKey::from_der(der))
    }

    fn delete_key(&self, key_name: &Name) -> Result<(), PibError> {
        self.conn()?.execute(
            "DELETE FROM keys WHERE key_name = ?",
            params![key_name.to_uri()],
        )?;
        Ok(())
    }

    fn does_certificate_exist(&self, cert_name: &Name) -> Result<bool, PibError> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT 1 FROM certificates WHERE certificate_name = ?",
                params![cert_name.to_uri()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn add_certificate(&self, certificate: &IdentityCertificate) -> Result<(), PibError> {
        let key_name = certificate.public_key_name()?;
        let data = certificate.to_bytes()?;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let key_id = match key_id(&tx, &key_name)? {
            Some(id) => id,
            None => upsert_key(&tx, &key_name, certificate.public_key())?,
        };
        tx.execute(
            "INSERT INTO certificates (key_id, certificate_name, certificate_data) VALUES (?, ?, ?)
             ON CONFLICT(certificate_name) DO UPDATE SET certificate_data = excluded.certificate_data",
            params![key_id, certificate.name().to_uri(), data],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn certificate(&self, cert_name: &Name) -> Result<IdentityCertificate, PibError> {
        let data: Vec<u8> = self
            .conn()?
            .query_row(
                "SELECT certificate_data FROM certificates WHERE certificate_name = ?",
                params![cert_name.to_uri()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("certificate {}", cert_name)))?;
        Ok(IdentityCertificate::from_bytes(&data)?)
    }

    fn delete_certificate(&self, cert_name: &Name) -> Result<(), PibError> {
        self.conn()?.execute(
            "DELETE FROM certificates WHERE certificate_name = ?",
            params![cert_name.to_uri()],
        )?;
        Ok(())
    }

    fn default_identity(&self) -> Result<Name, PibError> {
        let uri: String = self
            .conn()?
            .query_row(
                "SELECT identity FROM identities WHERE is_default = 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound("default identity".to_string()))?;
        Ok(Name::from_uri(&uri)?)
    }

    fn set_default_identity(&self, identity: &Name) -> Result<(), PibError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("UPDATE identities SET is_default = 0 WHERE is_default = 1", [])?;
        let updated = tx.execute(
            "UPDATE identities SET is_default = 1 WHERE identity = ?",
            params![identity.to_uri()],
        )?;
        if updated == 0 {
            return Err(PibError::NotFound(format!("identity {}", identity)));
        }
        tx.commit()?;
        Ok(())
    }

    fn default_key_name_for_identity(&self, identity: &Name) -> Result<Name, PibError> {
        let uri: String = self
            .conn()?
            .query_row(
                "SELECT k.key_name FROM keys k JOIN identities i ON k.identity_id = i.id
                 WHERE i.identity = ? AND k.is_default = 1",
                params![identity.to_uri()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("default key of {}", identity)))?;
        Ok(Name::from_uri(&uri)?)
    }

    fn set_default_key_name_for_identity(&self, key_name: &Name) -> Result<(), PibError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let (id, identity_id): (i64, i64) = tx
            .query_row(
                "SELECT id, identity_id FROM keys WHERE key_name = ?",
                params![key_name.to_uri()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("key {}", key_name)))?;
        tx.execute(
            "UPDATE keys SET is_default = 0 WHERE identity_id = ? AND is_default = 1",
            params![identity_id],
        )?;
        tx.execute("UPDATE keys SET is_default = 1 WHERE id = ?", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn default_certificate_name_for_key(&self, key_name: &Name) -> Result<Name, PibError> {
        let uri: String = self
            .conn()?
            .query_row(
                "SELECT c.certificate_name FROM certificates c JOIN keys k ON c.key_id = k.id
                 WHERE k.key_name = ? AND c.is_default = 1",
                params![key_name.to_uri()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("default certificate of {}", key_name)))?;
        Ok(Name::from_uri(&uri)?)
    }

    fn set_default_certificate_name_for_key(&self, cert_name: &Name) -> Result<(), PibError> {
        certificate_name_to_public_key_name(cert_name)?;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let (id, key_id): (i64, i64) = tx
            .query_row(
                "SELECT id, key_id FROM certificates WHERE certificate_name = ?",
                params![cert_name.to_uri()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| PibError::NotFound(format!("certificate {}", cert_name)))?;
        tx.execute(
            "UPDATE certificates SET is_default = 0 WHERE key_id = ? AND is_default = 1",
            params![key_id],
        )?;
        tx.execute(
            "UPDATE certificates SET is_default = 1 WHERE id = ?",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn identities(&self, is_default: bool) -> Result<Vec<Name>, PibError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT identity FROM identities WHERE is_default = ? ORDER BY identity")?;
        let uris = stmt
            .query_map(params![is_default], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        parse_names(uris)
    }

    fn key_names_of_identity(
        &self,
        identity: &Name,
        is_default: bool,
    ) -> Result<Vec<Name>, PibError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT k.key_name FROM keys k JOIN identities i ON k.identity_id = i.id
             WHERE i.identity = ? AND k.is_default = ? ORDER BY k.key_name",
        )?;
        let uris = stmt
            .query_map(params![identity.to_uri(), is_default], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        parse_names(uris)
    }

    fn certificate_names_of_key(
        &self,
        key_name: &Name,
        is_default: bool,
    ) -> Result<Vec<Name>, PibError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.certificate_name FROM certificates c JOIN keys k ON c.key_id = k.id
             WHERE k.key_name = ? AND c.is_default = ? ORDER BY c.certificate_name",
        )?;
        let uris = stmt
            .query_map(params![key_name.to_uri(), is_default], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        parse_names(uris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_file_location() {
        let temp_dir = TempDir::new().unwrap();
        let pib = SqlPib::open(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join(PIB_DB_FILE).exists());
        assert_eq!(
            pib.locator(),
            format!("pib-sqlite3:{}", temp_dir.path().display())
        );
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let identity = Name::from_uri("/alice").unwrap();
        {
            let pib = SqlPib::open(temp_dir.path()).unwrap();
            pib.set_tpm_locator("tpm-file:/tmp/keys").unwrap();
            pib.add_identity(&identity).unwrap();
            pib.set_default_identity(&identity).unwrap();
        }

        let pib = SqlPib::open(temp_dir.path()).unwrap();
        assert_eq!(pib.tpm_locator().unwrap().as_deref(), Some("tpm-file:/tmp/keys"));
        assert_eq!(pib.default_identity().unwrap(), identity);
    }

    #[test]
    fn test_foreign_keys_enabled_on_every_connection() {
        let temp_dir = TempDir::new().unwrap();
        let pib = SqlPib::open(temp_dir.path()).unwrap();
        let enabled: i64 = pib
            .conn()
            .unwrap()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
