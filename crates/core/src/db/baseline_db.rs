use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::db::{BaselineRecord, BaselineStore, StalenessChecksum, StoreError};
use crate::hash::ContentHash;
use crate::model::{CanonicalForm, FormatFamily};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for baseline database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed baseline store.
///
/// One connection behind a mutex; SQLite serializes writers anyway and the
/// engine's writes are rare (explicit accepts and first sightings).
#[derive(Debug)]
pub struct SqliteBaselineStore {
    conn: Mutex<Connection>,
}

impl SqliteBaselineStore {
    /// Open (or create) a baseline database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Schema version currently recorded in the database.
    pub fn schema_version(&self) -> Result<i32, StoreError> {
        let conn = self.lock()?;
        Ok(current_schema_version(&conn)?)
    }

    /// Number of stored baselines.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM baselines", [], |row| row.get(0)).map_err(DbError::from)?;
        Ok(count as usize)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned("sqlite connection"))
    }
}

impl BaselineStore for SqliteBaselineStore {
    fn get(&self, artifact_id: &str) -> Result<Option<BaselineRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT canonical_hash, staleness_checksum, accepted_at
                FROM baselines
                WHERE artifact_id = ?1
                "#,
                params![artifact_id],
                |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                },
            )
            .optional()
            .map_err(DbError::from)?;

        let Some((hash, checksum, accepted_at)) = row else {
            return Ok(None);
        };
        let corrupt = |reason: String| StoreError::Corrupt { artifact_id: artifact_id.to_string(), reason };
        let canonical_hash = ContentHash::parse(&hash).map_err(|e| corrupt(e.to_string()))?;
        let staleness_checksum = checksum.parse::<StalenessChecksum>().map_err(corrupt)?;
        Ok(Some(BaselineRecord {
            artifact_id: artifact_id.to_string(),
            canonical_hash,
            staleness_checksum,
            accepted_at,
        }))
    }

    fn put(&self, artifact_id: &str, record: BaselineRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO baselines (artifact_id, canonical_hash, staleness_checksum, accepted_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(artifact_id) DO UPDATE SET
                canonical_hash = excluded.canonical_hash,
                staleness_checksum = excluded.staleness_checksum,
                accepted_at = excluded.accepted_at
            "#,
            params![
                artifact_id,
                record.canonical_hash.as_str(),
                record.staleness_checksum.to_string(),
                record.accepted_at
            ],
        )
        .map_err(DbError::from)?;
        Ok(())
    }

    fn snapshot(&self, artifact_id: &str) -> Result<Option<CanonicalForm>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT family, canonical_form FROM baseline_snapshots WHERE artifact_id = ?1",
                params![artifact_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(DbError::from)?;

        let Some((family, text)) = row else {
            return Ok(None);
        };
        let family = FormatFamily::from_tag(&family).ok_or_else(|| StoreError::Corrupt {
            artifact_id: artifact_id.to_string(),
            reason: format!("unknown format family {family:?}"),
        })?;
        Ok(Some(CanonicalForm::from_stored(family, text)))
    }

    fn put_snapshot(&self, artifact_id: &str, form: &CanonicalForm) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO baseline_snapshots (artifact_id, family, canonical_form)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(artifact_id) DO UPDATE SET
                family = excluded.family,
                canonical_form = excluded.canonical_form
            "#,
            params![artifact_id, form.family().as_str(), form.as_str()],
        )
        .map_err(DbError::from)?;
        Ok(())
    }

    fn reset(&self, artifact_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(DbError::from)?;
        tx.execute("DELETE FROM baseline_snapshots WHERE artifact_id = ?1", params![artifact_id])
            .map_err(DbError::from)?;
        let removed = tx
            .execute("DELETE FROM baselines WHERE artifact_id = ?1", params![artifact_id])
            .map_err(DbError::from)?;
        tx.commit().map_err(DbError::from)?;
        Ok(removed > 0)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: baselines
/// - 2: add baseline_snapshots (canonical form of the accepted baseline)
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version < 1 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS baselines (
                artifact_id        TEXT PRIMARY KEY,
                canonical_hash     TEXT NOT NULL,
                staleness_checksum TEXT NOT NULL,
                accepted_at        TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS baseline_snapshots (
                artifact_id    TEXT PRIMARY KEY,
                family         TEXT NOT NULL,
                canonical_form TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
