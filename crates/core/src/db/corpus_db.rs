use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::db::{CandidateFilter, Catalog, WriteMode, WriteOutcome};
use crate::model::{BinaryRecord, CandidateBinary, CatalogEntry, ContentDigest, Fingerprint};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Pages copied per backup step when mirroring into memory.
const MIRROR_PAGES_PER_STEP: i32 = 256;

/// Error type for corpus database operations.
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

/// Where a store's pages live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Disk(PathBuf),
    Memory,
}

/// SQLite-backed corpus of catalogued binaries and their function fingerprints.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Typed query/mutate helpers; callers never see a cursor.
#[derive(Debug)]
pub struct CorpusStore {
    conn: Connection,
    location: StoreLocation,
}

impl CorpusStore {
    /// Open (or create) a corpus database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, StoreLocation::Disk(path.to_path_buf()))
    }

    /// Open an empty, transient corpus that lives only as long as this value.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, StoreLocation::Memory)
    }

    fn from_connection(conn: Connection, location: StoreLocation) -> DbResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        apply_migrations(&conn)?;
        Ok(Self { conn, location })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    /// For most code, prefer higher-level helpers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Number of pages in the main database file.
    pub fn page_count(&self) -> DbResult<u64> {
        let pages: i64 = self.conn.query_row("PRAGMA page_count;", [], |row| row.get(0))?;
        Ok(pages.max(0) as u64)
    }

    pub fn page_size(&self) -> DbResult<u64> {
        let size: i64 = self.conn.query_row("PRAGMA page_size;", [], |row| row.get(0))?;
        Ok(size.max(0) as u64)
    }

    /// Approximate on-disk footprint in bytes (`page_count * page_size`).
    pub fn estimated_size(&self) -> DbResult<u64> {
        Ok(self.page_count()?.saturating_mul(self.page_size()?))
    }

    /// Copy every page of this store into a fresh in-memory store.
    pub fn mirror_into_memory(&self) -> DbResult<CorpusStore> {
        let mut replica = Connection::open_in_memory()?;
        {
            let backup = Backup::new(&self.conn, &mut replica)?;
            backup.run_to_completion(MIRROR_PAGES_PER_STEP, Duration::ZERO, None)?;
        }
        CorpusStore::from_connection(replica, StoreLocation::Memory)
    }

    /// List every catalogued binary id (ordered by insertion).
    pub fn list_binary_ids(&self) -> DbResult<Vec<ContentDigest>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id FROM binaries
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, ContentDigest>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of fingerprints owned by a binary.
    pub fn function_count(&self, id: &ContentDigest) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM functions WHERE binary_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Replace (or create) a binary and its fingerprints in one transaction.
    pub fn replace_binary(&self, entry: &CatalogEntry) -> DbResult<WriteOutcome> {
        self.write_entry(entry, WriteMode::Replace)
    }

    /// Delete a binary and every fingerprint it owns. Returns the number of binary rows removed.
    pub fn delete_binary(&self, id: &ContentDigest) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = delete_binary_rows(&tx, id)?;
        tx.commit()?;
        Ok(removed)
    }
}

impl Catalog for CorpusStore {
    fn contains_binary(&self, id: &ContentDigest) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM binaries WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn get_binary(&self, id: &ContentDigest) -> DbResult<Option<BinaryRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT id, author, filenames, comment, trust_level, filetype
                FROM binaries
                WHERE id = ?1
                "#,
                params![id],
                map_binary,
            )
            .optional()?;
        Ok(record)
    }

    fn list_binaries(&self) -> DbResult<Vec<BinaryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, author, filenames, comment, trust_level, filetype
            FROM binaries
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([], map_binary)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn candidates(&self, filter: &CandidateFilter) -> DbResult<Vec<CandidateBinary>> {
        fn map_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandidateBinary> {
            Ok(CandidateBinary { id: row.get(0)?, trust_level: row.get(1)? })
        }

        let mut stmt = match filter {
            CandidateFilter::All => self.conn.prepare(
                r#"
                SELECT id, trust_level FROM binaries
                ORDER BY rowid
                "#,
            )?,
            CandidateFilter::Filetype(_) => self.conn.prepare(
                r#"
                SELECT id, trust_level FROM binaries
                WHERE filetype = ?1
                ORDER BY rowid
                "#,
            )?,
        };

        let rows = match filter {
            CandidateFilter::All => stmt.query_map([], map_candidate)?,
            CandidateFilter::Filetype(filetype) => {
                stmt.query_map(params![filetype], map_candidate)?
            }
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fingerprints_for(&self, id: &ContentDigest) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT hash FROM functions
            WHERE binary_id = ?1
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fingerprint_total(&self, filter: &CandidateFilter) -> DbResult<u64> {
        let count: i64 = match filter {
            CandidateFilter::All => {
                self.conn.query_row("SELECT count(*) FROM functions", [], |row| row.get(0))?
            }
            CandidateFilter::Filetype(filetype) => self.conn.query_row(
                r#"
                SELECT count(*) FROM functions
                JOIN binaries ON binaries.id = functions.binary_id
                WHERE binaries.filetype = ?1
                "#,
                params![filetype],
                |row| row.get(0),
            )?,
        };
        Ok(count.max(0) as u64)
    }

    fn memory_resident(&self) -> bool {
        self.location == StoreLocation::Memory
    }

    fn write_entry(&self, entry: &CatalogEntry, mode: WriteMode) -> DbResult<WriteOutcome> {
        // IMMEDIATE takes the write lock up front so the duplicate check and the
        // delete-then-insert cannot interleave with another writer.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let id = &entry.record.id;

        let exists: bool = tx
            .query_row("SELECT 1 FROM binaries WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();

        let outcome = match (exists, mode) {
            (true, WriteMode::InsertOnly) => return Ok(WriteOutcome::Duplicate),
            (true, WriteMode::Replace) => {
                delete_binary_rows(&tx, id)?;
                WriteOutcome::Replaced
            }
            (false, _) => WriteOutcome::Inserted,
        };

        insert_binary_row(&tx, &entry.record)?;
        insert_function_rows(&tx, id, &entry.fingerprints)?;
        tx.commit()?;
        Ok(outcome)
    }
}

fn map_binary(row: &rusqlite::Row<'_>) -> rusqlite::Result<BinaryRecord> {
    Ok(BinaryRecord {
        id: row.get(0)?,
        author: row.get(1)?,
        filenames: row.get(2)?,
        comment: row.get(3)?,
        trust_level: row.get(4)?,
        filetype: row.get(5)?,
    })
}

fn insert_binary_row(conn: &Connection, record: &BinaryRecord) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO binaries (id, author, filenames, comment, trust_level, filetype)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            record.id,
            record.author,
            record.filenames,
            record.comment,
            record.trust_level,
            record.filetype
        ],
    )?;
    Ok(())
}

fn insert_function_rows(
    conn: &Connection,
    id: &ContentDigest,
    hashes: &[Fingerprint],
) -> DbResult<usize> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO functions (hash, binary_id)
        VALUES (?1, ?2)
        "#,
    )?;
    for hash in hashes {
        stmt.execute(params![hash.as_str(), id])?;
    }
    Ok(hashes.len())
}

fn delete_binary_rows(conn: &Connection, id: &ContentDigest) -> DbResult<usize> {
    conn.execute("DELETE FROM functions WHERE binary_id = ?1", params![id])?;
    let removed = conn.execute("DELETE FROM binaries WHERE id = ?1", params![id])?;
    Ok(removed)
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: initial schema (binaries, functions)
/// - 2: index functions by owning binary
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS binaries (
                id          TEXT PRIMARY KEY NOT NULL,
                author      TEXT NOT NULL DEFAULT 'unknown',
                filenames   TEXT NOT NULL DEFAULT 'unknown',
                comment     TEXT NOT NULL DEFAULT '',
                trust_level TEXT NOT NULL CHECK (trust_level IN ('whitelist', 'blacklist')),
                filetype    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS functions (
                hash      TEXT NOT NULL,
                binary_id TEXT NOT NULL REFERENCES binaries(id)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE INDEX IF NOT EXISTS idx_functions_binary_id ON functions(binary_id);
            CREATE INDEX IF NOT EXISTS idx_binaries_filetype ON binaries(filetype);
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
