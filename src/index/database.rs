//! SQLite-backed fingerprint index.
//!
//! # Schema
//!
//! - `records(fingerprint BLOB, file TEXT, line INTEGER)`: one row per record
//! - `files(path TEXT PRIMARY KEY, size, modified_ns, records)`: snapshot of
//!   every fully ingested file
//! - `meta(key TEXT PRIMARY KEY, value TEXT)`: schema version and the
//!   settings that shaped the fingerprints
//!
//! # Concurrency Model
//!
//! The connection sits behind a `Mutex`, so any number of ingest workers may
//! share one index while inserts are serialized (single writer). Grouping
//! queries stream rows ordered by `(fingerprint, file, line)`, which SQLite
//! sorts on disk, so memory stays bounded by the largest single group.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::duplicates::groups::DuplicateGroup;
use crate::scanner::{EmptyTextPolicy, FileSnapshot, Fingerprint, LocationRef, TextNormalization};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        size INTEGER NOT NULL,
        modified_ns INTEGER NOT NULL,
        records INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS records (
        fingerprint BLOB NOT NULL,
        file TEXT NOT NULL,
        line INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_records_file ON records(file);
";

const GROUPS_QUERY: &str = "
    SELECT r.fingerprint, r.file, r.line
    FROM records r
    JOIN (
        SELECT fingerprint FROM records
        GROUP BY fingerprint
        HAVING COUNT(*) > ?1
    ) d ON r.fingerprint = d.fingerprint
    ORDER BY r.fingerprint, r.file, r.line
";

/// Settings that change which texts share a fingerprint.
///
/// Fingerprints produced under different settings are not comparable, so
/// opening an index with settings that differ from the stored ones clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// JSON field the text was read from
    pub text_field: String,
    /// Normalization applied before hashing
    pub normalization: TextNormalization,
    /// Handling of empty text
    pub empty_text: EmptyTextPolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            text_field: "text".to_string(),
            normalization: TextNormalization::Exact,
            empty_text: EmptyTextPolicy::Group,
        }
    }
}

/// Errors raised by the fingerprint index. All of them are fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The database could not be created, opened or configured.
    #[error("failed to open fingerprint index {path}: {source}")]
    Open {
        /// Index path
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// The parent directory of the index could not be created.
    #[error("failed to create index directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A read-only open was requested for an index that does not exist.
    #[error("fingerprint index not found: {0}")]
    NotFound(PathBuf),

    /// The index was written by an incompatible version.
    #[error("fingerprint index {path} has schema version {found}, expected {expected}")]
    SchemaMismatch {
        /// Index path
        path: PathBuf,
        /// Stored version (0 when absent)
        found: u32,
        /// Supported version
        expected: u32,
    },

    /// A write was attempted through a read-only handle.
    #[error("fingerprint index {0} is open read-only")]
    ReadOnly(PathBuf),

    /// A stored row could not be decoded.
    #[error("corrupt fingerprint index row: {0}")]
    Corrupt(String),

    /// A query failed.
    #[error("fingerprint index query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Acquires the connection lock, recovering from poisoning.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Fingerprint index mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn line_to_sql(line: u64) -> i64 {
    i64::try_from(line).unwrap_or(i64::MAX)
}

/// Disk-backed mapping from fingerprint to the locations sharing it.
pub struct FingerprintIndex {
    conn: Mutex<Connection>,
    path: PathBuf,
    read_only: bool,
}

impl std::fmt::Debug for FingerprintIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintIndex")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl FingerprintIndex {
    /// Create or open an index for writing.
    ///
    /// An index written by another schema version is rebuilt, and one built
    /// with different [`IndexSettings`] is cleared.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the database cannot be created, opened or
    /// initialized. There is no in-memory fallback.
    pub fn open(path: &Path, settings: &IndexSettings) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let open_err = |source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(open_err)?;

        // Tuning only; a failure here leaves a slower but correct index.
        for (name, value) in [
            ("journal_mode", "TRUNCATE"),
            ("synchronous", "NORMAL"),
            ("temp_store", "FILE"),
        ] {
            if let Err(e) = conn.pragma_update(None, name, value) {
                log::debug!("Could not set PRAGMA {} = {}: {}", name, value, e);
            }
        }

        conn.execute_batch(SCHEMA).map_err(open_err)?;

        let index = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            read_only: false,
        };

        match index.meta("schema_version")? {
            Some(v) if v == SCHEMA_VERSION.to_string() => {}
            Some(v) => {
                log::warn!(
                    "Index {} has schema version {}, rebuilding",
                    path.display(),
                    v
                );
                index.rebuild_schema()?;
            }
            None => index.set_meta("schema_version", &SCHEMA_VERSION.to_string())?,
        }

        index.apply_settings(settings)?;
        log::debug!("Opened fingerprint index {}", path.display());
        Ok(index)
    }

    /// Open an existing index read-only.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if the file does not exist, and
    /// [`IndexError::SchemaMismatch`] if it was not written by this version.
    pub fn open_read_only(path: &Path) -> Result<Self, IndexError> {
        if !path.is_file() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let index = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            read_only: true,
        };

        let version = index
            .meta("schema_version")?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        if version != SCHEMA_VERSION {
            return Err(IndexError::SchemaMismatch {
                path: path.to_path_buf(),
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(index)
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle rejects writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn ensure_writable(&self) -> Result<(), IndexError> {
        if self.read_only {
            Err(IndexError::ReadOnly(self.path.clone()))
        } else {
            Ok(())
        }
    }

    fn meta(&self, key: &str) -> Result<Option<String>, IndexError> {
        let conn = acquire_lock(&self.conn);
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn rebuild_schema(&self) -> Result<(), IndexError> {
        {
            let conn = acquire_lock(&self.conn);
            conn.execute_batch(
                "DROP TABLE IF EXISTS records;
                 DROP TABLE IF EXISTS files;
                 DELETE FROM meta;",
            )?;
            conn.execute_batch(SCHEMA)?;
        }
        self.set_meta("schema_version", &SCHEMA_VERSION.to_string())
    }

    fn apply_settings(&self, settings: &IndexSettings) -> Result<(), IndexError> {
        let stored = self
            .meta("settings")?
            .and_then(|json| serde_json::from_str::<IndexSettings>(&json).ok());

        if let Some(stored) = stored {
            if stored != *settings {
                log::warn!(
                    "Index settings changed ({:?} -> {:?}), clearing {}",
                    stored,
                    settings,
                    self.path.display()
                );
                self.clear()?;
            }
        }

        let json = serde_json::to_string(settings)
            .map_err(|e| IndexError::Corrupt(format!("cannot encode settings: {e}")))?;
        self.set_meta("settings", &json)
    }

    /// Settings the stored fingerprints were computed with.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn settings(&self) -> Result<Option<IndexSettings>, IndexError> {
        Ok(self
            .meta("settings")?
            .and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// Append one location under a fingerprint.
    ///
    /// Inserting the same location twice is a caller bug and is not guarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the write fails.
    pub fn insert(&self, fingerprint: &Fingerprint, location: &LocationRef) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);
        conn.prepare_cached("INSERT INTO records (fingerprint, file, line) VALUES (?1, ?2, ?3)")?
            .execute(params![
                &fingerprint[..],
                &location.file,
                line_to_sql(location.line)
            ])?;
        Ok(())
    }

    /// Append a batch of rows in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the write fails; the
    /// batch is then rolled back as a whole.
    pub fn insert_batch(&self, rows: &[(Fingerprint, LocationRef)]) -> Result<(), IndexError> {
        self.ensure_writable()?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO records (fingerprint, file, line) VALUES (?1, ?2, ?3)",
            )?;
            for (fingerprint, location) in rows {
                stmt.execute(params![
                    &fingerprint[..],
                    &location.file,
                    line_to_sql(location.line)
                ])?;
            }
        }
        tx.commit()?;
        log::trace!("Inserted {} index rows", rows.len());
        Ok(())
    }

    /// Forget everything stored for a file ahead of re-ingesting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the delete fails.
    pub fn begin_file(&self, key: &str) -> Result<(), IndexError> {
        self.discard_file(key)
    }

    /// Record that a file was ingested completely.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the write fails.
    pub fn finish_file(&self, key: &str, snapshot: &FileSnapshot) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO files (path, size, modified_ns, records) VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                i64::try_from(snapshot.size).unwrap_or(i64::MAX),
                snapshot.modified_ns,
                i64::try_from(snapshot.records).unwrap_or(i64::MAX)
            ],
        )?;
        Ok(())
    }

    /// Remove a file's rows and snapshot, e.g. after a read error part way.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the delete fails.
    pub fn discard_file(&self, key: &str) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE file = ?1", [key])?;
        tx.execute("DELETE FROM files WHERE path = ?1", [key])?;
        tx.commit()?;
        Ok(())
    }

    /// Snapshot stored for a fully ingested file.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn snapshot(&self, key: &str) -> Result<Option<FileSnapshot>, IndexError> {
        let conn = acquire_lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT size, modified_ns, records FROM files WHERE path = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(size, modified_ns, records)| FileSnapshot {
            size: u64::try_from(size).unwrap_or(0),
            modified_ns,
            records: u64::try_from(records).unwrap_or(0),
        }))
    }

    /// Keys of all fully ingested files, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn indexed_files(&self) -> Result<Vec<String>, IndexError> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare("SELECT path FROM files ORDER BY path")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Drop every file not in `present`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or a delete fails.
    pub fn prune_missing(&self, present: &HashSet<String>) -> Result<usize, IndexError> {
        let stale: Vec<String> = self
            .indexed_files()?
            .into_iter()
            .filter(|key| !present.contains(key))
            .collect();
        for key in &stale {
            log::debug!("Pruning vanished file from index: {}", key);
            self.discard_file(key)?;
        }
        Ok(stale.len())
    }

    /// Remove all records and snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or the delete fails.
    pub fn clear(&self) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);
        conn.execute_batch("DELETE FROM records; DELETE FROM files;")?;
        Ok(())
    }

    /// Build the lookup index used by grouping queries.
    ///
    /// Called once ingestion is done; creating it after the bulk load is
    /// much cheaper than maintaining it row by row.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is read-only or index creation fails.
    pub fn finalize(&self) -> Result<(), IndexError> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_records_fingerprint ON records(fingerprint, file, line);",
        )?;
        Ok(())
    }

    /// Total number of stored locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn record_count(&self) -> Result<u64, IndexError> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Stream every group with more than `n` members to `f`.
    ///
    /// Groups arrive ordered by fingerprint with members ordered by
    /// `(file, line)`. Only one group is held in memory at a time. Returns
    /// the number of groups delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn for_each_group_with_count_above<F>(&self, n: usize, mut f: F) -> Result<usize, IndexError>
    where
        F: FnMut(DuplicateGroup),
    {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(GROUPS_QUERY)?;
        let mut rows = stmt.query(params![i64::try_from(n).unwrap_or(i64::MAX)])?;

        let mut current: Option<(Fingerprint, Vec<LocationRef>)> = None;
        let mut delivered = 0usize;

        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(0)?;
            let fingerprint: Fingerprint = blob.try_into().map_err(|b: Vec<u8>| {
                IndexError::Corrupt(format!("fingerprint has {} bytes, expected 32", b.len()))
            })?;
            let file: String = row.get(1)?;
            let line: i64 = row.get(2)?;
            let line = u64::try_from(line)
                .map_err(|_| IndexError::Corrupt(format!("negative line number {line} in {file}")))?;
            let location = LocationRef::new(file, line);

            let same = current.as_ref().is_some_and(|(fp, _)| *fp == fingerprint);
            if same {
                if let Some((_, members)) = current.as_mut() {
                    members.push(location);
                }
            } else if let Some((fp, members)) = current.replace((fingerprint, vec![location])) {
                f(DuplicateGroup::exact(&fp, members));
                delivered += 1;
            }
        }

        if let Some((fp, members)) = current {
            f(DuplicateGroup::exact(&fp, members));
            delivered += 1;
        }

        Ok(delivered)
    }

    /// All groups with more than `n` members, collected.
    ///
    /// Prefer [`Self::for_each_group_with_count_above`] on large corpora.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn groups_with_count_above(&self, n: usize) -> Result<Vec<DuplicateGroup>, IndexError> {
        let mut groups = Vec::new();
        self.for_each_group_with_count_above(n, |g| groups.push(g))?;
        Ok(groups)
    }
}
