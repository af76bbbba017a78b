use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::data::{
    CatalogRecord, CycleCounts, CycleId, Mtime, RecordDraft, RecordId, RecordState, Tags,
    ThumbnailBlob, ThumbnailRef,
};
use crate::error::{CatalogError, CatalogResult};

/// The persistent catalog as seen by the crawler, filter, pipeline and
/// thumbnail cache.
///
/// Implementations synchronize internally: every method is safe to call
/// from several threads, and `upsert` is atomic with respect to concurrent
/// readers. Cross-record transactions are not required.
pub trait Catalog: Send + Sync {
    /// Look up the record for a canonical path.
    fn get(&self, path: &str) -> CatalogResult<Option<CatalogRecord>>;

    fn get_by_id(&self, id: RecordId) -> CatalogResult<Option<CatalogRecord>>;

    /// Insert or replace the record for `draft.absolute_path` together with
    /// its thumbnail. A MarkedRemoved record becomes Present again.
    fn upsert(&self, draft: &RecordDraft) -> CatalogResult<CatalogRecord>;

    /// Record that `path` was observed during `cycle`.
    fn touch(&self, path: &str, cycle: CycleId) -> CatalogResult<()>;

    /// Transition a Present record to MarkedRemoved.
    /// Returns false if there was no Present record for `path`.
    fn mark_removed(&self, path: &str, cycle: CycleId) -> CatalogResult<bool>;

    fn load_thumbnail(&self, thumbnail: ThumbnailRef) -> CatalogResult<ThumbnailBlob>;

    fn begin_cycle(&self) -> CatalogResult<CycleId>;

    /// Present records under `roots` that were not observed during `cycle`.
    fn stale_records(
        &self,
        cycle: CycleId,
        roots: &[PathBuf],
    ) -> CatalogResult<Vec<CatalogRecord>>;

    fn end_cycle(&self, cycle: CycleId, counts: &CycleCounts) -> CatalogResult<()>;

    /// Close a cycle that stopped early. No Removed sweep was performed.
    fn abort_cycle(&self, cycle: CycleId, reason: &str) -> CatalogResult<()>;

    /// Resolve a record id to its thumbnail blob.
    fn thumbnail_for_record(&self, id: RecordId) -> CatalogResult<ThumbnailBlob> {
        let record = self.get_by_id(id)?.ok_or(CatalogError::RecordNotFound(id))?;
        self.load_thumbnail(record.thumbnail_ref)
    }
}

/// Stored state of a crawl cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub id: CycleId,
    pub started_at: DateTime<Utc>,
    /// 'running', 'completed' or 'aborted'
    pub status: String,
    pub counts: Option<CycleCounts>,
    pub reason: Option<String>,
}

const RECORD_COLUMNS: &str = "id, path, size_bytes, mtime_secs, mtime_nanos, content_hash, \
     tags_json, thumbnail_id, state, seen_cycle, last_seen";

/// The Library manages the SQLite catalog database.
/// It stores one record per file plus the encoded thumbnails.
pub struct Library {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the catalog at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> CatalogResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        info!("Catalog database opened at {}", db_path.display());

        let library = Library {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Open the catalog in the user's data directory:
    /// - Linux: ~/.local/share/astro-catalog/catalog.db
    /// - macOS: ~/Library/Application Support/astro-catalog/catalog.db
    /// - Windows: %APPDATA%\astro-catalog\catalog.db
    pub fn open_default() -> CatalogResult<Self> {
        let path = Self::default_db_path().ok_or_else(|| {
            CatalogError::Unavailable("could not determine user data directory".into())
        })?;
        Self::open(path)
    }

    /// A throwaway catalog, used by tests and dry runs.
    pub fn open_in_memory() -> CatalogResult<Self> {
        let conn = Connection::open_in_memory()?;
        let library = Library {
            conn: Mutex::new(conn),
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    pub fn default_db_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("astro-catalog");
        path.push("catalog.db");
        Some(path)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> CatalogResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Encoded thumbnails, referenced by records.thumbnail_id
        conn.execute(
            "CREATE TABLE IF NOT EXISTS thumbnails (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                width           INTEGER NOT NULL,
                height          INTEGER NOT NULL,
                data            BLOB NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                size_bytes      INTEGER NOT NULL,
                mtime_secs      INTEGER NOT NULL,
                mtime_nanos     INTEGER NOT NULL,
                content_hash    TEXT NOT NULL,
                tags_json       TEXT NOT NULL,
                thumbnail_id    INTEGER NOT NULL REFERENCES thumbnails(id),
                state           TEXT NOT NULL DEFAULT 'present',
                seen_cycle      INTEGER NOT NULL,
                last_seen       INTEGER NOT NULL,
                removed_cycle   INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cycles (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at      INTEGER NOT NULL,
                ended_at        INTEGER,
                status          TEXT NOT NULL DEFAULT 'running',
                counts_json     TEXT,
                reason          TEXT
            )",
            [],
        )?;

        // The Removed sweep scans present records by cycle
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_state_seen
             ON records(state, seen_cycle)",
            [],
        )?;

        debug!("Catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file (None for in-memory catalogs)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Get a count of records in the given state
    pub fn record_count(&self, state: RecordState) -> CatalogResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE state = ?1",
            [state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Get all records ordered by path
    pub fn all_records(&self) -> CatalogResult<Vec<CatalogRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records ORDER BY path"
        ))?;
        let rows = stmt.query_map([], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// Permanently delete MarkedRemoved records and their thumbnails.
    /// Returns the number of records destroyed.
    pub fn purge_removed(&self) -> CatalogResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        // Records first: they hold the foreign key on thumbnails
        let purged = tx.execute("DELETE FROM records WHERE state = 'removed'", [])?;
        tx.execute(
            "DELETE FROM thumbnails WHERE id NOT IN (SELECT thumbnail_id FROM records)",
            [],
        )?;
        tx.commit()?;

        if purged > 0 {
            info!("Purged {} removed records", purged);
        }
        Ok(purged)
    }

    pub fn cycle_summary(&self, cycle: CycleId) -> CatalogResult<Option<CycleSummary>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, started_at, status, counts_json, reason FROM cycles WHERE id = ?1",
                [cycle.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, started_at, status, counts_json, reason)) = row else {
            return Ok(None);
        };
        let counts = counts_json
            .map(|json| serde_json::from_str::<CycleCounts>(&json))
            .transpose()?;

        Ok(Some(CycleSummary {
            id: CycleId(id),
            started_at: timestamp_from_millis("cycles.started_at", started_at)?,
            status,
            counts,
            reason,
        }))
    }

    fn query_record(
        &self,
        sql: &str,
        param: &dyn rusqlite::ToSql,
    ) -> CatalogResult<Option<CatalogRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(sql, [param], RecordRow::from_row)
            .optional()?;
        row.map(RecordRow::into_record).transpose()
    }
}

impl Catalog for Library {
    fn get(&self, path: &str) -> CatalogResult<Option<CatalogRecord>> {
        self.query_record(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE path = ?1"),
            &path,
        )
    }

    fn get_by_id(&self, id: RecordId) -> CatalogResult<Option<CatalogRecord>> {
        self.query_record(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
            &id.0,
        )
    }

    fn upsert(&self, draft: &RecordDraft) -> CatalogResult<CatalogRecord> {
        let tags_json = serde_json::to_string(&draft.tags)?;
        let now = Utc::now().timestamp_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let previous_thumbnail: Option<i64> = tx
            .query_row(
                "SELECT thumbnail_id FROM records WHERE path = ?1",
                [&draft.absolute_path],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "INSERT INTO thumbnails (width, height, data) VALUES (?1, ?2, ?3)",
            params![draft.thumbnail.width, draft.thumbnail.height, &draft.thumbnail.bytes],
        )?;
        let thumbnail_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO records (path, size_bytes, mtime_secs, mtime_nanos, content_hash,
                                  tags_json, thumbnail_id, state, seen_cycle, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'present', ?8, ?9)
             ON CONFLICT(path) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                mtime_secs = excluded.mtime_secs,
                mtime_nanos = excluded.mtime_nanos,
                content_hash = excluded.content_hash,
                tags_json = excluded.tags_json,
                thumbnail_id = excluded.thumbnail_id,
                state = 'present',
                seen_cycle = MAX(records.seen_cycle, excluded.seen_cycle),
                last_seen = excluded.last_seen,
                removed_cycle = NULL",
            params![
                &draft.absolute_path,
                draft.size_bytes as i64,
                draft.mtime.secs,
                draft.mtime.nanos,
                &draft.content_hash,
                &tags_json,
                thumbnail_id,
                draft.seen_cycle.0,
                now,
            ],
        )?;

        if let Some(old) = previous_thumbnail {
            tx.execute("DELETE FROM thumbnails WHERE id = ?1", [old])?;
        }

        let record = tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE path = ?1"),
                [&draft.absolute_path],
                RecordRow::from_row,
            )?
            .into_record()?;

        tx.commit()?;
        Ok(record)
    }

    fn touch(&self, path: &str, cycle: CycleId) -> CatalogResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET seen_cycle = MAX(seen_cycle, ?1), last_seen = ?2 WHERE path = ?3",
            params![cycle.0, Utc::now().timestamp_millis(), path],
        )?;
        Ok(())
    }

    fn mark_removed(&self, path: &str, cycle: CycleId) -> CatalogResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE records SET state = 'removed', removed_cycle = ?1
             WHERE path = ?2 AND state = 'present'",
            params![cycle.0, path],
        )?;
        Ok(changed > 0)
    }

    fn load_thumbnail(&self, thumbnail: ThumbnailRef) -> CatalogResult<ThumbnailBlob> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT width, height, data FROM thumbnails WHERE id = ?1",
            [thumbnail.0],
            |row| {
                Ok(ThumbnailBlob {
                    width: row.get(0)?,
                    height: row.get(1)?,
                    bytes: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or(CatalogError::ThumbnailNotFound(thumbnail))
    }

    fn begin_cycle(&self) -> CatalogResult<CycleId> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cycles (started_at, status) VALUES (?1, 'running')",
            [Utc::now().timestamp_millis()],
        )?;
        Ok(CycleId(conn.last_insert_rowid()))
    }

    fn stale_records(
        &self,
        cycle: CycleId,
        roots: &[PathBuf],
    ) -> CatalogResult<Vec<CatalogRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE state = 'present' AND seen_cycle < ?1
             ORDER BY path"
        ))?;
        let rows = stmt.query_map([cycle.0], RecordRow::from_row)?;

        let mut stale = Vec::new();
        for row in rows {
            let record = row?.into_record()?;
            let path = Path::new(&record.absolute_path);
            if roots.iter().any(|root| path.starts_with(root)) {
                stale.push(record);
            }
        }
        Ok(stale)
    }

    fn end_cycle(&self, cycle: CycleId, counts: &CycleCounts) -> CatalogResult<()> {
        let counts_json = serde_json::to_string(counts)?;
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cycles SET ended_at = ?1, status = 'completed', counts_json = ?2 WHERE id = ?3",
            params![Utc::now().timestamp_millis(), counts_json, cycle.0],
        )?;
        Ok(())
    }

    fn abort_cycle(&self, cycle: CycleId, reason: &str) -> CatalogResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cycles SET ended_at = ?1, status = 'aborted', reason = ?2 WHERE id = ?3",
            params![Utc::now().timestamp_millis(), reason, cycle.0],
        )?;
        Ok(())
    }
}

/// Raw column values of a `records` row
struct RecordRow {
    id: i64,
    path: String,
    size_bytes: i64,
    mtime_secs: i64,
    mtime_nanos: i64,
    content_hash: String,
    tags_json: String,
    thumbnail_id: i64,
    state: String,
    seen_cycle: i64,
    last_seen: i64,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            id: row.get(0)?,
            path: row.get(1)?,
            size_bytes: row.get(2)?,
            mtime_secs: row.get(3)?,
            mtime_nanos: row.get(4)?,
            content_hash: row.get(5)?,
            tags_json: row.get(6)?,
            thumbnail_id: row.get(7)?,
            state: row.get(8)?,
            seen_cycle: row.get(9)?,
            last_seen: row.get(10)?,
        })
    }

    fn into_record(self) -> CatalogResult<CatalogRecord> {
        let state = RecordState::parse(&self.state).ok_or(CatalogError::InvalidValue {
            column: "records.state",
            value: self.state.clone(),
        })?;
        let nanos = u32::try_from(self.mtime_nanos).map_err(|_| CatalogError::InvalidValue {
            column: "records.mtime_nanos",
            value: self.mtime_nanos.to_string(),
        })?;
        let tags: Tags = serde_json::from_str(&self.tags_json)?;

        Ok(CatalogRecord {
            id: RecordId(self.id),
            absolute_path: self.path,
            size_bytes: self.size_bytes as u64,
            mtime: Mtime::new(self.mtime_secs, nanos),
            content_hash: self.content_hash,
            tags,
            thumbnail_ref: ThumbnailRef(self.thumbnail_id),
            state,
            seen_cycle: CycleId(self.seen_cycle),
            last_seen: timestamp_from_millis("records.last_seen", self.last_seen)?,
        })
    }
}

fn timestamp_from_millis(column: &'static str, millis: i64) -> CatalogResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(CatalogError::InvalidValue {
        column,
        value: millis.to_string(),
    })
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(path: &str, size: u64, cycle: CycleId) -> RecordDraft {
        let mut tags = Tags::new();
        tags.insert("OBJECT".into(), "M31".into());
        RecordDraft {
            absolute_path: path.to_string(),
            size_bytes: size,
            mtime: Mtime::new(1_700_000_000, 42),
            content_hash: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
            tags,
            thumbnail: ThumbnailBlob {
                width: 2,
                height: 1,
                bytes: vec![1, 2, 3],
            },
            seen_cycle: cycle,
        }
    }

    #[test]
    fn test_upsert_then_get() {
        let library = Library::open_in_memory().unwrap();
        let cycle = library.begin_cycle().unwrap();

        let stored = library.upsert(&draft("/data/a.fits", 100, cycle)).unwrap();
        let fetched = library.get("/data/a.fits").unwrap().unwrap();

        assert_eq!(stored, fetched);
        assert_eq!(fetched.size_bytes, 100);
        assert_eq!(fetched.mtime, Mtime::new(1_700_000_000, 42));
        assert_eq!(fetched.state, RecordState::Present);
        assert_eq!(fetched.seen_cycle, cycle);
        assert_eq!(fetched.tags.get("OBJECT").map(String::as_str), Some("M31"));
        assert_eq!(library.get_by_id(fetched.id).unwrap(), Some(fetched));
        assert!(library.get("/data/missing.fits").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_thumbnail_and_keeps_id() {
        let library = Library::open_in_memory().unwrap();
        let cycle = library.begin_cycle().unwrap();

        let first = library.upsert(&draft("/data/a.fits", 100, cycle)).unwrap();
        let mut changed = draft("/data/a.fits", 150, cycle);
        changed.thumbnail.bytes = vec![9, 9];
        let second = library.upsert(&changed).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.size_bytes, 150);
        assert_ne!(first.thumbnail_ref, second.thumbnail_ref);
        assert!(matches!(
            library.load_thumbnail(first.thumbnail_ref),
            Err(CatalogError::ThumbnailNotFound(_))
        ));
        assert_eq!(library.load_thumbnail(second.thumbnail_ref).unwrap().bytes, vec![9, 9]);
        assert_eq!(library.thumbnail_for_record(second.id).unwrap().bytes, vec![9, 9]);
    }

    #[test]
    fn test_mark_removed_once_and_resurrect() {
        let library = Library::open_in_memory().unwrap();
        let cycle = library.begin_cycle().unwrap();
        library.upsert(&draft("/data/b.fits", 200, cycle)).unwrap();

        assert!(library.mark_removed("/data/b.fits", cycle).unwrap());
        assert!(!library.mark_removed("/data/b.fits", cycle).unwrap());
        assert_eq!(
            library.get("/data/b.fits").unwrap().unwrap().state,
            RecordState::MarkedRemoved
        );

        let again = library.upsert(&draft("/data/b.fits", 200, cycle)).unwrap();
        assert_eq!(again.state, RecordState::Present);
    }

    #[test]
    fn test_stale_records_limited_to_roots_and_cycle() {
        let library = Library::open_in_memory().unwrap();
        let first = library.begin_cycle().unwrap();
        library.upsert(&draft("/data/a.fits", 1, first)).unwrap();
        library.upsert(&draft("/data/b.fits", 1, first)).unwrap();
        library.upsert(&draft("/other/c.fits", 1, first)).unwrap();
        library.end_cycle(first, &CycleCounts::default()).unwrap();

        let second = library.begin_cycle().unwrap();
        assert!(second > first);
        library.touch("/data/a.fits", second).unwrap();

        let stale = library
            .stale_records(second, &[PathBuf::from("/data")])
            .unwrap();
        let paths: Vec<_> = stale.iter().map(|r| r.absolute_path.as_str()).collect();
        assert_eq!(paths, vec!["/data/b.fits"]);

        // Sibling directories sharing a prefix are not under the root
        let stale = library
            .stale_records(second, &[PathBuf::from("/dat")])
            .unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn test_cycle_ledger() {
        let library = Library::open_in_memory().unwrap();
        let cycle = library.begin_cycle().unwrap();
        assert_eq!(library.cycle_summary(cycle).unwrap().unwrap().status, "running");

        let counts = CycleCounts {
            found: 2,
            new: 2,
            extracted: 2,
            ..CycleCounts::default()
        };
        library.end_cycle(cycle, &counts).unwrap();
        let summary = library.cycle_summary(cycle).unwrap().unwrap();
        assert_eq!(summary.status, "completed");
        assert_eq!(summary.counts, Some(counts));

        let aborted = library.begin_cycle().unwrap();
        library.abort_cycle(aborted, "canceled").unwrap();
        let summary = library.cycle_summary(aborted).unwrap().unwrap();
        assert_eq!(summary.status, "aborted");
        assert_eq!(summary.reason.as_deref(), Some("canceled"));
    }

    #[test]
    fn test_purge_removed() {
        let library = Library::open_in_memory().unwrap();
        let cycle = library.begin_cycle().unwrap();
        let kept = library.upsert(&draft("/data/a.fits", 1, cycle)).unwrap();
        let gone = library.upsert(&draft("/data/b.fits", 1, cycle)).unwrap();
        library.mark_removed("/data/b.fits", cycle).unwrap();

        assert_eq!(library.purge_removed().unwrap(), 1);
        assert_eq!(library.record_count(RecordState::Present).unwrap(), 1);
        assert_eq!(library.record_count(RecordState::MarkedRemoved).unwrap(), 0);
        assert!(library.load_thumbnail(gone.thumbnail_ref).is_err());
        assert!(library.load_thumbnail(kept.thumbnail_ref).is_ok());
        assert_eq!(library.all_records().unwrap().len(), 1);

        // Nothing left to purge
        assert_eq!(library.purge_removed().unwrap(), 0);
    }

    #[test]
    fn test_purge_removed_on_disk_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open(dir.path().join("catalog.db")).unwrap();
        let cycle = library.begin_cycle().unwrap();
        for path in ["/data/a.fits", "/data/b.fits", "/data/c.fits"] {
            library.upsert(&draft(path, 1, cycle)).unwrap();
        }
        library.mark_removed("/data/a.fits", cycle).unwrap();
        library.mark_removed("/data/c.fits", cycle).unwrap();

        assert_eq!(library.purge_removed().unwrap(), 2);
        let remaining = library.all_records().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(library.load_thumbnail(remaining[0].thumbnail_ref).is_ok());
    }

    #[test]
    fn test_open_on_disk_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("catalog.db");
        let library = Library::open(&db_path).unwrap();
        assert_eq!(library.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }
}
