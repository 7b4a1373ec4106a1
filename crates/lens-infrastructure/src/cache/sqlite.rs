//! SQLite-backed response cache.
//!
//! One row per request fingerprint in `http_cache`. Payloads carry a SHA-256
//! checksum so a damaged row surfaces as [`CacheError::Corrupted`] instead of
//! being replayed as a valid response.

use lens_domain::repositories::cache::{
    CacheEntry, CacheError, CacheStats, CacheStatus, PutOutcome, ResponseCache,
};
use lens_domain::repositories::fetcher::FetchErrorKind;
use lens_domain::value_objects::fingerprint::RequestFingerprint;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS http_cache (
     fingerprint   TEXT    PRIMARY KEY,
     payload       BLOB    NOT NULL,
     checksum      TEXT    NOT NULL,
     fetched_at_ms INTEGER NOT NULL,
     status        TEXT    NOT NULL CHECK (status IN ('success', 'error')),
     attempts      INTEGER NOT NULL,
     error_kind    TEXT
 );";

pub struct SqliteResponseCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

fn storage(err: rusqlite::Error) -> CacheError {
    CacheError::Storage(err.to_string())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl SqliteResponseCache {
    /// Opens (or creates) the cache file, switching it to WAL mode.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                CacheError::Storage(format!(
                    "failed to create cache directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(storage)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened response cache");
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

struct StoredRow {
    payload: Vec<u8>,
    checksum: String,
    fetched_at: i64,
    status: String,
    attempts: i64,
    error_kind: Option<String>,
}

impl StoredRow {
    fn into_entry(self, fingerprint: &RequestFingerprint) -> Result<CacheEntry, CacheError> {
        let corrupted = |reason: String| CacheError::Corrupted {
            fingerprint: fingerprint.to_string(),
            reason,
        };

        let actual = sha256_hex(&self.payload);
        if actual != self.checksum {
            return Err(corrupted(format!(
                "checksum mismatch: expected {}, got {actual}",
                self.checksum
            )));
        }
        let status = CacheStatus::parse(&self.status)
            .ok_or_else(|| corrupted(format!("unknown status {}", self.status)))?;
        let error_kind = match self.error_kind.as_deref() {
            None => None,
            Some(raw) => Some(
                FetchErrorKind::parse(raw)
                    .ok_or_else(|| corrupted(format!("unknown error kind {raw}")))?,
            ),
        };
        if status == CacheStatus::Error && error_kind.is_none() {
            return Err(corrupted("error entry without error kind".to_string()));
        }
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| corrupted(format!("invalid attempt count {}", self.attempts)))?;

        Ok(CacheEntry {
            fingerprint: fingerprint.clone(),
            payload: self.payload,
            fetched_at: self.fetched_at,
            status,
            attempts,
            error_kind,
        })
    }
}

impl ResponseCache for SqliteResponseCache {
    fn get(&self, fingerprint: &RequestFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT payload, checksum, fetched_at_ms, status, attempts, error_kind
                 FROM http_cache WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| {
                    Ok(StoredRow {
                        payload: row.get(0)?,
                        checksum: row.get(1)?,
                        fetched_at: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        error_kind: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(storage)?;
        row.map(|row| row.into_entry(fingerprint)).transpose()
    }

    fn put(&self, entry: &CacheEntry) -> Result<PutOutcome, CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT status FROM http_cache WHERE fingerprint = ?1",
                params![entry.fingerprint.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;

        let outcome = match existing.as_deref() {
            Some("success") => PutOutcome::Kept,
            Some(_) => PutOutcome::Replaced,
            None => PutOutcome::Inserted,
        };

        if outcome != PutOutcome::Kept {
            tx.execute(
                "INSERT INTO http_cache
                     (fingerprint, payload, checksum, fetched_at_ms, status, attempts, error_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                     payload = excluded.payload,
                     checksum = excluded.checksum,
                     fetched_at_ms = excluded.fetched_at_ms,
                     status = excluded.status,
                     attempts = excluded.attempts,
                     error_kind = excluded.error_kind
                 WHERE http_cache.status = 'error'",
                params![
                    entry.fingerprint.as_str(),
                    entry.payload,
                    sha256_hex(&entry.payload),
                    entry.fetched_at,
                    entry.status.as_str(),
                    i64::from(entry.attempts),
                    entry.error_kind.map(|k| k.as_str()),
                ],
            )
            .map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        let label = match outcome {
            PutOutcome::Inserted => "inserted",
            PutOutcome::Replaced => "replaced",
            PutOutcome::Kept => "kept",
        };
        metrics::counter!("lens.cache.put_total", "outcome" => label).increment(1);
        Ok(outcome)
    }

    fn invalidate(&self, fingerprint: &RequestFingerprint) -> Result<bool, CacheError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM http_cache WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
            )
            .map_err(storage)?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<u64, CacheError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM http_cache", []).map_err(storage)?;
        Ok(removed as u64)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM http_cache GROUP BY status")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

        let mut stats = CacheStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match CacheStatus::parse(&status) {
                Some(CacheStatus::Success) => stats.successes += count,
                Some(CacheStatus::Error) => stats.errors += count,
                None => {}
            }
            stats.entries += count;
        }
        Ok(stats)
    }
}
