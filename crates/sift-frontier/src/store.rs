use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::normalize::normalize;

/// One row of the frontier, keyed by its normalized URL.
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub url: String,
    pub normalized_url: String,
    pub source_url: Option<String>,
    pub depth: u32,
    pub status: UrlStatus,
    pub lease_owner: Option<String>,
    pub lease_expires_at_ms: Option<i64>,
    pub retry_count: u32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UrlStatus {
    Pending,
    Leased,
    Success,
    Failed,
}

impl UrlStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Leased => "leased",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "leased" => Ok(Self::Leased),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(rusqlite::Error::InvalidQuery),
        }
    }
}

/// How `claim_batch` picks among eligible rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ArgEnum))]
pub enum SelectionMode {
    /// Shallowest first, then insertion order.
    Deterministic,
    /// Uniform sample among eligible rows, to avoid a predictable
    /// crawl pattern.
    Randomized,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierStats {
    pub pending: u64,
    pub leased: u64,
    pub success: u64,
    pub failed: u64,
    pub total: u64,
}

/// Persistent frontier of known URLs with atomic claim/release.
///
/// All mutations go through single transactions on one connection, so a
/// record's transitions are totally ordered and two claimers can never
/// both win the same row.
#[derive(Debug)]
pub struct FrontierStore {
    conn: Mutex<Connection>,
    max_retries: u32,
}

impl FrontierStore {
    pub fn open(path: impl AsRef<Path>, max_retries: u32) -> Result<Self, FrontierError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            max_retries,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), FrontierError> {
        self.conn().execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;

            CREATE TABLE IF NOT EXISTS urls (
              id INTEGER PRIMARY KEY,
              url TEXT NOT NULL,
              normalized_url TEXT NOT NULL UNIQUE,
              source_url TEXT,
              depth INTEGER NOT NULL DEFAULT 0,
              status TEXT NOT NULL DEFAULT 'pending',
              lease_owner TEXT,
              lease_expires_at_ms INTEGER,
              retry_count INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_urls_claim
              ON urls(status, lease_expires_at_ms);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `url` as `pending` unless its normalized form is already
    /// known. Returns whether a new record was created.
    pub fn insert(
        &self,
        url: &str,
        source_url: Option<&str>,
        depth: u32,
    ) -> Result<bool, FrontierError> {
        let normalized = normalize(url)?;
        let now = now_ms();
        let changed = self.conn().execute(
            "INSERT INTO urls (url, normalized_url, source_url, depth, status, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
             ON CONFLICT(normalized_url) DO NOTHING",
            params![url, normalized, source_url, depth, now],
        )?;
        Ok(changed > 0)
    }

    /// Atomically leases up to `limit` eligible rows (pending, or leased
    /// past their deadline) to `worker_id`.
    ///
    /// The returned batch may be smaller than `limit`; callers must not
    /// assume otherwise. Each row flips through a conditional UPDATE that
    /// re-checks eligibility, so concurrent claimers never share a row.
    pub fn claim_batch(
        &self,
        worker_id: &str,
        limit: usize,
        lease_duration: Duration,
        selection: SelectionMode,
    ) -> Result<Vec<UrlRecord>, FrontierError> {
        let mut conn = self.conn();
        // Immediate: these transactions read then write, and a deferred
        // read-to-write upgrade can hit SQLITE_BUSY that busy_timeout
        // does not retry when another process holds the write lock.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();
        let expires = now + lease_duration.as_millis() as i64;

        let order = match selection {
            SelectionMode::Deterministic => "depth ASC, created_at_ms ASC, id ASC",
            SelectionMode::Randomized => "RANDOM()",
        };
        let candidates: Vec<i64> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT id FROM urls
                 WHERE status = 'pending'
                    OR (status = 'leased' AND lease_expires_at_ms < ?1)
                 ORDER BY {order} LIMIT ?2"
            ))?;
            let ids = stmt.query_map(params![now, limit as i64], |row| row.get(0))?;
            ids.collect::<rusqlite::Result<_>>()?
        };

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let changed = tx.execute(
                "UPDATE urls
                 SET status = 'leased', lease_owner = ?1,
                     lease_expires_at_ms = ?2, updated_at_ms = ?3
                 WHERE id = ?4
                   AND (status = 'pending'
                        OR (status = 'leased' AND lease_expires_at_ms < ?3))",
                params![worker_id, expires, now, id],
            )?;
            if changed == 1 {
                if let Some(record) = fetch_by_id(&tx, id)? {
                    claimed.push(record);
                }
            }
        }
        tx.commit()?;
        Ok(claimed)
    }

    /// Transitions a leased record to terminal `success`.
    pub fn mark_success(&self, normalized_url: &str, owner: &str) -> Result<(), FrontierError> {
        self.finish_lease(normalized_url, owner, |tx, now, _| {
            tx.execute(
                "UPDATE urls SET status = 'success', lease_owner = NULL,
                     lease_expires_at_ms = NULL, updated_at_ms = ?1
                 WHERE normalized_url = ?2",
                params![now, normalized_url],
            )?;
            Ok(())
        })
    }

    /// Records a failure: back to `pending` while under the retry
    /// ceiling, terminal `failed` once `retry_count` exceeds it.
    pub fn mark_failure(&self, normalized_url: &str, owner: &str) -> Result<(), FrontierError> {
        let max_retries = self.max_retries;
        self.finish_lease(normalized_url, owner, |tx, now, retry_count| {
            let retries = retry_count + 1;
            let status = if retries > max_retries {
                UrlStatus::Failed
            } else {
                UrlStatus::Pending
            };
            tx.execute(
                "UPDATE urls SET status = ?1, retry_count = ?2, lease_owner = NULL,
                     lease_expires_at_ms = NULL, updated_at_ms = ?3
                 WHERE normalized_url = ?4",
                params![status.as_str(), retries, now, normalized_url],
            )?;
            Ok(())
        })
    }

    /// Returns a leased record to `pending` without counting a retry.
    /// Used when processing was deferred for capacity reasons rather
    /// than failing.
    pub fn release(&self, normalized_url: &str, owner: &str) -> Result<(), FrontierError> {
        self.finish_lease(normalized_url, owner, |tx, now, _| {
            tx.execute(
                "UPDATE urls SET status = 'pending', lease_owner = NULL,
                     lease_expires_at_ms = NULL, updated_at_ms = ?1
                 WHERE normalized_url = ?2",
                params![now, normalized_url],
            )?;
            Ok(())
        })
    }

    fn finish_lease<F>(&self, normalized_url: &str, owner: &str, apply: F) -> Result<(), FrontierError>
    where
        F: FnOnce(&Transaction, i64, u32) -> Result<(), FrontierError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row: Option<(String, Option<String>, u32)> = tx
            .query_row(
                "SELECT status, lease_owner, retry_count FROM urls WHERE normalized_url = ?1",
                params![normalized_url],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (status, lease_owner, retry_count) = match row {
            Some(row) => row,
            None => return Err(FrontierError::UnknownUrl(normalized_url.to_string())),
        };
        if status != "leased" {
            return Err(FrontierError::NotLeased(normalized_url.to_string()));
        }
        if lease_owner.as_deref() != Some(owner) {
            log::warn!(
                "lease owner mismatch on {normalized_url}: held by {}, finished by {owner}",
                lease_owner.as_deref().unwrap_or("nobody"),
            );
        }

        apply(&tx, now_ms(), retry_count)?;
        tx.commit()?;
        Ok(())
    }

    /// Resets leases whose deadline passed back to `pending`, leaving
    /// `retry_count` untouched: expiry signals a crashed or slow worker,
    /// not a content failure. Returns how many rows were reclaimed.
    pub fn reclaim_expired_leases(&self) -> Result<usize, FrontierError> {
        let now = now_ms();
        let changed = self.conn().execute(
            "UPDATE urls SET status = 'pending', lease_owner = NULL,
                 lease_expires_at_ms = NULL, updated_at_ms = ?1
             WHERE status = 'leased' AND lease_expires_at_ms < ?1",
            params![now],
        )?;
        Ok(changed)
    }

    pub fn stats(&self) -> Result<FrontierStats, FrontierError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM urls GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;

        let mut stats = FrontierStats::default();
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "leased" => stats.leased = count,
                "success" => stats.success = count,
                "failed" => stats.failed = count,
                _ => (),
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Looks up a record by its normalized URL.
    pub fn get(&self, normalized_url: &str) -> Result<Option<UrlRecord>, FrontierError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT url, normalized_url, source_url, depth, status, lease_owner,
                        lease_expires_at_ms, retry_count, created_at_ms, updated_at_ms
                 FROM urls WHERE normalized_url = ?1",
                params![normalized_url],
                map_record,
            )
            .optional()?;
        Ok(record)
    }
}

fn fetch_by_id(tx: &Transaction, id: i64) -> Result<Option<UrlRecord>, FrontierError> {
    let record = tx
        .query_row(
            "SELECT url, normalized_url, source_url, depth, status, lease_owner,
                    lease_expires_at_ms, retry_count, created_at_ms, updated_at_ms
             FROM urls WHERE id = ?1",
            params![id],
            map_record,
        )
        .optional()?;
    Ok(record)
}

fn map_record(row: &rusqlite::Row) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        url: row.get(0)?,
        normalized_url: row.get(1)?,
        source_url: row.get(2)?,
        depth: row.get(3)?,
        status: UrlStatus::parse(&row.get::<_, String>(4)?)?,
        lease_owner: row.get(5)?,
        lease_expires_at_ms: row.get(6)?,
        retry_count: row.get(7)?,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
    })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
