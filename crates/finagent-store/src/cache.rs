//! Response cache keyed by a fingerprint of query, scope tag and filters

use crate::{MetadataFilter, StoreError};
use chrono::{DateTime, Duration, Utc};
use finagent_telemetry::text::{percentage, round_to};
use finagent_telemetry::AgentKind;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_TTL_HOURS: u64 = 24;
const MAX_TTL_HOURS: i64 = 24 * 365 * 100;

const HITS: &str = "total_hits";
const MISSES: &str = "total_misses";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub total_hits: u64,
    pub total_misses: u64,
    /// Entry counts keyed by the responder that produced them
    pub by_agent_type: BTreeMap<String, usize>,
    pub ttl_hours: u64,
}

/// Cache key: SHA-256 over the normalised query, the scope tag and the
/// key-ordered filter JSON (omitted when there are no filters)
pub fn fingerprint(query: &str, agent_type: &str, filters: Option<&MetadataFilter>) -> String {
    let mut key = format!("{}|{}", query.trim().to_lowercase(), agent_type);
    if let Some(f) = filters.filter(|f| !f.is_empty()) {
        // BTreeMap serializes in key order
        let json = serde_json::to_string(f).unwrap_or_default();
        key.push('|');
        key.push_str(&json);
    }
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

pub struct ResponseCache {
    conn: Mutex<Connection>,
    ttl: Duration,
    ttl_hours: u64,
}

impl ResponseCache {
    /// Open the cache database, falling back to an empty in-memory cache when
    /// the file cannot be opened
    pub fn open(db_path: &Path, ttl_hours: u64) -> Result<Self, StoreError> {
        match Self::try_open(db_path, ttl_hours) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                tracing::warn!(
                    path = %db_path.display(),
                    "cache unavailable, using in-memory cache: {e}"
                );
                Self::in_memory(ttl_hours)
            }
        }
    }

    pub fn try_open(db_path: &Path, ttl_hours: u64) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let cache = Self::with_connection(conn, ttl_hours)?;

        let swept = cache.sweep_expired();
        tracing::debug!(swept, "response cache opened");
        Ok(cache)
    }

    pub fn in_memory(ttl_hours: u64) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, ttl_hours)
    }

    fn with_connection(conn: Connection, ttl_hours: u64) -> Result<Self, StoreError> {
        Self::init_schema(&conn)?;
        let hours = i64::try_from(ttl_hours)
            .unwrap_or(MAX_TTL_HOURS)
            .min(MAX_TTL_HOURS);
        Ok(Self {
            conn: Mutex::new(conn),
            ttl: Duration::hours(hours),
            ttl_hours,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS responses (
                fingerprint TEXT PRIMARY KEY,
                agent_type TEXT NOT NULL,
                origin TEXT,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                filters TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_created ON responses(created_at);
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO counters (name, value) VALUES ('total_hits', 0);
            INSERT OR IGNORE INTO counters (name, value) VALUES ('total_misses', 0);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ttl_hours(&self) -> u64 {
        self.ttl_hours
    }

    /// Fresh cached response, counting a hit or a miss
    pub fn get(
        &self,
        query: &str,
        agent_type: &str,
        filters: Option<&MetadataFilter>,
    ) -> Option<String> {
        self.get_at(query, agent_type, filters, Utc::now())
    }

    /// [`get`](Self::get) against an explicit clock
    pub fn get_at(
        &self,
        query: &str,
        agent_type: &str,
        filters: Option<&MetadataFilter>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let key = fingerprint(query, agent_type, filters);
        let conn = self.lock();

        let row = match lookup(&conn, &key) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("cache lookup failed: {e}");
                None
            }
        };

        match row {
            Some((response, created_at)) if self.is_fresh(created_at, now) => {
                bump(&conn, HITS);
                tracing::debug!(fingerprint = &key[..12], "cache hit");
                Some(response)
            }
            Some(_) => {
                if let Err(e) = conn.execute(
                    "DELETE FROM responses WHERE fingerprint = ?1",
                    params![key],
                ) {
                    tracing::warn!("failed to evict expired cache entry: {e}");
                }
                bump(&conn, MISSES);
                tracing::debug!(fingerprint = &key[..12], "cache entry expired");
                None
            }
            None => {
                bump(&conn, MISSES);
                None
            }
        }
    }

    /// Fresh cached response without touching counters or storage
    pub fn peek(
        &self,
        query: &str,
        agent_type: &str,
        filters: Option<&MetadataFilter>,
    ) -> Option<String> {
        let key = fingerprint(query, agent_type, filters);
        let conn = self.lock();
        match lookup(&conn, &key) {
            Ok(Some((response, created_at))) if self.is_fresh(created_at, Utc::now()) => {
                Some(response)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("cache peek failed: {e}");
                None
            }
        }
    }

    pub fn set(
        &self,
        query: &str,
        agent_type: &str,
        response: &str,
        filters: Option<&MetadataFilter>,
    ) {
        self.upsert(query, agent_type, None, response, filters, Utc::now());
    }

    /// [`set`](Self::set) against an explicit clock
    pub fn set_at(
        &self,
        query: &str,
        agent_type: &str,
        response: &str,
        filters: Option<&MetadataFilter>,
        now: DateTime<Utc>,
    ) {
        self.upsert(query, agent_type, None, response, filters, now);
    }

    /// Store a response and remember which responder produced it
    pub fn set_routed(
        &self,
        query: &str,
        agent_type: &str,
        origin: AgentKind,
        response: &str,
        filters: Option<&MetadataFilter>,
    ) {
        self.upsert(query, agent_type, Some(origin), response, filters, Utc::now());
    }

    fn upsert(
        &self,
        query: &str,
        agent_type: &str,
        origin: Option<AgentKind>,
        response: &str,
        filters: Option<&MetadataFilter>,
        now: DateTime<Utc>,
    ) {
        let key = fingerprint(query, agent_type, filters);
        let filters_json = match filters {
            Some(f) => serde_json::to_string(f).unwrap_or_else(|_| "{}".to_string()),
            None => "{}".to_string(),
        };

        let conn = self.lock();
        let result = conn.execute(
            "INSERT INTO responses (fingerprint, agent_type, origin, query, response, filters, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(fingerprint) DO UPDATE SET
                agent_type = excluded.agent_type,
                origin = excluded.origin,
                query = excluded.query,
                response = excluded.response,
                filters = excluded.filters,
                created_at = excluded.created_at",
            params![
                key,
                agent_type,
                origin.map(|o| o.as_str()),
                query,
                response,
                filters_json,
                now.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => tracing::debug!(fingerprint = &key[..12], agent_type, "cached response"),
            Err(e) => tracing::warn!("failed to write cache entry: {e}"),
        }
    }

    /// Delete every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = match now.checked_sub_signed(self.ttl) {
            Some(t) => t.timestamp_millis(),
            None => return 0,
        };
        let conn = self.lock();
        match conn.execute("DELETE FROM responses WHERE created_at < ?1", params![cutoff]) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "swept expired cache entries");
                }
                removed
            }
            Err(e) => {
                tracing::warn!("cache sweep failed: {e}");
                0
            }
        }
    }

    /// Drop every entry; hit and miss counters are kept
    pub fn clear(&self) -> usize {
        let conn = self.lock();
        match conn.execute("DELETE FROM responses", []) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("failed to clear cache: {e}");
                0
            }
        }
    }

    /// Entry counts cover fresh entries only; expired rows awaiting a sweep are excluded
    pub fn get_stats(&self) -> CacheStats {
        self.get_stats_at(Utc::now())
    }

    pub fn get_stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let cutoff = now
            .checked_sub_signed(self.ttl)
            .map_or(i64::MIN, |t| t.timestamp_millis());
        let conn = self.lock();
        match read_stats(&conn, cutoff) {
            Ok((total_entries, total_hits, total_misses, by_agent_type)) => {
                let lookups = usize::try_from(total_hits + total_misses).unwrap_or(usize::MAX);
                let hits = usize::try_from(total_hits).unwrap_or(usize::MAX);
                let misses = usize::try_from(total_misses).unwrap_or(usize::MAX);
                CacheStats {
                    total_entries,
                    hit_rate: round_to(percentage(hits, lookups), 2),
                    miss_rate: round_to(percentage(misses, lookups), 2),
                    total_hits,
                    total_misses,
                    by_agent_type,
                    ttl_hours: self.ttl_hours,
                }
            }
            Err(e) => {
                tracing::warn!("failed to read cache stats: {e}");
                CacheStats {
                    ttl_hours: self.ttl_hours,
                    ..CacheStats::default()
                }
            }
        }
    }

    fn is_fresh(&self, created_at_ms: i64, now: DateTime<Utc>) -> bool {
        match DateTime::<Utc>::from_timestamp_millis(created_at_ms) {
            Some(created) => now - created <= self.ttl,
            None => false,
        }
    }
}

fn lookup(conn: &Connection, key: &str) -> Result<Option<(String, i64)>, rusqlite::Error> {
    conn.query_row(
        "SELECT response, created_at FROM responses WHERE fingerprint = ?1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

fn bump(conn: &Connection, counter: &str) {
    if let Err(e) = conn.execute(
        "UPDATE counters SET value = value + 1 WHERE name = ?1",
        params![counter],
    ) {
        tracing::warn!(counter, "failed to update cache counter: {e}");
    }
}

fn read_counter(conn: &Connection, counter: &str) -> Result<u64, rusqlite::Error> {
    let value: i64 = conn
        .query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![counter],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(u64::try_from(value).unwrap_or(0))
}

type StatsRow = (usize, u64, u64, BTreeMap<String, usize>);

fn read_stats(conn: &Connection, cutoff_ms: i64) -> Result<StatsRow, rusqlite::Error> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE created_at >= ?1",
        params![cutoff_ms],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT COALESCE(origin, agent_type), COUNT(*) FROM responses
         WHERE created_at >= ?1
         GROUP BY COALESCE(origin, agent_type)",
    )?;
    let rows = stmt.query_map(params![cutoff_ms], |row| {
        let label: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((label, usize::try_from(count).unwrap_or(0)))
    })?;
    let by_agent_type = rows.collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok((
        usize::try_from(total).unwrap_or(0),
        read_counter(conn, HITS)?,
        read_counter(conn, MISSES)?,
        by_agent_type,
    ))
}
