use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::OptionalExtension;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::StoreError;

/// Key-value counter backend for the rate limiter.
///
/// Counters expire on their own once their TTL elapses; there is no delete.
/// Implementations must be thread-safe (`Send + Sync`). No atomicity across
/// a `get` followed by a `put_with_ttl` is assumed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u32>, StoreError>;

    /// Set the counter and (re)start its TTL.
    async fn put_with_ttl(&self, key: &str, count: u32, ttl: Duration) -> Result<(), StoreError>;

    /// Drop expired counters. Returns the number removed.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    expires_at: Instant,
}

/// In-process counters backed by DashMap. Lost on restart.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored counters, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let now = Instant::now();
        // Copy out before touching the map again; holding a ref across remove_if deadlocks.
        let entry = self.counters.get(key).map(|c| *c);
        match entry {
            Some(c) if c.expires_at > now => Ok(Some(c.count)),
            Some(_) => {
                self.counters.remove_if(key, |_, c| c.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_with_ttl(&self, key: &str, count: u32, ttl: Duration) -> Result<(), StoreError> {
        self.counters.insert(
            key.to_string(),
            Counter {
                count,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.expires_at > now);
        Ok(before.saturating_sub(self.counters.len()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Counters persisted in SQLite. Survives restarts and can be shared by
/// several processes on one host.
pub struct SqliteCounterStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteCounterStore {
    /// Open (or create) the counter database at `path`.
    ///
    /// On Unix the file is restricted to 0600 since it maps client addresses
    /// to activity.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                return Err(StoreError::Unavailable(format!(
                    "directory {} does not exist",
                    dir.display()
                )));
            }
        }

        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_counters (
                key TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rate_counters_expires_at ON rate_counters(expires_at);
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set counter database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("counter store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn unix_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let count: Option<i64> = self
            .conn()
            .query_row(
                "SELECT count FROM rate_counters WHERE key = ?1 AND expires_at > ?2",
                rusqlite::params![key, unix_now_ms()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|c| u32::try_from(c).unwrap_or(u32::MAX)))
    }

    async fn put_with_ttl(&self, key: &str, count: u32, ttl: Duration) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = unix_now_ms().saturating_add(ttl_ms);
        self.conn().execute(
            "INSERT INTO rate_counters (key, count, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET count = excluded.count, expires_at = excluded.expires_at",
            rusqlite::params![key, i64::from(count), expires_at],
        )?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM rate_counters WHERE expires_at <= ?1",
            rusqlite::params![unix_now_ms()],
        )?;
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
