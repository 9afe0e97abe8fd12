//! SQLite-backed persistence for subscriptions, rate-limit counters and the
//! failure log. One file holds all three stores; survives restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use subtrack_core::{AuditStore, CounterStore, Result, SubTrackError, Subscription, SubscriptionStore};

/// SQLite store implementing every collaborator store trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> SubTrackError + '_ {
    move |e| SubTrackError::store(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open or create the database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::debug!("🗄️ Opened store at {}", path.display());
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SubTrackError::store("database lock poisoned"))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Subscription documents (camelCase JSON)
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                is_active INTEGER NOT NULL DEFAULT 1,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Rate-limit counters, expires_at in epoch seconds
            CREATE TABLE IF NOT EXISTS counters (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            -- Failure log entries and index
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err("Migration"))
    }

    /// Every subscription, inactive ones included, ordered by id.
    pub fn list_all(&self) -> Result<Vec<Subscription>> {
        self.load_where("SELECT id, data FROM subscriptions ORDER BY id")
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM subscriptions WHERE id = ?1", [id])
            .map_err(db_err("Delete subscription"))?;
        Ok(n > 0)
    }

    /// Drop counters whose window has closed. Returns how many were removed.
    pub fn purge_expired_counters(&self) -> Result<usize> {
        self.conn()?
            .execute(
                "DELETE FROM counters WHERE expires_at <= ?1",
                [Utc::now().timestamp()],
            )
            .map_err(db_err("Purge counters"))
    }

    fn load_where(&self, sql: &str) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err("Load subscriptions"))?;

        let mut subs = Vec::new();
        for row in rows {
            let (id, data) = row.map_err(db_err("Read row"))?;
            match serde_json::from_str::<Subscription>(&data) {
                Ok(sub) => subs.push(sub),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable subscription '{id}': {e}"),
            }
        }
        Ok(subs)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn list_active(&self) -> Result<Vec<Subscription>> {
        self.load_where("SELECT id, data FROM subscriptions WHERE is_active = 1 ORDER BY id")
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        let data: Option<String> = self
            .conn()?
            .query_row("SELECT data FROM subscriptions WHERE id = ?1", [id], |r| r.get(0))
            .optional()
            .map_err(db_err("Get subscription"))?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    async fn put(&self, id: &str, subscription: &Subscription) -> Result<()> {
        let data = serde_json::to_string(subscription)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO subscriptions (id, is_active, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, subscription.is_active as i32, data, Utc::now().to_rfc3339()],
            )
            .map_err(db_err("Save subscription"))?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT value FROM counters WHERE key = ?1 AND expires_at > ?2",
                params![key, Utc::now().timestamp()],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err("Get counter"))
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl);
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO counters (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .map_err(db_err("Save counter"))?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |r| r.get(0))
            .optional()
            .map_err(db_err("Get entry"))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err("Save entry"))?;
        Ok(())
    }
}
