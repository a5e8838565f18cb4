//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{CachedResponse, RequestKey};
use crate::net::Response;

/// Trait for named-cache storage backends.
///
/// A backend holds any number of named caches, each mapping a request key
/// to a response snapshot. Writes to the same key are last-write-wins.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the named cache if it does not exist yet.
  fn create_cache(&self, cache_name: &str) -> Result<()>;

  /// All cache names, in creation order.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a cache and every entry in it. Returns false if it did not exist.
  fn delete(&self, cache_name: &str) -> Result<bool>;

  /// Look up a request in one named cache.
  fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Look up a request across all caches, oldest cache first.
  fn get_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store a response, creating the cache if needed.
  fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several responses atomically: either all land or none do.
  fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Request keys stored in a cache.
  fn entry_keys(&self, cache_name: &str) -> Result<Vec<RequestKey>>;
}

impl<T: CacheStorage> CacheStorage for Arc<T> {
  fn create_cache(&self, cache_name: &str) -> Result<()> {
    (**self).create_cache(cache_name)
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    (**self).cache_names()
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    (**self).delete(cache_name)
  }

  fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    (**self).get(cache_name, key)
  }

  fn get_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    (**self).get_any(key)
  }

  fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    (**self).put(cache_name, key, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    (**self).put_all(cache_name, entries)
  }

  fn entry_keys(&self, cache_name: &str) -> Result<Vec<RequestKey>> {
    (**self).entry_keys(cache_name)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as this value.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("quiz-sw").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named caches, id order is creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request hash
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_id INTEGER NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_id, key_hash),
    FOREIGN KEY (cache_id) REFERENCES caches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_hash ON cache_entries(key_hash);
"#;

const SELECT_ENTRY: &str = "SELECT c.name, e.status, e.status_text, e.headers, e.body, e.cached_at
   FROM cache_entries e
   INNER JOIN caches c ON c.id = e.cache_id";

/// Raw entry columns, decoded outside the rusqlite row closure.
type EntryRow = (String, u16, String, String, Vec<u8>, String);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_entry(row: EntryRow) -> Result<CachedResponse> {
  let (cache_name, status, status_text, headers, body, cached_at) = row;
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

  Ok(CachedResponse {
    cache_name,
    response: Response {
      status,
      status_text,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

/// Insert the cache row if missing and return its id.
fn ensure_cache(conn: &Connection, cache_name: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to create cache {}: {}", cache_name, e))?;

  conn
    .query_row(
      "SELECT id FROM caches WHERE name = ?",
      params![cache_name],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up cache {}: {}", cache_name, e))
}

fn insert_entry(
  conn: &Connection,
  cache_id: i64,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_id, key_hash, method, url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_id,
        key.cache_hash(),
        key.method,
        key.url,
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {} {}: {}", key.method, key.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn create_cache(&self, cache_name: &str) -> Result<()> {
    let conn = self.conn()?;
    ensure_cache(&conn, cache_name)?;
    Ok(())
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let conn = self.conn()?;
    let deleted = conn
      .execute("DELETE FROM caches WHERE name = ?", params![cache_name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    Ok(deleted > 0)
  }

  fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let sql = format!("{} WHERE c.name = ? AND e.key_hash = ?", SELECT_ENTRY);

    let row = conn
      .query_row(&sql, params![cache_name, key.cache_hash()], read_entry_row)
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key.url, cache_name, e))?;

    row.map(decode_entry).transpose()
  }

  fn get_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let sql = format!("{} WHERE e.key_hash = ? ORDER BY c.id LIMIT 1", SELECT_ENTRY);

    let row = conn
      .query_row(&sql, params![key.cache_hash()], read_entry_row)
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key.url, e))?;

    row.map(decode_entry).transpose()
  }

  fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.conn()?;
    let cache_id = ensure_cache(&conn, cache_name)?;
    insert_entry(&conn, cache_id, key, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let cache_id = ensure_cache(&tx, cache_name)?;
    for (key, response) in entries {
      insert_entry(&tx, cache_id, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_keys(&self, cache_name: &str) -> Result<Vec<RequestKey>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT e.method, e.url FROM cache_entries e
         INNER JOIN caches c ON c.id = e.cache_id
         WHERE c.name = ?
         ORDER BY e.url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![cache_name], |row| {
        let method: String = row.get(0)?;
        let url: String = row.get(1)?;
        Ok(RequestKey::new(&method, url))
      })
      .map_err(|e| eyre!("Failed to list entries of {}: {}", cache_name, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry key: {}", e))?;

    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
