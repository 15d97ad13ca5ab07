//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::store::{now_rfc3339, ApiKeyRecord, AssetNameRecord, MetadataStore};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        // journal_mode returns a row, so it cannot go through execute_batch
        // on every SQLite build.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// This is idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            -- Logical asset key -> current public URL
            CREATE TABLE IF NOT EXISTS layout_assets (
                key         TEXT PRIMARY KEY,
                public_url  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            -- Issued API keys
            CREATE TABLE IF NOT EXISTS api_keys (
                apikey      TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_api_keys_name
                ON api_keys(name);
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, now_rfc3339()],
            )?;
        }

        Ok(())
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn upsert_asset_name(
        &self,
        record: AssetNameRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO layout_assets (key, public_url, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    public_url = excluded.public_url,
                    updated_at = excluded.updated_at",
                params![record.key, record.public_url, record.updated_at],
            )?;
            Ok(())
        })
    }

    fn get_asset_name(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<AssetNameRecord>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let record = conn
                .query_row(
                    "SELECT key, public_url, updated_at FROM layout_assets WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok(AssetNameRecord {
                            key: row.get(0)?,
                            public_url: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
    }

    fn count_asset_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM layout_assets", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn insert_api_key(
        &self,
        record: ApiKeyRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO api_keys (apikey, name, created_at) VALUES (?1, ?2, ?3)",
                params![record.apikey, record.name, record.created_at],
            )?;
            Ok(())
        })
    }

    fn get_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ApiKeyRecord>>> + Send + '_>> {
        let apikey = apikey.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let record = conn
                .query_row(
                    "SELECT name, apikey, created_at FROM api_keys WHERE apikey = ?1",
                    params![apikey],
                    |row| {
                        Ok(ApiKeyRecord {
                            name: row.get(0)?,
                            apikey: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
    }

    fn delete_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let apikey = apikey.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let removed = conn.execute("DELETE FROM api_keys WHERE apikey = ?1", params![apikey])?;
            Ok(removed > 0)
        })
    }
}
