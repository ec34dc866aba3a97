//! Persisted watermark and dedup state
//!
//! Sqlite-backed: a single-row watermark table and a `mirrored` set of
//! (source, telescope, instrument) triples already created remotely. Each
//! write is its own transaction, so a crash between "folder created" and
//! "state persisted" at worst re-runs idempotent folder creation on the
//! next start.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use skymirror_common::{time, Error, Result};

use crate::source::TelescopeInstrument;

/// Dedup key: (source id, telescope, instrument)
pub type DedupKey = (String, String, String);

/// State reconstructed at startup
#[derive(Debug, Default)]
pub struct PersistedState {
    /// Everything saved at or before this instant has been considered
    pub watermark: Option<DateTime<Utc>>,
    /// Triples already mirrored, within the retention window
    pub mirrored: HashSet<DedupKey>,
}

/// Sqlite-backed state store; exactly one writer (the polling loop)
#[derive(Debug)]
pub struct StateStore {
    db: SqlitePool,
}

impl StateStore {
    /// Open (or create) the state database at `path`.
    ///
    /// An existing file that cannot be opened or read is corruption, which
    /// is fatal: silently resetting would cause mass reprocessing or mass
    /// skip.
    pub async fn open(path: &Path) -> Result<Self> {
        let existed = path.exists();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| {
                if existed {
                    Error::StateCorrupt(format!("cannot open {}: {}", path.display(), e))
                } else {
                    Error::Database(e)
                }
            })?;

        let store = Self { db: pool };
        store.init_schema(existed).await?;

        if existed {
            info!("Opened existing state database: {}", path.display());
        } else {
            info!("Initialized new state database: {}", path.display());
        }
        Ok(store)
    }

    /// In-memory store, for tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { db: pool };
        store.init_schema(false).await?;
        Ok(store)
    }

    async fn init_schema(&self, existed: bool) -> Result<()> {
        // WAL keeps the single writer from blocking on its own reads
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.db)
            .await
            .map_err(|e| classify(existed, e))?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.db)
            .await
            .map_err(|e| classify(existed, e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watermark (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                saved_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| classify(existed, e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mirrored (
                source_id TEXT NOT NULL,
                telescope TEXT NOT NULL,
                instrument TEXT NOT NULL,
                saved_at_ms INTEGER NOT NULL,
                PRIMARY KEY (source_id, telescope, instrument)
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| classify(existed, e))?;

        Ok(())
    }

    /// Seed the watermark with the configured start time; a persisted
    /// watermark from a previous run wins
    pub async fn init_watermark(&self, start: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO watermark (id, saved_at_ms) VALUES (1, ?) ON CONFLICT (id) DO NOTHING",
        )
        .bind(time::to_millis(start))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Reconstruct watermark and dedup set at startup
    pub async fn load(&self) -> Result<PersistedState> {
        let watermark_row = sqlx::query("SELECT saved_at_ms FROM watermark WHERE id = 1")
            .fetch_optional(&self.db)
            .await?;

        let watermark = match watermark_row {
            Some(row) => {
                let ms: i64 = row
                    .try_get("saved_at_ms")
                    .map_err(|e| Error::StateCorrupt(format!("watermark row: {}", e)))?;
                Some(time::from_millis(ms).ok_or_else(|| {
                    Error::StateCorrupt(format!("watermark out of range: {}", ms))
                })?)
            }
            None => None,
        };

        let rows = sqlx::query("SELECT source_id, telescope, instrument FROM mirrored")
            .fetch_all(&self.db)
            .await?;

        let mut mirrored = HashSet::with_capacity(rows.len());
        for row in rows {
            let key: DedupKey = (
                row.try_get("source_id")
                    .map_err(|e| Error::StateCorrupt(format!("mirrored row: {}", e)))?,
                row.try_get("telescope")
                    .map_err(|e| Error::StateCorrupt(format!("mirrored row: {}", e)))?,
                row.try_get("instrument")
                    .map_err(|e| Error::StateCorrupt(format!("mirrored row: {}", e)))?,
            );
            mirrored.insert(key);
        }

        Ok(PersistedState { watermark, mirrored })
    }

    /// Advance the watermark; moves forward only (a stale value is a no-op)
    pub async fn advance_watermark(&self, to: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE watermark SET saved_at_ms = ?1 WHERE id = 1 AND saved_at_ms < ?1")
            .bind(time::to_millis(to))
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Current persisted watermark
    pub async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT saved_at_ms FROM watermark WHERE id = 1")
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => {
                let ms: i64 = row.try_get("saved_at_ms")?;
                Ok(time::from_millis(ms))
            }
            None => Ok(None),
        }
    }

    /// Record one successfully mirrored triple
    pub async fn record_mirrored(
        &self,
        source_id: &str,
        pair: &TelescopeInstrument,
        saved_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mirrored (source_id, telescope, instrument, saved_at_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (source_id, telescope, instrument) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(&pair.telescope)
        .bind(pair.instrument_key())
        .bind(time::to_millis(saved_at))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Drop dedup entries saved before `older_than`.
    ///
    /// Sources are only ever fetched after the watermark, so entries older
    /// than the retention window can no longer be re-delivered.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM mirrored WHERE saved_at_ms < ?")
            .bind(time::to_millis(older_than))
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

fn classify(existed: bool, e: sqlx::Error) -> Error {
    if existed {
        Error::StateCorrupt(format!("cannot read persisted state: {}", e))
    } else {
        Error::Database(e)
    }
}
