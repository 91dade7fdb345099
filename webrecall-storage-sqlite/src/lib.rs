#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

//! # webrecall SQLite storage
//!
//! The storage engine behind webrecall: one SQLite database holding content
//! rows, a chunk sibling table, and a `sqlite-vec` vec0 virtual table for
//! embeddings, plus the RAM/disk differential sync machinery.
//!
//! Two modes:
//!
//! - **Direct**: a single connection to the disk file. Simple and durable,
//!   every write pays disk latency.
//! - **Memory**: the working set lives in `:memory:`, snapshotted from the
//!   disk file at startup. Triggers record every regular-table change in a
//!   `sync_tracker` table; vector writes are tracked explicitly because
//!   virtual tables cannot carry triggers. A [`sync::SyncManager`] drains
//!   the tracker to the disk mirror on idle and periodic timers.
//!
//! The engine is the sole owner of the connection; nothing else opens the
//! database file while it lives.

pub mod schema;
pub mod store;
pub mod sync;


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_rusqlite::Connection;
use tracing::info;

use webrecall_core::blocklist::DEFAULT_PATTERNS;
use webrecall_core::error::{Error, Result};

pub use sync::{SyncConfig, SyncManager};

/// Register sqlite-vec as an auto extension so every new connection
/// (including attached databases) can create and query vec0 tables.
fn register_sqlite_vec() -> Result<()> {
    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<std::result::Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let outcome = unsafe {
            use std::os::raw::c_char;

            type ExtensionInit = unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: ExtensionInit =
                std::mem::transmute::<unsafe extern "C" fn(), ExtensionInit>(init);
            let rc = rusqlite::ffi::sqlite3_auto_extension(Some(init_fn));
            if rc == rusqlite::ffi::SQLITE_OK {
                Ok(())
            } else {
                Err(format!("sqlite3_auto_extension returned {rc}"))
            }
        };
        *INIT_RESULT.lock() = Some(outcome);
    });

    match INIT_RESULT.lock().as_ref() {
        Some(Ok(())) => Ok(()),
        Some(Err(message)) => Err(Error::Storage(format!(
            "failed to register sqlite-vec: {message}"
        ))),
        None => Err(Error::Storage(
            "sqlite-vec registration did not run".to_string(),
        )),
    }
}

/// Serialize an embedding to the little-endian float32 blob vec0 expects.
pub(crate) fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Map a database-layer failure onto the shared error taxonomy, keeping
/// busy/locked distinct so writes can retry.
pub(crate) fn db_err(err: tokio_rusqlite::Error) -> Error {
    match &err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
            match failure.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    Error::Contention(err.to_string())
                }
                _ => Error::Storage(err.to_string()),
            }
        }
        _ => Error::Storage(err.to_string()),
    }
}

/// Monotonic write clock shared between the engine and the sync manager.
///
/// `touch` runs after every tracked write; the idle monitor compares the
/// timestamp against its 5 s threshold and the `idle_sync_done` flag keeps
/// a steady-idle store from re-syncing every tick.
#[derive(Debug)]
pub struct WriteClock {
    last_write: Mutex<Instant>,
    idle_sync_done: AtomicBool,
}

impl WriteClock {
    fn new() -> Self {
        WriteClock {
            last_write: Mutex::new(Instant::now()),
            idle_sync_done: AtomicBool::new(true),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_write.lock() = Instant::now();
        self.idle_sync_done.store(false, Ordering::SeqCst);
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_write.lock().elapsed()
    }

    pub(crate) fn idle_sync_done(&self) -> bool {
        self.idle_sync_done.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_idle_sync_done(&self) {
        self.idle_sync_done.store(true, Ordering::SeqCst);
    }
}

/// Storage mode selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// One connection straight to the disk file.
    Direct,
    /// RAM working set with a disk mirror kept fresh by differential sync.
    Memory,
}

/// The SQLite storage engine.
pub struct SqliteStorage {
    conn: Connection,
    mode: StorageMode,
    disk_path: PathBuf,
    clock: Arc<WriteClock>,
    sync: Option<Arc<SyncManager>>,
}

impl SqliteStorage {
    /// Open in direct mode: schema is created on the file and writes go
    /// straight to disk.
    pub async fn open_direct(path: impl AsRef<Path>) -> Result<Self> {
        register_sqlite_vec()?;
        let disk_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&disk_path)
            .await
            .map_err(db_err)?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
            for ddl in schema::full_schema("main") {
                conn.execute_batch(&ddl)?;
            }
            seed_blocklist(conn)?;
            Ok(())
        })
        .await
        .map_err(db_err)?;

        info!(path = %disk_path.display(), "opened storage in direct mode");
        Ok(SqliteStorage {
            conn,
            mode: StorageMode::Direct,
            disk_path,
            clock: Arc::new(WriteClock::new()),
            sync: None,
        })
    }

    /// Open in memory mode: snapshot the disk file into `:memory:`, install
    /// the tracker table and triggers, and start the sync monitors.
    pub async fn open_memory(disk_path: impl AsRef<Path>, config: SyncConfig) -> Result<Self> {
        register_sqlite_vec()?;
        let disk_path = disk_path.as_ref().to_path_buf();
        let conn = Connection::open(":memory:").await.map_err(db_err)?;

        let attach_path = disk_path.to_string_lossy().into_owned();
        conn.call(move |conn| {
            // Build the RAM schema, then mirror-initialize from disk under a
            // scoped attach. The disk side gets its schema on first boot.
            for ddl in schema::full_schema("main") {
                conn.execute_batch(&ddl)?;
            }
            conn.execute("ATTACH DATABASE ?1 AS disk", rusqlite::params![attach_path])?;
            let snapshot = (|| -> rusqlite::Result<()> {
                for ddl in schema::full_schema("disk") {
                    conn.execute_batch(&ddl)?;
                }
                for (table, _) in schema::TRACKED_TABLES {
                    conn.execute_batch(&format!(
                        "INSERT INTO main.{table} SELECT * FROM disk.{table}"
                    ))?;
                }
                conn.execute_batch(
                    "INSERT INTO main.content_vectors(rowid, embedding)
                     SELECT rowid, embedding FROM disk.content_vectors",
                )?;
                Ok(())
            })();
            let detach = conn.execute_batch("DETACH DATABASE disk");
            snapshot?;
            detach?;

            // Change tracking goes in only after the snapshot so the bulk
            // copy itself is not recorded as pending changes.
            conn.execute_batch(schema::CREATE_SYNC_TRACKER)?;
            for trigger in schema::tracker_triggers() {
                conn.execute_batch(&trigger)?;
            }
            seed_blocklist(conn)?;
            Ok(())
        })
        .await
        .map_err(db_err)?;

        let clock = Arc::new(WriteClock::new());
        let sync = SyncManager::start(conn.clone(), disk_path.clone(), Arc::clone(&clock), config);

        info!(mirror = %disk_path.display(), "opened storage in memory mode");
        Ok(SqliteStorage {
            conn,
            mode: StorageMode::Memory,
            disk_path,
            clock,
            sync: Some(sync),
        })
    }

    /// The active mode.
    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Whether writes feed the sync tracker.
    pub(crate) fn tracking(&self) -> bool {
        self.mode == StorageMode::Memory
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn clock(&self) -> &Arc<WriteClock> {
        &self.clock
    }

    pub(crate) fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    /// The sync manager, present in memory mode.
    pub fn sync_manager(&self) -> Option<&Arc<SyncManager>> {
        self.sync.as_ref()
    }

    /// Run one sync immediately. No-op in direct mode.
    pub async fn sync_now(&self) -> Result<u64> {
        match &self.sync {
            Some(sync) => sync.run_sync().await,
            None => Ok(0),
        }
    }

    /// Drain pending changes and stop the monitors.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(sync) = &self.sync {
            sync.shutdown().await?;
        }
        Ok(())
    }
}

/// Insert the default block patterns into an empty blocklist.
fn seed_blocklist(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM blocked_domains", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(());
    }
    let now = chrono::Utc::now().timestamp();
    for (pattern, description) in DEFAULT_PATTERNS {
        conn.execute(
            "INSERT OR IGNORE INTO blocked_domains(pattern, description, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![pattern, description, now],
        )?;
    }
    Ok(())
}
