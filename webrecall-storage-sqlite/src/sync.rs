//! Differential synchronization between the RAM working set and the disk
//! mirror.
//!
//! Writes land in `:memory:` and are recorded in `sync_tracker` (by
//! triggers for regular tables, by explicit calls for the vector table).
//! A sync replays the tracked changes onto the disk file inside one
//! transaction, then clears the tracker. The disk file is only ever
//! attached for the duration of a sync, under the sync mutex, so nothing
//! else touches it while a sync is in flight.
//!
//! Two monitors drive syncing:
//! - the idle monitor fires after 5 s without writes, once per idle period;
//! - the periodic monitor fires every 5 min while changes are pending and
//!   also runs the retention sweeper.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_rusqlite::Connection;
use tracing::{debug, error, info, warn};

use webrecall_core::constants::{SYNC_IDLE_AFTER_SECS, SYNC_IDLE_TICK_SECS, SYNC_PERIODIC_SECS};
use webrecall_core::error::{Error, Result};
use webrecall_core::storage::SyncMetricsSnapshot;

use crate::schema::{TRACKED_TABLES, VECTOR_TABLE};
use crate::store::sweep_expired_tx;
use crate::{db_err, WriteClock};

/// Sync timing knobs, overridable for tests.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub idle_tick: Duration,
    pub idle_after: Duration,
    pub periodic_every: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            idle_tick: Duration::from_secs(SYNC_IDLE_TICK_SECS),
            idle_after: Duration::from_secs(SYNC_IDLE_AFTER_SECS),
            periodic_every: Duration::from_secs(SYNC_PERIODIC_SECS),
        }
    }
}

#[derive(Debug, Default)]
struct SyncCounters {
    total_syncs: AtomicU64,
    failed_syncs: AtomicU64,
    records_synced: AtomicU64,
    last_sync_ms: AtomicU64,
    last_sync_at: Mutex<Option<i64>>,
}

/// Owns the disk mirror and drains the tracker to it.
pub struct SyncManager {
    conn: Connection,
    disk_path: PathBuf,
    clock: Arc<WriteClock>,
    sync_lock: tokio::sync::Mutex<()>,
    counters: SyncCounters,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncManager {
    /// Build the manager and spawn both monitor tasks.
    pub fn start(
        conn: Connection,
        disk_path: PathBuf,
        clock: Arc<WriteClock>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::new(SyncManager {
            conn,
            disk_path,
            clock,
            sync_lock: tokio::sync::Mutex::new(()),
            counters: SyncCounters::default(),
            shutdown_tx,
        });

        tokio::spawn(idle_monitor(
            Arc::clone(&manager),
            config.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(periodic_monitor(Arc::clone(&manager), config, shutdown_rx));
        manager
    }

    /// Count of tracked changes awaiting sync.
    pub async fn pending_changes(&self) -> Result<u64> {
        self.conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM sync_tracker", [], |r| r.get(0))?;
                Ok(n as u64)
            })
            .await
            .map_err(db_err)
    }

    /// Replay every tracked change onto the disk mirror and clear the
    /// tracker. Serialized by the sync mutex; concurrent callers queue.
    /// Returns the number of records applied.
    pub async fn run_sync(&self) -> Result<u64> {
        let _guard = self.sync_lock.lock().await;

        let pending = self.pending_changes().await?;
        if pending == 0 {
            self.clock.mark_idle_sync_done();
            return Ok(0);
        }

        let started = Instant::now();
        let attach_path = self.disk_path.to_string_lossy().into_owned();
        let outcome = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "ATTACH DATABASE ?1 AS disk",
                    rusqlite::params![attach_path],
                )?;
                let applied = apply_tracked_changes(conn);
                let detach = conn.execute_batch("DETACH DATABASE disk");
                let applied = applied?;
                detach?;
                Ok(applied)
            })
            .await
            .map_err(db_err);

        match outcome {
            Ok(applied) => {
                let elapsed = started.elapsed();
                self.counters.total_syncs.fetch_add(1, Ordering::SeqCst);
                self.counters
                    .records_synced
                    .fetch_add(applied, Ordering::SeqCst);
                self.counters
                    .last_sync_ms
                    .store(elapsed.as_millis() as u64, Ordering::SeqCst);
                *self.counters.last_sync_at.lock() = Some(chrono::Utc::now().timestamp());
                self.clock.mark_idle_sync_done();
                info!(
                    records = applied,
                    duration_ms = elapsed.as_millis() as u64,
                    "sync applied"
                );
                Ok(applied)
            }
            Err(err) => {
                // Tracker rows stay put; the next trigger retries.
                self.counters.failed_syncs.fetch_add(1, Ordering::SeqCst);
                error!(error = %err, "sync failed; changes remain pending");
                Err(Error::Sync(err.to_string()))
            }
        }
    }

    /// Delete expired time-bounded rows, with tracking on.
    async fn sweep_retention(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = sweep_expired_tx(&tx, now, true)?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(db_err)?;
        if removed > 0 {
            self.clock.touch();
            info!(removed, "retention sweep removed expired rows");
        }
        Ok(removed)
    }

    /// Metrics snapshot for the stats surface. `pending_changes` is filled
    /// in by the caller (it needs an async query).
    pub fn metrics_snapshot(&self) -> SyncMetricsSnapshot {
        let total = self.counters.total_syncs.load(Ordering::SeqCst);
        let failed = self.counters.failed_syncs.load(Ordering::SeqCst);
        let attempts = total + failed;
        SyncMetricsSnapshot {
            total_syncs: total,
            failed_syncs: failed,
            records_synced: self.counters.records_synced.load(Ordering::SeqCst),
            pending_changes: 0,
            last_sync_at: *self.counters.last_sync_at.lock(),
            last_sync_ms: match total {
                0 => None,
                _ => Some(self.counters.last_sync_ms.load(Ordering::SeqCst)),
            },
            success_rate: if attempts == 0 {
                1.0
            } else {
                total as f32 / attempts as f32
            },
        }
    }

    /// Drain pending changes with one final sync and stop the monitors.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.run_sync().await?;
        info!("sync manager shut down");
        Ok(())
    }
}

/// Replay tracker rows, grouped by table, inside one transaction spanning
/// the RAM database and the attached disk mirror. Clearing the tracker
/// commits atomically with the replay, so a failure leaves every pending
/// row in place.
fn apply_tracked_changes(
    conn: &mut rusqlite::Connection,
) -> std::result::Result<u64, tokio_rusqlite::Error> {
    let tx = conn.transaction()?;

    let rows: Vec<(String, String, String)> = tx
        .prepare(
            "SELECT table_name, record_id, operation FROM sync_tracker
             ORDER BY table_name, changed_at",
        )?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut applied = 0u64;
    for (table, record_id, operation) in rows {
        if apply_one(&tx, &table, &record_id, &operation)? {
            applied += 1;
        }
    }

    tx.execute("DELETE FROM sync_tracker", [])?;
    tx.commit()?;
    Ok(applied)
}

/// Replay one tracked change. Unknown table names are skipped; they can
/// only appear if the schema and the tracker disagree.
fn apply_one(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    record_id: &str,
    operation: &str,
) -> rusqlite::Result<bool> {
    if table == VECTOR_TABLE {
        // The vector row is replayed by rowid point-read. Replace-by-delete
        // keeps INSERT and UPDATE identical. Virtual-table rowid lookups
        // need a real integer, not a text key.
        let Ok(rowid) = record_id.parse::<i64>() else {
            warn!(record_id, "vector tracker row has a non-integer rowid");
            return Ok(false);
        };
        tx.execute(
            "DELETE FROM disk.content_vectors WHERE rowid = ?1",
            rusqlite::params![rowid],
        )?;
        if operation != "DELETE" {
            tx.execute(
                "INSERT INTO disk.content_vectors(rowid, embedding)
                 SELECT rowid, embedding FROM main.content_vectors WHERE rowid = ?1",
                rusqlite::params![rowid],
            )?;
        }
        debug!(table, record_id, operation, "replayed vector change");
        return Ok(true);
    }

    let Some((_, key)) = TRACKED_TABLES.iter().find(|(name, _)| *name == table) else {
        warn!(table, record_id, "tracker row references unknown table");
        return Ok(false);
    };

    if operation == "DELETE" {
        tx.execute(
            &format!("DELETE FROM disk.{table} WHERE {key} = ?1"),
            rusqlite::params![record_id],
        )?;
    } else {
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO disk.{table}
                 SELECT * FROM main.{table} WHERE {key} = ?1"
            ),
            rusqlite::params![record_id],
        )?;
    }
    Ok(true)
}

async fn idle_monitor(
    manager: Arc<SyncManager>,
    config: SyncConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(config.idle_tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => return,
        }
        if manager.clock.idle_sync_done() || manager.clock.idle_for() < config.idle_after {
            continue;
        }
        match manager.pending_changes().await {
            Ok(0) => {}
            Ok(pending) => {
                debug!(pending, "idle threshold reached, syncing");
                if let Err(err) = manager.run_sync().await {
                    warn!(error = %err, "idle sync failed");
                }
            }
            Err(err) => warn!(error = %err, "could not count pending changes"),
        }
    }
}

async fn periodic_monitor(
    manager: Arc<SyncManager>,
    config: SyncConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(config.periodic_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately; skip it so the
    // first periodic sync happens one full period after startup.
    tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => return,
        }
        if let Err(err) = manager.sweep_retention().await {
            warn!(error = %err, "retention sweep failed");
        }
        match manager.pending_changes().await {
            Ok(0) => {}
            Ok(pending) => {
                debug!(pending, "periodic sync");
                if let Err(err) = manager.run_sync().await {
                    warn!(error = %err, "periodic sync failed");
                }
            }
            Err(err) => warn!(error = %err, "could not count pending changes"),
        }
    }
}
