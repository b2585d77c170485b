mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use conflict::{evaluate, Decision};
pub use error::{EngineError, ErrorKind};
pub use mutations::Approval;

pub(crate) use conflict::now_ms;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::catalog;
use crate::model::*;
use crate::notify::LiveHub;
use crate::wal::Wal;

pub type SharedFloorState = Arc<RwLock<FloorState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL and batches appends: everything already queued when the
/// first append arrives is written with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} records failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray bytes don't leak into the
    // next batch; the whole batch is reported failed either way.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// The booking store: one partition per catalog floor, each behind its own
/// lock, plus the id → floor index and the profile cache.
pub struct Engine {
    pub(super) floors: DashMap<Floor, SharedFloorState>,
    pub(super) booking_floor: DashMap<Ulid, Floor>,
    pub(super) profiles: DashMap<String, UserProfile>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub live: Arc<LiveHub>,
}

/// Apply a floor event to its partition. Caller holds the write lock.
fn apply_to_floor(fs: &mut FloorState, event: &Event, index: &DashMap<Ulid, Floor>) {
    match event {
        Event::BookingSubmitted { booking } => {
            index.insert(booking.id, booking.floor);
            fs.insert_booking(booking.clone());
        }
        Event::BookingApproved { id, declined, .. } => {
            if let Some(b) = fs.get_mut(*id) {
                b.status = BookingStatus::Approved;
            }
            for gone in declined {
                fs.remove_booking(*gone);
                index.remove(gone);
            }
        }
        Event::BookingRemoved { id, .. } => {
            fs.remove_booking(*id);
            index.remove(id);
        }
        Event::ProfileSaved { .. } => {}
    }
}

pub(crate) fn profile_key(user_id: &str) -> String {
    user_id.trim().to_ascii_lowercase()
}

impl Engine {
    /// Replay the log at `wal_path` and start the writer task. Must be called
    /// from inside a tokio runtime.
    pub fn new(wal_path: PathBuf, live: Arc<LiveHub>) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if let Some(offset) = replay.discarded_from {
            warn!(
                "WAL {} has a damaged tail at byte {offset}; recovered {} records, truncating",
                wal_path.display(),
                replay.events.len()
            );
            Wal::truncate(&wal_path, offset)?;
        }

        let booking_floor = DashMap::new();
        let profiles = DashMap::new();
        let mut partitions: HashMap<Floor, FloorState> = catalog::floors()
            .map(|f| (f, FloorState::new(f)))
            .collect();

        // Partitions aren't shared yet, so replay needs no locking.
        for event in &replay.events {
            match event {
                Event::ProfileSaved { user_id, profile } => {
                    profiles.insert(profile_key(user_id), profile.clone());
                }
                other => {
                    let Some(floor) = other.floor() else { continue };
                    match partitions.get_mut(&floor) {
                        Some(fs) => apply_to_floor(fs, other, &booking_floor),
                        None => warn!("replay: skipping record for floor {floor} not in catalog"),
                    }
                }
            }
        }

        let floors = DashMap::new();
        for (floor, fs) in partitions {
            info!("floor {floor}: {} bookings", fs.bookings.len());
            floors.insert(floor, Arc::new(RwLock::new(fs)));
        }

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            floors,
            booking_floor,
            profiles,
            wal_tx,
            live,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn partition(&self, floor: Floor) -> Result<SharedFloorState, EngineError> {
        self.floors
            .get(&floor)
            .map(|e| e.value().clone())
            .ok_or(EngineError::UnknownFloor(floor))
    }

    /// WAL append, then apply, then publish the floor's new snapshot. Nothing
    /// changes in memory if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        fs: &mut FloorState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_floor(fs, event, &self.booking_floor);
        if self.live.is_watched(fs.floor) {
            self.live.publish(fs.floor, Arc::new(fs.bookings.clone()));
        }
        Ok(())
    }

    /// Lookup booking → floor, acquire that partition's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        id: Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<FloorState>, EngineError> {
        let floor = self
            .booking_floor
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        Ok(self.partition(floor)?.write_owned().await)
    }
}
