mod availability;
mod booking;
mod conflict;
mod error;
mod locks;
mod mutations;
mod pricing;
mod queries;

pub use availability::{SlotStatus, check_range, is_available, slot_status};
pub use error::{BusyReason, EngineError};
pub use pricing::{HourPrice, PriceQuote, PriceSummary, quote};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCourtState = Arc<RwLock<CourtState>>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// Block on the first append, drain whatever else is already queued, fsync
/// once for the whole batch, then ack every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Commit what we have before the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch (these callers were told they failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation core: every court's slot state, the global holiday
/// table, and the WAL writer that makes mutations durable before they
/// become visible.
pub struct Engine {
    pub courts: DashMap<Ulid, SharedCourtState>,
    /// Global per-date price overrides, shared by every court.
    pub(super) holidays: DashMap<NaiveDate, Holiday>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: entry or rule id → court id.
    pub(super) entity_to_court: DashMap<Ulid, Ulid>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) lock_ttl_ms: Ms,
}

/// Apply an event directly to a CourtState (no locking — caller holds the lock).
fn apply_to_court(cs: &mut CourtState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::CourtUpdated {
            name,
            base_price,
            hours,
            status,
            active,
            ..
        } => {
            cs.name = name.clone();
            cs.base_price = *base_price;
            cs.hours = *hours;
            cs.status = *status;
            cs.active = *active;
        }
        Event::RuleAdded { rule } => {
            cs.rules.retain(|r| r.id != rule.id);
            cs.rules.push(rule.clone());
            entity_map.insert(rule.id, rule.court_id);
        }
        Event::RuleRemoved { id, .. } => {
            cs.rules.retain(|r| r.id != *id);
            entity_map.remove(id);
        }
        Event::SlotBlocked {
            id,
            court_id,
            span,
            reason,
        } => {
            cs.insert_entry(SlotEntry {
                id: *id,
                span: *span,
                kind: EntryKind::Block {
                    reason: reason.clone(),
                },
            });
            entity_map.insert(*id, *court_id);
        }
        Event::SlotUnblocked { id, .. } => {
            cs.remove_entry(*id);
            entity_map.remove(id);
        }
        Event::LockAcquired {
            id,
            court_id,
            user_id,
            span,
            locked_at,
            expires_at,
        } => {
            cs.insert_entry(SlotEntry {
                id: *id,
                span: *span,
                kind: EntryKind::Lock {
                    user_id: *user_id,
                    locked_at: *locked_at,
                    expires_at: *expires_at,
                },
            });
            entity_map.insert(*id, *court_id);
        }
        Event::LockReleased { id, .. } => {
            cs.remove_entry(*id);
            entity_map.remove(id);
        }
        Event::BookingCreated {
            id,
            court_id,
            user_id,
            span,
            total,
            status,
            payment,
            created_at,
        } => {
            cs.insert_entry(SlotEntry {
                id: *id,
                span: *span,
                kind: EntryKind::Booking {
                    user_id: *user_id,
                    status: *status,
                    payment: *payment,
                    total: *total,
                    created_at: *created_at,
                },
            });
            entity_map.insert(*id, *court_id);
        }
        Event::BookingStatusChanged {
            id,
            status,
            payment,
            ..
        } => {
            if let Some(entry) = cs.entry_mut(*id)
                && let EntryKind::Booking {
                    status: s,
                    payment: p,
                    ..
                } = &mut entry.kind
            {
                *s = *status;
                *p = *payment;
            }
        }
        // Court lifecycle and holidays are handled at the DashMap level
        Event::CourtRegistered { .. }
        | Event::CourtRemoved { .. }
        | Event::HolidayAdded { .. }
        | Event::HolidayRemoved { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        lock_ttl_ms: Ms,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            courts: DashMap::new(),
            holidays: DashMap::new(),
            wal_tx,
            notify,
            entity_to_court: DashMap::new(),
            clock,
            lock_ttl_ms,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here: this may run
        // inside an async context.
        for event in &events {
            match event {
                Event::CourtRegistered {
                    id,
                    owner_id,
                    name,
                    base_price,
                    hours,
                } => {
                    let cs =
                        CourtState::new(*id, *owner_id, name.clone(), *base_price, *hours);
                    engine.courts.insert(*id, Arc::new(RwLock::new(cs)));
                }
                Event::CourtRemoved { id } => {
                    engine.courts.remove(id);
                    engine.entity_to_court.retain(|_, c| c != id);
                }
                Event::HolidayAdded { holiday } => {
                    engine.holidays.insert(holiday.date, holiday.clone());
                }
                Event::HolidayRemoved { date } => {
                    engine.holidays.remove(date);
                }
                other => {
                    if let Some(court_id) = event_court_id(other)
                        && let Some(entry) = engine.courts.get(&court_id)
                    {
                        let cs_arc = entry.clone();
                        let mut guard = cs_arc.try_write().expect("replay: uncontended write");
                        apply_to_court(&mut guard, other, &engine.entity_to_court);
                    }
                }
            }
        }

        Ok(engine)
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

    pub fn get_court(&self, id: &Ulid) -> Option<SharedCourtState> {
        self.courts.get(id).map(|e| e.value().clone())
    }

    pub fn court_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_court.get(entity_id).map(|e| *e.value())
    }

    pub(super) fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// WAL-append + apply + notify in one call — the one way state changes.
    pub(super) async fn persist_and_apply(
        &self,
        court_id: Ulid,
        cs: &mut CourtState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_court(cs, event, &self.entity_to_court);
        self.notify.send(court_id, event);
        Ok(())
    }

    /// Lookup entity → court, get court, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<CourtState>), EngineError> {
        let court_id = self
            .court_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let guard = cs.write_owned().await;
        Ok((court_id, guard))
    }
}

/// Extract the court id from an event (for per-court events only).
fn event_court_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RuleAdded { rule } => Some(rule.court_id),
        Event::RuleRemoved { court_id, .. }
        | Event::SlotBlocked { court_id, .. }
        | Event::SlotUnblocked { court_id, .. }
        | Event::LockAcquired { court_id, .. }
        | Event::LockReleased { court_id, .. }
        | Event::BookingCreated { court_id, .. }
        | Event::BookingStatusChanged { court_id, .. } => Some(*court_id),
        Event::CourtUpdated { id, .. } => Some(*id),
        Event::CourtRegistered { .. }
        | Event::CourtRemoved { .. }
        | Event::HolidayAdded { .. }
        | Event::HolidayRemoved { .. } => None,
    }
}
