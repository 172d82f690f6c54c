use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::validate_range;
use super::conflict::{check_no_conflict, check_not_past};
use super::{Engine, EngineError};

// ── Slot Lock Manager ────────────────────────────────────────────
//
// A lock is a short-lived exclusive claim on a range while the holder
// completes payment. Expiry is lazy: once expires_at passes, every
// availability and conflict check treats the lock as absent — holder
// included. The reaper only tidies the corpses.

impl Engine {
    /// Acquire an exclusive lock on a range. Idempotent per user: asking
    /// again for an identical live lock returns the existing one with its
    /// original expiry rather than extending it.
    pub async fn acquire_lock(
        &self,
        court_id: Ulid,
        user_id: Ulid,
        range: SlotRange,
    ) -> Result<LockInfo, EngineError> {
        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let mut guard = cs.write().await;
        if !guard.is_bookable() {
            return Err(EngineError::CourtNotBookable(court_id));
        }
        validate_range(&guard, &range)?;
        if guard.entries.len() >= MAX_ENTRIES_PER_COURT {
            return Err(EngineError::LimitExceeded("too many entries on court"));
        }

        let now = self.now_ms();
        let span = range.span();
        check_not_past(&span, now)?;

        if let Some(existing) = guard.entries.iter().find(|e| {
            e.span == span
                && matches!(
                    &e.kind,
                    EntryKind::Lock { user_id: u, expires_at, .. }
                        if *u == user_id && *expires_at > now
                )
        }) && let EntryKind::Lock {
            locked_at,
            expires_at,
            ..
        } = &existing.kind
        {
            debug!("lock {} re-acquired by holder", existing.id);
            return Ok(lock_info(
                existing.id,
                court_id,
                user_id,
                span,
                *locked_at,
                *expires_at,
            ));
        }

        check_no_conflict(&guard, &span, Some(user_id), now)?;

        let id = Ulid::new();
        let expires_at = now + self.lock_ttl_ms;
        let event = Event::LockAcquired {
            id,
            court_id,
            user_id,
            span,
            locked_at: now,
            expires_at,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::LOCKS_ACQUIRED_TOTAL).increment(1);
        Ok(lock_info(id, court_id, user_id, span, now, expires_at))
    }

    /// Release a lock. Idempotent: an unknown or already-released id is a
    /// no-op — the lock may have been consumed by a commit or reaped.
    pub async fn release_lock(&self, lock_id: Ulid) -> Result<(), EngineError> {
        let Some(court_id) = self.court_for_entity(&lock_id) else {
            return Ok(());
        };
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(());
        };
        let mut guard = cs.write().await;
        let is_lock = guard
            .entries
            .iter()
            .any(|e| e.id == lock_id && matches!(e.kind, EntryKind::Lock { .. }));
        if !is_lock {
            return Ok(());
        }
        let event = Event::LockReleased {
            id: lock_id,
            court_id,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::LOCKS_RELEASED_TOTAL).increment(1);
        Ok(())
    }

    /// Expired lock ids across all courts, for the reaper. Skips courts
    /// whose lock is contended — they'll be seen on the next sweep.
    pub fn collect_expired_locks(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.courts.iter() {
            let cs = entry.value().clone();
            if let Ok(guard) = cs.try_read() {
                for e in &guard.entries {
                    if let EntryKind::Lock { expires_at, .. } = e.kind
                        && expires_at <= now
                    {
                        expired.push((e.id, guard.id));
                    }
                }
            }
        }
        expired
    }
}

fn lock_info(
    id: Ulid,
    court_id: Ulid,
    user_id: Ulid,
    span: Span,
    locked_at: Ms,
    expires_at: Ms,
) -> LockInfo {
    LockInfo {
        id,
        court_id,
        user_id,
        date: date_of(span.start),
        start: time_of(span.start),
        end: time_of(span.end),
        locked_at,
        expires_at,
    }
}
