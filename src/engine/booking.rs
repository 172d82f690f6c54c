use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::validate_range;
use super::conflict::{check_no_conflict, check_not_past};
use super::pricing::quote;
use super::{Engine, EngineError};

// ── Booking commit ───────────────────────────────────────────────
//
// The commit re-checks availability and re-prices the range while holding
// the court's write lock, then appends to the WAL before the entry becomes
// visible. Two racing commits for the same slot serialize on the lock:
// the loser's re-check fails with Conflict and nothing is written.

impl Engine {
    /// Create a booking. The caller's price and availability pre-checks are
    /// advisory only — both are redone here under the write lock.
    ///
    /// On success every live lock the user held on an overlapping range is
    /// consumed. On conflict the user's locks are left untouched so a held
    /// slot stays held while they retry.
    pub async fn commit_booking(
        &self,
        court_id: Ulid,
        user_id: Ulid,
        range: SlotRange,
        method: PaymentMethod,
    ) -> Result<BookingInfo, EngineError> {
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

        if let Err(e) = check_no_conflict(&guard, &span, Some(user_id), now) {
            warn!("booking commit lost race on court {court_id}: {e}");
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        // Server-side price is the price.
        let holidays = self.holidays_for(&range);
        let price = quote(guard.base_price, &guard.rules, &holidays, &range);

        let (status, payment) = match method {
            PaymentMethod::Instant => (BookingStatus::Confirmed, PaymentStatus::Succeeded),
            PaymentMethod::Manual => (BookingStatus::Pending, PaymentStatus::Pending),
        };

        let id = Ulid::new();
        let event = Event::BookingCreated {
            id,
            court_id,
            user_id,
            span,
            total: price.total,
            status,
            payment,
            created_at: now,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_COMMITTED_TOTAL).increment(1);

        // Consume the user's locks covering any part of the booked range.
        let consumed: Vec<Ulid> = guard
            .entries
            .iter()
            .filter(|e| {
                e.span.overlaps(&span)
                    && matches!(&e.kind, EntryKind::Lock { user_id: u, .. } if *u == user_id)
            })
            .map(|e| e.id)
            .collect();
        for lock_id in consumed {
            let event = Event::LockReleased {
                id: lock_id,
                court_id,
            };
            self.persist_and_apply(court_id, &mut guard, &event).await?;
            metrics::counter!(crate::observability::LOCKS_RELEASED_TOTAL).increment(1);
        }

        info!("booking {id} committed on court {court_id}, total {}", price.total);
        Ok(BookingInfo::from_parts(
            id, court_id, user_id, span, price.total, status, payment, now,
        ))
    }

    /// Owner confirms a manual payment: Pending → Confirmed, payment
    /// marked succeeded.
    pub async fn confirm_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        self.transition_booking(id, |status, _| match status {
            BookingStatus::Pending => Ok((BookingStatus::Confirmed, PaymentStatus::Succeeded)),
            other => Err(EngineError::InvalidTransition {
                from: other,
                to: BookingStatus::Confirmed,
            }),
        })
        .await
    }

    /// Cancel a pending or confirmed booking, freeing its slots. A payment
    /// that already succeeded is marked refunded.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        self.transition_booking(id, |status, payment| match status {
            BookingStatus::Pending | BookingStatus::Confirmed => {
                let payment = if payment == PaymentStatus::Succeeded {
                    PaymentStatus::Refunded
                } else {
                    payment
                };
                Ok((BookingStatus::Cancelled, payment))
            }
            other => Err(EngineError::InvalidTransition {
                from: other,
                to: BookingStatus::Cancelled,
            }),
        })
        .await
    }

    /// Mark a confirmed booking as played: Confirmed → Completed.
    pub async fn complete_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        self.transition_booking(id, |status, payment| match status {
            BookingStatus::Confirmed => Ok((BookingStatus::Completed, payment)),
            other => Err(EngineError::InvalidTransition {
                from: other,
                to: BookingStatus::Completed,
            }),
        })
        .await
    }

    async fn transition_booking(
        &self,
        id: Ulid,
        next: impl FnOnce(
            BookingStatus,
            PaymentStatus,
        ) -> Result<(BookingStatus, PaymentStatus), EngineError>,
    ) -> Result<BookingInfo, EngineError> {
        let (court_id, mut guard) = self.resolve_entity_write(&id).await?;
        let entry = guard
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(EngineError::NotFound(id))?;
        let EntryKind::Booking {
            user_id,
            status,
            payment,
            total,
            created_at,
        } = entry.kind.clone()
        else {
            return Err(EngineError::NotFound(id));
        };
        let span = entry.span;

        let (new_status, new_payment) = next(status, payment)?;
        let event = Event::BookingStatusChanged {
            id,
            court_id,
            status: new_status,
            payment: new_payment,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        Ok(BookingInfo::from_parts(
            id, court_id, user_id, span, total, new_status, new_payment, created_at,
        ))
    }
}
