use ulid::Ulid;

use crate::model::*;

use super::error::{BusyReason, EngineError};

// ── Availability Checker ─────────────────────────────────────────
//
// Pure functions over a court's slot entries. A multi-hour range is
// atomic: one busy hour fails the whole range. Every check is a true
// interval-overlap test on the minute axis — never string equality on
// formatted times — so misaligned entries can never slip past.

/// First entry that makes any part of `span` busy for `user` at `now`.
/// The user's own live locks do not count; expired locks count for nobody.
pub fn busy_entry<'a>(
    court: &'a CourtState,
    span: &Span,
    user: Option<Ulid>,
    now: Ms,
) -> Option<&'a SlotEntry> {
    court
        .overlapping(span)
        .find(|entry| entry.blocks(user, now))
}

pub fn busy_reason(entry: &SlotEntry) -> BusyReason {
    match entry.kind {
        EntryKind::Booking { .. } => BusyReason::Booked,
        EntryKind::Block { .. } => BusyReason::Blocked,
        EntryKind::Lock { .. } => BusyReason::Locked,
    }
}

/// Validate a requested range against global bounds and the court's
/// operating window. Rejected before any availability scan.
pub fn validate_range(court: &CourtState, range: &SlotRange) -> Result<(), EngineError> {
    use crate::limits::{MAX_BOOKING_HOURS, MIN_BOOKING_HOURS};

    if !range.start.is_hour_aligned() {
        return Err(EngineError::InvalidRange("start time must be hour-aligned"));
    }
    if range.hours < MIN_BOOKING_HOURS || range.hours > MAX_BOOKING_HOURS {
        return Err(EngineError::InvalidRange("duration outside 1-8 hours"));
    }
    if !court.operating_hours().admits(range) {
        return Err(EngineError::InvalidRange(
            "range outside court operating hours",
        ));
    }
    Ok(())
}

/// Full read-side check: range validity, past rejection, then overlap
/// against bookings, blocks, and other users' live locks.
pub fn check_range(
    court: &CourtState,
    range: &SlotRange,
    user: Option<Ulid>,
    now: Ms,
) -> Result<(), EngineError> {
    validate_range(court, range)?;
    let span = range.span();
    if span.start < now / 60_000 {
        return Err(EngineError::Unavailable(BusyReason::InPast));
    }
    if let Some(entry) = busy_entry(court, &span, user, now) {
        return Err(EngineError::Unavailable(busy_reason(entry)));
    }
    Ok(())
}

/// The authoritative boolean.
pub fn is_available(court: &CourtState, range: &SlotRange, user: Option<Ulid>, now: Ms) -> bool {
    check_range(court, range, user, now).is_ok()
}

/// Per-hour status for UI affordances. `available` is the same signal
/// `check_range` would produce for a 1-hour range at this slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub start: TimeOfDay,
    pub available: bool,
    pub reason: Option<BusyReason>,
}

pub fn slot_status(
    court: &CourtState,
    slot: HourSlot,
    user: Option<Ulid>,
    now: Ms,
) -> SlotStatus {
    let span = slot.span();
    if span.start < now / 60_000 {
        return SlotStatus {
            start: slot.start,
            available: false,
            reason: Some(BusyReason::InPast),
        };
    }
    match busy_entry(court, &span, user, now) {
        Some(entry) => SlotStatus {
            start: slot.start,
            available: false,
            reason: Some(busy_reason(entry)),
        },
        None => SlotStatus {
            start: slot.start,
            available: true,
            reason: None,
        },
    }
}
