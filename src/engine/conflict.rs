use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::error::BusyReason;

/// Write-path availability check, run while holding the court's write
/// lock. Same overlap semantics as the read path, but a hit surfaces as
/// `Conflict` carrying the winning entry's id — the caller's pre-check
/// passed, so this is a genuine race loss.
pub(super) fn check_no_conflict(
    cs: &CourtState,
    span: &Span,
    user: Option<Ulid>,
    now: Ms,
) -> Result<(), EngineError> {
    for entry in cs.overlapping(span) {
        if entry.blocks(user, now) {
            return Err(EngineError::Conflict(entry.id));
        }
    }
    Ok(())
}

pub(super) fn check_not_past(span: &Span, now: Ms) -> Result<(), EngineError> {
    if span.start < now / 60_000 {
        return Err(EngineError::Unavailable(BusyReason::InPast));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn court() -> CourtState {
        let mut cs = CourtState::new(
            Ulid::new(),
            Ulid::new(),
            "Court".into(),
            Decimal::new(1000, 0),
            None,
        );
        cs.status = CourtStatus::Approved;
        cs
    }

    #[test]
    fn conflict_names_the_winning_entry() {
        let mut cs = court();
        let entry_id = Ulid::new();
        cs.insert_entry(SlotEntry {
            id: entry_id,
            span: Span::new(600, 660),
            kind: EntryKind::Block { reason: None },
        });
        match check_no_conflict(&cs, &Span::new(600, 720), None, 0) {
            Err(EngineError::Conflict(id)) => assert_eq!(id, entry_id),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn expired_lock_never_conflicts() {
        let mut cs = court();
        cs.insert_entry(SlotEntry {
            id: Ulid::new(),
            span: Span::new(600, 660),
            kind: EntryKind::Lock {
                user_id: Ulid::new(),
                locked_at: 0,
                expires_at: 1_000,
            },
        });
        assert!(check_no_conflict(&cs, &Span::new(600, 660), None, 2_000).is_ok());
    }

    #[test]
    fn past_check_uses_minute_axis() {
        let span = Span::new(600, 660);
        assert!(check_not_past(&span, 600 * 60_000).is_ok());
        assert!(matches!(
            check_not_past(&span, 601 * 60_000),
            Err(EngineError::Unavailable(BusyReason::InPast))
        ));
    }
}
