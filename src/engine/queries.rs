use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::availability::{check_range, slot_status};
use super::{Engine, EngineError, SlotStatus};

impl Engine {
    pub async fn list_courts(&self) -> Vec<CourtInfo> {
        // Snapshot the Arcs first so no DashMap shard stays pinned across
        // an await; a court mid-commit just makes us wait for its guard.
        let courts: Vec<_> = self.courts.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(courts.len());
        for cs in courts {
            let guard = cs.read().await;
            out.push(court_info(&guard));
        }
        out
    }

    pub async fn get_court_info(&self, id: Ulid) -> Option<CourtInfo> {
        let cs = self.get_court(&id)?;
        let guard = cs.read().await;
        Some(court_info(&guard))
    }

    /// Bookings on a court, optionally restricted to one calendar date.
    /// History included — cancelled and completed bookings stay visible.
    pub async fn get_bookings(
        &self,
        court_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(vec![]);
        };
        let guard = cs.read().await;
        Ok(guard
            .entries
            .iter()
            .filter(|e| date.is_none_or(|d| date_of(e.span.start) == d))
            .filter_map(|e| match &e.kind {
                EntryKind::Booking {
                    user_id,
                    status,
                    payment,
                    total,
                    created_at,
                } => Some(BookingInfo::from_parts(
                    e.id, court_id, *user_id, e.span, *total, *status, *payment, *created_at,
                )),
                _ => None,
            })
            .collect())
    }

    /// Bookings whose start date falls in `[from, to]`.
    pub async fn get_bookings_between(
        &self,
        court_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if from > to {
            return Err(EngineError::InvalidRange("window start after end"));
        }
        if (to - from).num_days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(vec![]);
        };
        let guard = cs.read().await;
        let window = Span::new(
            minute_of(from, TimeOfDay::MIDNIGHT),
            minute_of(to, TimeOfDay::MIDNIGHT) + MINS_PER_DAY,
        );
        Ok(guard
            .overlapping(&window)
            .filter_map(|e| match &e.kind {
                EntryKind::Booking {
                    user_id,
                    status,
                    payment,
                    total,
                    created_at,
                } => Some(BookingInfo::from_parts(
                    e.id, court_id, *user_id, e.span, *total, *status, *payment, *created_at,
                )),
                _ => None,
            })
            .collect())
    }

    pub async fn get_blocks(&self, court_id: Ulid) -> Result<Vec<BlockInfo>, EngineError> {
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(vec![]);
        };
        let guard = cs.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| match &e.kind {
                EntryKind::Block { reason } => Some(BlockInfo {
                    id: e.id,
                    court_id,
                    date: date_of(e.span.start),
                    start: time_of(e.span.start),
                    end: time_of(e.span.end),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect())
    }

    /// Live locks only — expired corpses the reaper hasn't swept are
    /// already invisible.
    pub async fn get_locks(&self, court_id: Ulid) -> Result<Vec<LockInfo>, EngineError> {
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(vec![]);
        };
        let now = self.now_ms();
        let guard = cs.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| match &e.kind {
                EntryKind::Lock {
                    user_id,
                    locked_at,
                    expires_at,
                } if *expires_at > now => Some(LockInfo {
                    id: e.id,
                    court_id,
                    user_id: *user_id,
                    date: date_of(e.span.start),
                    start: time_of(e.span.start),
                    end: time_of(e.span.end),
                    locked_at: *locked_at,
                    expires_at: *expires_at,
                }),
                _ => None,
            })
            .collect())
    }

    pub async fn get_rules(&self, court_id: Ulid) -> Result<Vec<PricingRule>, EngineError> {
        let Some(cs) = self.get_court(&court_id) else {
            return Ok(vec![]);
        };
        let guard = cs.read().await;
        Ok(guard.rules.clone())
    }

    pub fn get_holiday(&self, date: NaiveDate) -> Option<Holiday> {
        self.holidays.get(&date).map(|h| h.value().clone())
    }

    pub fn list_holidays(&self) -> Vec<Holiday> {
        let mut out: Vec<Holiday> = self.holidays.iter().map(|h| h.value().clone()).collect();
        out.sort_by_key(|h| h.date);
        out
    }

    /// Whether `user` could book this range right now.
    pub async fn is_range_available(
        &self,
        court_id: Ulid,
        range: SlotRange,
        user: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let guard = cs.read().await;
        if !guard.is_bookable() {
            return Ok(false);
        }
        Ok(check_range(&guard, &range, user, self.now_ms()).is_ok())
    }

    /// Per-hour availability grid for one court-day, covering every
    /// bookable start hour of the court's operating window.
    pub async fn day_grid(
        &self,
        court_id: Ulid,
        date: NaiveDate,
        user: Option<Ulid>,
    ) -> Result<Vec<SlotStatus>, EngineError> {
        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let now = self.now_ms();
        let guard = cs.read().await;
        Ok(guard
            .operating_hours()
            .bookable_start_hours()
            .into_iter()
            .map(|start| slot_status(&guard, HourSlot { date, start }, user, now))
            .collect())
    }
}

fn court_info(cs: &CourtState) -> CourtInfo {
    CourtInfo {
        id: cs.id,
        owner_id: cs.owner_id,
        name: cs.name.clone(),
        base_price: cs.base_price,
        hours: cs.hours,
        status: cs.status,
        active: cs.active,
    }
}
