use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Register a new court listing. Starts Pending — it takes an explicit
    /// status update to Approved before it accepts locks or bookings.
    pub async fn register_court(
        &self,
        owner_id: Ulid,
        name: String,
        base_price: Decimal,
        hours: Option<OperatingHours>,
    ) -> Result<CourtInfo, EngineError> {
        if self.courts.len() >= MAX_COURTS {
            return Err(EngineError::LimitExceeded("too many courts"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("court name too long"));
        }
        if base_price <= Decimal::ZERO {
            return Err(EngineError::InvalidRule("base price must be positive"));
        }
        if let Some(h) = hours
            && !h.is_round_the_clock()
            && h.open >= h.close
        {
            return Err(EngineError::InvalidRule("court must open before it closes"));
        }

        let id = Ulid::new();
        let event = Event::CourtRegistered {
            id,
            owner_id,
            name: name.clone(),
            base_price,
            hours,
        };
        self.wal_append(&event).await?;
        let cs = CourtState::new(id, owner_id, name.clone(), base_price, hours);
        self.courts.insert(id, Arc::new(RwLock::new(cs)));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::COURTS_ACTIVE).set(self.courts.len() as f64);
        Ok(CourtInfo {
            id,
            owner_id,
            name,
            base_price,
            hours,
            status: CourtStatus::Pending,
            active: true,
        })
    }

    /// Replace a court's listing fields, approval status, and active flag.
    /// Existing entries are untouched — deactivating a court stops new
    /// bookings but keeps history.
    pub async fn update_court(
        &self,
        id: Ulid,
        name: String,
        base_price: Decimal,
        hours: Option<OperatingHours>,
        status: CourtStatus,
        active: bool,
    ) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("court name too long"));
        }
        if base_price <= Decimal::ZERO {
            return Err(EngineError::InvalidRule("base price must be positive"));
        }
        if let Some(h) = hours
            && !h.is_round_the_clock()
            && h.open >= h.close
        {
            return Err(EngineError::InvalidRule("court must open before it closes"));
        }
        let cs = self.get_court(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = cs.write().await;
        let event = Event::CourtUpdated {
            id,
            name,
            base_price,
            hours,
            status,
            active,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn remove_court(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.courts.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::CourtRemoved { id };
        self.wal_append(&event).await?;
        self.courts.remove(&id);
        self.entity_to_court.retain(|_, c| c != &id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::COURTS_ACTIVE).set(self.courts.len() as f64);
        Ok(())
    }

    pub async fn add_pricing_rule(
        &self,
        court_id: Ulid,
        kind: RuleKind,
        multiplier: Decimal,
    ) -> Result<PricingRule, EngineError> {
        if multiplier <= Decimal::ZERO {
            return Err(EngineError::InvalidRule("multiplier must be positive"));
        }
        if let RuleKind::PeakHours { start, end, days } = &kind {
            if days.is_empty() {
                return Err(EngineError::InvalidRule("peak rule matches no days"));
            }
            if start == end {
                return Err(EngineError::InvalidRule("empty peak window"));
            }
        }
        if let RuleKind::Special { date: None, days } = &kind
            && days.is_empty()
        {
            return Err(EngineError::InvalidRule("special rule matches nothing"));
        }

        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let mut guard = cs.write().await;
        if guard.rules.len() >= MAX_RULES_PER_COURT {
            return Err(EngineError::LimitExceeded("too many rules on court"));
        }

        let rule = PricingRule {
            id: Ulid::new(),
            court_id,
            kind,
            multiplier,
            active: true,
        };
        let event = Event::RuleAdded { rule: rule.clone() };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        Ok(rule)
    }

    pub async fn remove_pricing_rule(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (court_id, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.rules.iter().any(|r| r.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::RuleRemoved { id, court_id };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        Ok(court_id)
    }

    /// Add or replace the holiday for a date. Upsert — re-adding a date
    /// overwrites its name and multiplier.
    pub async fn add_holiday(
        &self,
        date: NaiveDate,
        name: String,
        multiplier: Decimal,
    ) -> Result<(), EngineError> {
        if multiplier <= Decimal::ZERO {
            return Err(EngineError::InvalidRule("multiplier must be positive"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("holiday name too long"));
        }
        if self.holidays.len() >= MAX_HOLIDAYS && !self.holidays.contains_key(&date) {
            return Err(EngineError::LimitExceeded("too many holidays"));
        }
        let holiday = Holiday {
            date,
            name,
            multiplier,
            active: true,
        };
        let event = Event::HolidayAdded {
            holiday: holiday.clone(),
        };
        self.wal_append(&event).await?;
        self.holidays.insert(date, holiday);
        Ok(())
    }

    /// Remove a holiday. Idempotent — removing an unknown date is a no-op.
    pub async fn remove_holiday(&self, date: NaiveDate) -> Result<(), EngineError> {
        if !self.holidays.contains_key(&date) {
            return Ok(());
        }
        let event = Event::HolidayRemoved { date };
        self.wal_append(&event).await?;
        self.holidays.remove(&date);
        Ok(())
    }

    /// Owner blocks a range of their court. No conflict check: a block is
    /// an override and may shadow existing bookings (which the owner is
    /// expected to cancel out-of-band). Blocks ignore the operating window
    /// but must still be hour-aligned, up to a full day.
    pub async fn block_slot(
        &self,
        court_id: Ulid,
        range: SlotRange,
        reason: Option<String>,
    ) -> Result<BlockInfo, EngineError> {
        if !range.start.is_hour_aligned() {
            return Err(EngineError::InvalidRange("start time must be hour-aligned"));
        }
        if range.hours == 0 || range.hours > 24 {
            return Err(EngineError::InvalidRange("block must cover 1-24 hours"));
        }
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("block reason too long"));
        }
        let cs = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let mut guard = cs.write().await;
        if guard.entries.len() >= MAX_ENTRIES_PER_COURT {
            return Err(EngineError::LimitExceeded("too many entries on court"));
        }

        let id = Ulid::new();
        let span = range.span();
        let event = Event::SlotBlocked {
            id,
            court_id,
            span,
            reason: reason.clone(),
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        Ok(BlockInfo {
            id,
            court_id,
            date: date_of(span.start),
            start: time_of(span.start),
            end: time_of(span.end),
            reason,
        })
    }

    pub async fn unblock_slot(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (court_id, mut guard) = self.resolve_entity_write(&id).await?;
        let is_block = guard
            .entries
            .iter()
            .any(|e| e.id == id && matches!(e.kind, EntryKind::Block { .. }));
        if !is_block {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::SlotUnblocked { id, court_id };
        self.persist_and_apply(court_id, &mut guard, &event).await?;
        Ok(court_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate current state. Expired locks are dropped on the floor.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let now = self.now_ms();
        let mut events = Vec::new();

        // Wait for each court's read guard rather than skipping contended
        // ones — a skipped court would vanish from the compacted log.
        let courts: Vec<_> = self.courts.iter().map(|e| e.value().clone()).collect();
        for cs in courts {
            let guard = cs.read().await;

            events.push(Event::CourtRegistered {
                id: guard.id,
                owner_id: guard.owner_id,
                name: guard.name.clone(),
                base_price: guard.base_price,
                hours: guard.hours,
            });
            if guard.status != CourtStatus::Pending || !guard.active {
                events.push(Event::CourtUpdated {
                    id: guard.id,
                    name: guard.name.clone(),
                    base_price: guard.base_price,
                    hours: guard.hours,
                    status: guard.status,
                    active: guard.active,
                });
            }
            for rule in &guard.rules {
                events.push(Event::RuleAdded { rule: rule.clone() });
            }
            for e in &guard.entries {
                match &e.kind {
                    EntryKind::Booking {
                        user_id,
                        status,
                        payment,
                        total,
                        created_at,
                    } => events.push(Event::BookingCreated {
                        id: e.id,
                        court_id: guard.id,
                        user_id: *user_id,
                        span: e.span,
                        total: *total,
                        status: *status,
                        payment: *payment,
                        created_at: *created_at,
                    }),
                    EntryKind::Block { reason } => events.push(Event::SlotBlocked {
                        id: e.id,
                        court_id: guard.id,
                        span: e.span,
                        reason: reason.clone(),
                    }),
                    EntryKind::Lock {
                        user_id,
                        locked_at,
                        expires_at,
                    } if *expires_at > now => events.push(Event::LockAcquired {
                        id: e.id,
                        court_id: guard.id,
                        user_id: *user_id,
                        span: e.span,
                        locked_at: *locked_at,
                        expires_at: *expires_at,
                    }),
                    EntryKind::Lock { .. } => {}
                }
            }
        }

        for h in self.holidays.iter() {
            events.push(Event::HolidayAdded {
                holiday: h.value().clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
