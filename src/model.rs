use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — wall-clock timestamps (lock expiry, created-at).
pub type Ms = i64;

/// Unix minutes — the slot axis. All bookable time lives on this axis so
/// that overnight wrap is plain arithmetic, not a special case.
pub type Mins = i64;

pub const MINS_PER_HOUR: Mins = 60;
pub const MINS_PER_DAY: Mins = 24 * MINS_PER_HOUR;

/// Days between 0001-01-01 (chrono's CE epoch) and 1970-01-01.
const UNIX_EPOCH_DAYS: i64 = 719_163;

/// Absolute minute of a time-of-day on a calendar date.
pub fn minute_of(date: NaiveDate, time: TimeOfDay) -> Mins {
    let days = i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS;
    days * MINS_PER_DAY + Mins::from(time.minutes_from_midnight())
}

/// Calendar date containing an absolute minute.
pub fn date_of(minute: Mins) -> NaiveDate {
    let days = minute.div_euclid(MINS_PER_DAY) + UNIX_EPOCH_DAYS;
    NaiveDate::from_num_days_from_ce_opt(days as i32).expect("minute within calendar range")
}

/// Time-of-day component of an absolute minute.
pub fn time_of(minute: Mins) -> TimeOfDay {
    TimeOfDay {
        minutes: minute.rem_euclid(MINS_PER_DAY) as u16,
    }
}

/// Half-open interval `[start, end)` in absolute minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Mins,
    pub end: Mins,
}

impl Span {
    pub fn new(start: Mins, end: Mins) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_mins(&self) -> Mins {
        self.end - self.start
    }

    /// The one overlap primitive everything else is built from.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, m: Mins) -> bool {
        self.start <= m && m < self.end
    }
}

/// Minute-of-day, `00:00`..`23:59`. Booking boundaries are hour-aligned;
/// the type itself tolerates arbitrary minutes so stored `HH:MM:SS` values
/// normalize cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { minutes: 0 };

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self {
            minutes: u16::from(hour) * 60 + u16::from(minute),
        })
    }

    pub fn from_hour(hour: u8) -> Option<Self> {
        Self::new(hour, 0)
    }

    /// Parse `"HH:MM"` or `"HH:MM:SS"`. Seconds are stripped — stored time
    /// strings may carry them, comparisons must not.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(':');
        let hour: u8 = parts.next()?.parse().ok()?;
        let minute: u8 = parts.next()?.parse().ok()?;
        if let Some(secs) = parts.next() {
            let _: u8 = secs.parse().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Self::new(hour, minute)
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    pub fn minutes_from_midnight(&self) -> u16 {
        self.minutes
    }

    pub fn is_hour_aligned(&self) -> bool {
        self.minutes % 60 == 0
    }

    /// Add whole hours, wrapping at midnight. Returns the time-of-day only;
    /// whether the result lands on the next calendar day is the caller's
    /// problem (see `SlotRange::wraps_midnight`).
    pub fn add_hours(&self, hours: u8) -> Self {
        Self {
            minutes: (self.minutes + u16::from(hours) * 60) % MINS_PER_DAY as u16,
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A requested booking window: `hours` consecutive 1-hour slots starting at
/// `start` on `date`. May wrap past midnight into the next calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub hours: u8,
}

impl SlotRange {
    pub fn new(date: NaiveDate, start: TimeOfDay, hours: u8) -> Self {
        debug_assert!(hours > 0, "SlotRange must cover at least one hour");
        Self { date, start, hours }
    }

    pub fn span(&self) -> Span {
        let start = minute_of(self.date, self.start);
        Span::new(start, start + Mins::from(self.hours) * MINS_PER_HOUR)
    }

    /// End as a time-of-day. For overnight ranges this is numerically
    /// earlier than `start`.
    pub fn end_time(&self) -> TimeOfDay {
        self.start.add_hours(self.hours)
    }

    pub fn wraps_midnight(&self) -> bool {
        u16::from(self.start.hour()) + u16::from(self.hours) > 24
    }

    /// The 1-hour atomic slots of this range, each with its own calendar
    /// date — slots past midnight belong to the next day, which is what
    /// day-of-week and holiday lookups must see.
    pub fn hour_slots(&self) -> impl Iterator<Item = HourSlot> + '_ {
        let first = self.span().start;
        (0..self.hours).map(move |h| {
            let m = first + Mins::from(h) * MINS_PER_HOUR;
            HourSlot {
                date: date_of(m),
                start: time_of(m),
            }
        })
    }
}

/// One 1-hour atomic slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourSlot {
    pub date: NaiveDate,
    pub start: TimeOfDay,
}

impl HourSlot {
    pub fn span(&self) -> Span {
        let start = minute_of(self.date, self.start);
        Span::new(start, start + MINS_PER_HOUR)
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }
}

/// Court operating window. `close` is the last bookable *start* hour: a
/// court closing at 23:00 admits a booking that starts at 23:00 and ends
/// at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
}

impl OperatingHours {
    /// A 24-hour court: opens at midnight and the last bookable start hour
    /// is 23:00 or later. Only these courts admit overnight ranges.
    pub fn is_round_the_clock(&self) -> bool {
        self.open == TimeOfDay::MIDNIGHT && self.close.hour() >= 23
    }

    /// Whether a range fits the operating window. Non-24h courts must keep
    /// `start..start+hours` within `[open, close + 1h]`; 24h courts admit
    /// anything, including midnight wrap.
    pub fn admits(&self, range: &SlotRange) -> bool {
        if self.is_round_the_clock() {
            return true;
        }
        if range.wraps_midnight() {
            return false;
        }
        let start = u16::from(range.start.hour());
        let end = start + u16::from(range.hours);
        start >= u16::from(self.open.hour()) && end <= u16::from(self.close.hour()) + 1
    }

    /// Hourly start times a customer may pick, `open..=close`.
    pub fn bookable_start_hours(&self) -> Vec<TimeOfDay> {
        (self.open.hour()..=self.close.hour())
            .filter_map(TimeOfDay::from_hour)
            .collect()
    }
}

/// Hours used when a court has none configured: round the clock.
pub const ALL_DAY: OperatingHours = OperatingHours {
    open: TimeOfDay { minutes: 0 },
    close: TimeOfDay { minutes: 23 * 60 },
};

// ── Weekday set ──────────────────────────────────────────────────

/// Bitmask over weekdays, bit 0 = Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySet(pub u8);

impl DaySet {
    pub const NONE: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b0111_1111);
    pub const WEEKDAYS: DaySet = DaySet(0b0001_1111);
    pub const WEEKEND: DaySet = DaySet(0b0110_0000);

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut bits = 0u8;
        for d in days {
            bits |= 1 << d.num_days_from_monday();
        }
        Self(bits)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// Admin approval state of a court listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourtStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Pending and confirmed bookings occupy their slots; cancelled and
    /// completed ones are history.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// How the customer pays. Instant methods are verified at commit; manual
/// methods (bank transfer) wait for owner verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Instant,
    Manual,
}

/// When a pricing rule applies. Multipliers never stack — the highest
/// matching multiplier wins per hour-slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Time-of-day window on a set of weekdays.
    PeakHours {
        start: TimeOfDay,
        end: TimeOfDay,
        days: DaySet,
    },
    /// Saturday and Sunday.
    Weekend,
    /// A specific date, or a custom day-of-week set.
    Special {
        date: Option<NaiveDate>,
        days: DaySet,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: Ulid,
    pub court_id: Ulid,
    pub kind: RuleKind,
    pub multiplier: Decimal,
    pub active: bool,
}

impl PricingRule {
    /// Human-readable label recorded in price breakdowns.
    pub fn label(&self) -> String {
        match &self.kind {
            RuleKind::PeakHours { start, end, .. } => {
                format!("peak hours {start}-{end} x{}", self.multiplier)
            }
            RuleKind::Weekend => format!("weekend x{}", self.multiplier),
            RuleKind::Special { date: Some(d), .. } => {
                format!("special {d} x{}", self.multiplier)
            }
            RuleKind::Special { date: None, .. } => format!("special x{}", self.multiplier),
        }
    }
}

/// Global (cross-court) price override for a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    pub multiplier: Decimal,
    pub active: bool,
}

/// What a slot entry represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// A customer booking. Occupies its span while status is pending or
    /// confirmed.
    Booking {
        user_id: Ulid,
        status: BookingStatus,
        payment: PaymentStatus,
        total: Decimal,
        created_at: Ms,
    },
    /// Owner block — behaves like a booking for availability, carries no
    /// price or user.
    Block { reason: Option<String> },
    /// Short-lived exclusive claim while a user completes payment. Absent
    /// for everyone — including the holder — once `expires_at` has passed.
    Lock {
        user_id: Ulid,
        locked_at: Ms,
        expires_at: Ms,
    },
}

/// A single entry on a court's slot axis — bookings, blocks, and locks are
/// all just spans with a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub id: Ulid,
    pub span: Span,
    pub kind: EntryKind,
}

impl SlotEntry {
    /// Whether this entry makes its span busy for `user` at `now`.
    pub fn blocks(&self, user: Option<Ulid>, now: Ms) -> bool {
        match &self.kind {
            EntryKind::Booking { status, .. } => status.blocks_slot(),
            EntryKind::Block { .. } => true,
            EntryKind::Lock {
                user_id,
                expires_at,
                ..
            } => *expires_at > now && Some(*user_id) != user,
        }
    }
}

/// Full in-memory state of one court: listing fields plus every slot entry
/// and pricing rule, entries kept sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct CourtState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    pub base_price: Decimal,
    pub hours: Option<OperatingHours>,
    pub status: CourtStatus,
    pub active: bool,
    pub entries: Vec<SlotEntry>,
    pub rules: Vec<PricingRule>,
}

impl CourtState {
    pub fn new(
        id: Ulid,
        owner_id: Ulid,
        name: String,
        base_price: Decimal,
        hours: Option<OperatingHours>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            base_price,
            hours,
            status: CourtStatus::Pending,
            active: true,
            entries: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Operating window, defaulting to round-the-clock when unset.
    pub fn operating_hours(&self) -> OperatingHours {
        self.hours.unwrap_or(ALL_DAY)
    }

    /// Whether the court may take locks and bookings at all.
    pub fn is_bookable(&self) -> bool {
        self.status == CourtStatus::Approved && self.active
    }

    /// Insert an entry maintaining sort order by span.start.
    pub fn insert_entry(&mut self, entry: SlotEntry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    pub fn remove_entry(&mut self, id: Ulid) -> Option<SlotEntry> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .map(|pos| self.entries.remove(pos))
    }

    pub fn entry_mut(&mut self, id: Ulid) -> Option<&mut SlotEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Entries whose span overlaps the query window. Binary search skips
    /// everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &SlotEntry> {
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourtRegistered {
        id: Ulid,
        owner_id: Ulid,
        name: String,
        base_price: Decimal,
        hours: Option<OperatingHours>,
    },
    CourtUpdated {
        id: Ulid,
        name: String,
        base_price: Decimal,
        hours: Option<OperatingHours>,
        status: CourtStatus,
        active: bool,
    },
    CourtRemoved {
        id: Ulid,
    },
    RuleAdded {
        rule: PricingRule,
    },
    RuleRemoved {
        id: Ulid,
        court_id: Ulid,
    },
    HolidayAdded {
        holiday: Holiday,
    },
    HolidayRemoved {
        date: NaiveDate,
    },
    SlotBlocked {
        id: Ulid,
        court_id: Ulid,
        span: Span,
        reason: Option<String>,
    },
    SlotUnblocked {
        id: Ulid,
        court_id: Ulid,
    },
    LockAcquired {
        id: Ulid,
        court_id: Ulid,
        user_id: Ulid,
        span: Span,
        locked_at: Ms,
        expires_at: Ms,
    },
    LockReleased {
        id: Ulid,
        court_id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        court_id: Ulid,
        user_id: Ulid,
        span: Span,
        total: Decimal,
        status: BookingStatus,
        payment: PaymentStatus,
        created_at: Ms,
    },
    BookingStatusChanged {
        id: Ulid,
        court_id: Ulid,
        status: BookingStatus,
        payment: PaymentStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    pub base_price: Decimal,
    pub hours: Option<OperatingHours>,
    pub status: CourtStatus,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub court_id: Ulid,
    pub user_id: Ulid,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub hours: u8,
    pub total: Decimal,
    pub status: BookingStatus,
    pub payment: PaymentStatus,
    pub created_at: Ms,
}

impl BookingInfo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: Ulid,
        court_id: Ulid,
        user_id: Ulid,
        span: Span,
        total: Decimal,
        status: BookingStatus,
        payment: PaymentStatus,
        created_at: Ms,
    ) -> Self {
        Self {
            id,
            court_id,
            user_id,
            date: date_of(span.start),
            start: time_of(span.start),
            end: time_of(span.end),
            hours: (span.duration_mins() / MINS_PER_HOUR) as u8,
            total,
            status,
            payment,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: Ulid,
    pub court_id: Ulid,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub id: Ulid,
    pub court_id: Ulid,
    pub user_id: Ulid,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub locked_at: Ms,
    pub expires_at: Ms,
}
