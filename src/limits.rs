//! Hard input limits. Everything here is enforced at the engine boundary
//! and rejected with `EngineError::LimitExceeded` or `InvalidRange`.

use crate::model::Ms;

/// Booking duration bounds in whole hours.
pub const MIN_BOOKING_HOURS: u8 = 1;
pub const MAX_BOOKING_HOURS: u8 = 8;

/// Default slot-lock TTL: 5 minutes.
pub const DEFAULT_LOCK_TTL_MS: Ms = 5 * 60 * 1000;

pub const MAX_COURTS: usize = 100_000;
pub const MAX_ENTRIES_PER_COURT: usize = 100_000;
pub const MAX_RULES_PER_COURT: usize = 1_000;
pub const MAX_HOLIDAYS: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 1_024;

/// Widest day-grid / booking-list query window, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;
