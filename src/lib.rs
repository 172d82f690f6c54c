//! In-memory court reservation core with write-ahead durability.
//!
//! Courts are bookable in whole-hour slots. Every court's slot state lives
//! behind its own async lock; a booking commit re-validates availability
//! and re-prices the range under that lock, and nothing becomes visible
//! before the WAL fsync acks. Slot locks give a user five minutes of
//! exclusivity while they pay, expiring lazily.

pub mod clock;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod wal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    BusyReason, Engine, EngineError, HourPrice, PriceQuote, PriceSummary, SlotStatus,
};
pub use notify::NotifyHub;
