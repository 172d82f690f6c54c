use ulid::Ulid;

use crate::model::BookingStatus;

/// Why a slot reads as busy. The boolean answer is authoritative; the
/// reason is for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// Slot start is already behind the clock.
    InPast,
    /// A pending or confirmed booking covers part of the range.
    Booked,
    /// An owner block covers part of the range.
    Blocked,
    /// Another user holds an unexpired lock on part of the range.
    Locked,
}

impl std::fmt::Display for BusyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusyReason::InPast => write!(f, "slot is in the past"),
            BusyReason::Booked => write!(f, "already booked"),
            BusyReason::Blocked => write!(f, "blocked by owner"),
            BusyReason::Locked => write!(f, "held by another user"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Court exists but is not approved + active.
    CourtNotBookable(Ulid),
    /// Bad input, rejected before touching persistence: duration out of
    /// bounds, misaligned start, or outside the operating window.
    InvalidRange(&'static str),
    /// Bad pricing-rule or holiday input.
    InvalidRule(&'static str),
    /// At least one sub-slot is busy at validation time. Recoverable —
    /// re-fetch availability and re-select.
    Unavailable(BusyReason),
    /// The atomic insert lost a genuine race: a conflicting entry appeared
    /// despite the caller's pre-check. Same caller remedy as Unavailable,
    /// logged distinctly because it means real contention.
    Conflict(Ulid),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    /// The persistence layer itself failed. Surfaced verbatim, never
    /// retried here — a silent retry could double-book.
    WalError(String),
}

impl EngineError {
    /// Conflicts and unavailability are expected under concurrent load;
    /// the caller should refresh and re-select rather than report a fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Unavailable(_) | EngineError::Conflict(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::CourtNotBookable(id) => {
                write!(f, "court {id} is not open for booking")
            }
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::InvalidRule(msg) => write!(f, "invalid rule: {msg}"),
            EngineError::Unavailable(reason) => write!(f, "slot unavailable: {reason}"),
            EngineError::Conflict(id) => write!(f, "slot just taken, conflicts with: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid booking transition: {from:?} -> {to:?}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
