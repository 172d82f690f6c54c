use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::{Mins, Ms};

/// Time source for the engine. Injectable so lock expiry and past-slot
/// rejection are deterministic under test.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in unix milliseconds.
    fn now_ms(&self) -> Ms;

    /// Current position on the slot axis.
    fn now_minute(&self) -> Mins {
        self.now_ms() / 60_000
    }
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time after unix epoch")
            .as_millis() as Ms
    }
}

/// Hand-cranked clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn at(ms: Ms) -> Arc<Self> {
        Arc::new(Self {
            ms: AtomicI64::new(ms),
        })
    }

    pub fn set(&self, ms: Ms) {
        self.ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: Ms) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.ms.load(Ordering::SeqCst)
    }
}
