/// Injected time source
///
/// Shuffle-history aging, cache eviction scores and snapshot debouncing
/// all compare wall-clock timestamps. Routing them through this trait
/// lets tests substitute a manually-advanced clock.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
