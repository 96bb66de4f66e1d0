//! Time source used to stamp `createdAt`/`updatedAt`.

use chrono::{DateTime, Utc};

use crate::entity::truncate_to_millis;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to the millisecond precision timestamps are stored with.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}
