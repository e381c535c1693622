//! Time source abstraction.
//!
//! Reservation schedules are wall-clock times in the platform's home timezone
//! (Asia/Seoul, UTC+9, no DST). Refund windows compare that civil time against
//! "now" converted into the same timezone, so every decision path takes a
//! `Clock` instead of calling `Utc::now()` directly.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

pub const CIVIL_TZ_LABEL: &str = "Asia/Seoul";
pub const CIVIL_UTC_OFFSET_SECS: i32 = 9 * 3600;

pub fn civil_offset() -> FixedOffset {
    // The offset is a compile-time constant inside chrono's valid range
    FixedOffset::east_opt(CIVIL_UTC_OFFSET_SECS).expect("UTC+9 is a valid fixed offset")
}

/// Injectable time source
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current wall-clock time in the platform timezone.
    fn civil_now(&self) -> NaiveDateTime {
        self.now_utc().with_timezone(&civil_offset()).naive_local()
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Real wall clock
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests and replayable decisions
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Freeze at a wall-clock instant in the platform timezone.
    pub fn at_civil(civil: NaiveDateTime) -> Self {
        let instant = civil_offset()
            .from_local_datetime(&civil)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            // Fixed-offset zones have no gaps or folds; this arm is unreachable
            .unwrap_or_else(Utc::now);
        Self { now: instant }
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }
}

pub fn civil_datetime(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// Signed fractional hours from `from` to `to` (negative when `to` is past).
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    let delta: Duration = to - from;
    delta.num_seconds() as f64 / 3600.0
}

pub fn format_civil(dt: NaiveDateTime) -> String {
    format!("{} ({})", dt.format("%Y-%m-%d %H:%M"), CIVIL_TZ_LABEL)
}
