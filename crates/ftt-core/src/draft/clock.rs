// Pick clock: deadline and remaining-time arithmetic over daily active hours.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, Result};

/// Daily window `[start_hour, end_hour)` during which a pick clock runs.
///
/// Hours are wall-clock hours in the league's timezone. `end_hour` may be 24
/// (the window runs until midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    start_hour: u32,
    end_hour: u32,
}

impl Default for ActiveHours {
    /// The whole day.
    fn default() -> Self {
        ActiveHours { start_hour: 0, end_hour: 24 }
    }
}

impl ActiveHours {
    /// Validate and build a window. Zero-length and inverted windows are
    /// rejected since no clock time would ever elapse.
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        if end_hour > 24 {
            return Err(LeagueError::InvalidDraftConfiguration(format!(
                "active hours end {end_hour} is past midnight"
            )));
        }
        if start_hour >= end_hour {
            return Err(LeagueError::InvalidDraftConfiguration(format!(
                "active hours {start_hour}..{end_hour} must start before they end"
            )));
        }
        Ok(ActiveHours { start_hour, end_hour })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    /// Length of one day's window.
    pub fn daily_span(&self) -> Duration {
        Duration::hours(i64::from(self.end_hour - self.start_hour))
    }
}

/// Clock arithmetic for one draft's active hours in a given timezone.
#[derive(Debug, Clone)]
pub struct PickClock<Tz: TimeZone> {
    hours: ActiveHours,
    tz: Tz,
}

impl<Tz: TimeZone> PickClock<Tz> {
    pub fn new(hours: ActiveHours, tz: Tz) -> Self {
        PickClock { hours, tz }
    }

    /// The instant at which `limit_minutes` of active time starting at
    /// `started_at` is used up.
    pub fn deadline(&self, started_at: DateTime<Utc>, limit_minutes: u32) -> DateTime<Utc> {
        let mut remaining = Duration::minutes(i64::from(limit_minutes));
        let mut current = started_at;

        loop {
            let date = self.local_date(current);
            let (window_start, window_end) = self.window(date);

            if current < window_start {
                current = window_start;
            } else if current >= window_end {
                current = self.next_window_start(date);
                continue;
            }

            let available = window_end - current;
            if remaining <= available {
                return current + remaining;
            }
            remaining = remaining - available;
            current = self.next_window_start(date);
        }
    }

    /// Active seconds elapsed between `start` and `end`.
    pub fn elapsed_active(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
        if start >= end {
            return Duration::zero();
        }

        let last = self.local_date(end);
        let mut date = self.local_date(start);
        let mut total = Duration::zero();

        while date <= last {
            let (window_start, window_end) = self.window(date);
            let from = start.max(window_start);
            let to = end.min(window_end);
            if from < to {
                total = total + (to - from);
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        total
    }

    /// Seconds left on a position's clock at `now`, clamped at zero.
    ///
    /// A clock that has not started (no `started_at`, or the position is not
    /// current) reports the full limit.
    pub fn remaining_seconds(
        &self,
        started_at: Option<DateTime<Utc>>,
        is_current: bool,
        limit_minutes: u32,
        now: DateTime<Utc>,
    ) -> i64 {
        let limit = i64::from(limit_minutes) * 60;
        let Some(started_at) = started_at.filter(|_| is_current) else {
            return limit;
        };
        let elapsed = self.elapsed_active(started_at, now).num_seconds();
        (limit - elapsed).max(0)
    }

    /// When the position's clock runs out. A clock that has not started is
    /// treated as starting now without active-hour adjustment.
    pub fn expires_at(
        &self,
        started_at: Option<DateTime<Utc>>,
        is_current: bool,
        limit_minutes: u32,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match started_at.filter(|_| is_current) {
            Some(started_at) => self.deadline(started_at, limit_minutes),
            None => now + Duration::minutes(i64::from(limit_minutes)),
        }
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    fn window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = date.and_time(NaiveTime::MIN);
        let start = midnight + Duration::hours(i64::from(self.hours.start_hour));
        let end = midnight + Duration::hours(i64::from(self.hours.end_hour));
        (self.resolve_local(start), self.resolve_local(end))
    }

    fn next_window_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let next = date.succ_opt().unwrap_or(date);
        self.window(next).0
    }

    /// Map a local wall-clock time to an instant. Ambiguous times take the
    /// earlier instant; times inside a DST gap move forward until they exist.
    fn resolve_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let mut candidate = local;
        for _ in 0..8 {
            match self.tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => return dt.with_timezone(&Utc),
                LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
                LocalResult::None => candidate = candidate + Duration::minutes(30),
            }
        }
        Utc.from_utc_datetime(&local)
    }
}
