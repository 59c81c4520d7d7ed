// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::ops::Deref;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use git2::Time;

static DATE_FORMAT: &str = "%Y-%m-%d";

/// Wraps `git2::Time` so the offset-aware arithmetic needed to stamp commit
/// identities (author/committer time on the tree synthesised for a fetched
/// repository) doesn't get reinvented at every call site.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitTime(Time);

impl GitTime {
    pub fn new(t: Time) -> GitTime {
        GitTime(t)
    }

    pub fn now() -> GitTime {
        let now: DateTime<Utc> = Utc::now();
        GitTime(Time::new(now.timestamp(), 0))
    }

    pub fn into_inner(self) -> Time {
        self.0
    }
}

impl AsRef<Time> for GitTime {
    fn as_ref(&self) -> &Time {
        &self.0
    }
}

impl Deref for GitTime {
    type Target = Time;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for GitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitTime")
            .field("seconds", &self.0.seconds())
            .field("offset_minutes", &self.0.offset_minutes())
            .finish()
    }
}

impl From<Time> for GitTime {
    fn from(t: Time) -> Self {
        GitTime(t)
    }
}

impl From<DateTime<FixedOffset>> for GitTime {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        GitTime(Time::new(dt.timestamp(), dt.offset().local_minus_utc() / 60))
    }
}

impl From<GitTime> for DateTime<FixedOffset> {
    fn from(gt: GitTime) -> Self {
        let offset = FixedOffset::west_opt(gt.0.offset_minutes() * -60).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        offset.from_utc_datetime(
            &NaiveDateTime::from_timestamp_opt(gt.0.seconds(), 0).unwrap_or_else(|| NaiveDateTime::from_timestamp_opt(0, 0).unwrap()),
        )
    }
}

/// Reads `SOURCE_DATE_EPOCH` (seconds since the Unix epoch) for embedding a
/// reproducible build timestamp in version reporting. Falls back to the
/// current time when unset or unparseable.
pub fn source_date_epoch_or_now() -> DateTime<Utc> {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

pub fn unix_seconds_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?
        .as_secs())
}

/// A monotonic start/end pair for bracketing one execution step.
/// `worker_start`/`worker_completed` in an action's execution log are
/// derived from a pair of these, read from a high-resolution clock
/// immediately before and after running the action's command.
#[derive(Debug, Clone, Copy)]
pub struct WorkerClock {
    wall_start: DateTime<Utc>,
    mono_start: Instant,
}

impl WorkerClock {
    pub fn start() -> Self {
        Self {
            wall_start: Utc::now(),
            mono_start: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.wall_start
    }

    pub fn completed_at(&self) -> (DateTime<Utc>, Duration) {
        (Utc::now(), self.mono_start.elapsed())
    }
}

pub fn formatted_date_in_past(days_into_past: i64) -> Result<String> {
    let today = Utc::now().date_naive();
    let past = today
        .checked_sub_signed(chrono::Duration::days(days_into_past))
        .with_context(|| format!("could not determine date {days_into_past} days ago"))?;
    Ok(past.format(DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_time_round_trips_through_fixed_offset() {
        let gt = GitTime::new(Time::new(1644255296, -5 * 60));
        let dt: DateTime<FixedOffset> = gt.clone().into();
        assert_eq!(GitTime::from(dt), gt);
    }

    #[test]
    fn source_date_epoch_is_honoured_when_set() {
        std::env::set_var("SOURCE_DATE_EPOCH", "1000000000");
        let dt = source_date_epoch_or_now();
        assert_eq!(dt.timestamp(), 1_000_000_000);
        std::env::remove_var("SOURCE_DATE_EPOCH");
    }

    #[test]
    fn worker_clock_elapsed_is_nonnegative() {
        let clock = WorkerClock::start();
        let (_end, elapsed) = clock.completed_at();
        assert!(elapsed >= Duration::ZERO);
    }
}
