// src/engine/timer.rs

use chrono::{DateTime, Duration, Utc};

/// Countdown derived from a durable start time.
///
/// Nothing ticks: every query recomputes from `now`, so a restart loses no time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamTimer {
    started_at: DateTime<Utc>,
    limit_seconds: Option<u32>,
}

impl ExamTimer {
    pub fn start(started_at: DateTime<Utc>, limit_seconds: Option<u32>) -> Self {
        Self {
            started_at,
            limit_seconds,
        }
    }

    pub fn is_timed(&self) -> bool {
        self.limit_seconds.is_some()
    }

    /// Moment the attempt runs out of time, if timed.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.limit_seconds
            .map(|limit| self.started_at + Duration::seconds(i64::from(limit)))
    }

    /// Time since start, clamped at zero if the clock stepped backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    /// Whole seconds left, rounded up so a running exam never reports 0.
    /// `None` for untimed exams.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let limit = self.limit_seconds?;
        let left = Duration::seconds(i64::from(limit)) - self.elapsed(now);
        let left = left.num_milliseconds();
        if left <= 0 {
            return Some(0);
        }
        Some((left as u64).div_ceil(1000))
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        match self.limit_seconds {
            Some(limit) => self.elapsed(now) >= Duration::seconds(i64::from(limit)),
            None => false,
        }
    }
}
