//! Commit timepoints

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// A point on the store's version timeline, in milliseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timepoint(i64);

impl Timepoint {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// The timepoint immediately before this one
    pub fn previous(&self) -> Self {
        Self(self.0 - 1)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl std::fmt::Display for Timepoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Timepoint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Hands out strictly increasing timepoints
///
/// Wall-clock based, but never repeats or goes backwards within a process,
/// so every commit gets a distinct version start.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after an already used timepoint (e.g. the newest one in the store)
    pub fn starting_after(timepoint: Timepoint) -> Self {
        Self {
            last: AtomicI64::new(timepoint.as_millis()),
        }
    }

    pub fn tick(&self) -> Timepoint {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timepoint(next),
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ticks_strictly_increase() {
        let clock = Clock::new();
        let mut previous = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_starting_after_future_timepoint() {
        let far = Timepoint::from_millis(Utc::now().timestamp_millis() + 1_000_000);
        let clock = Clock::starting_after(far);
        assert_eq!(clock.tick(), Timepoint::from_millis(far.as_millis() + 1));
    }

    #[test]
    fn test_ticks_unique_across_threads() {
        let clock = Arc::new(Clock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..250).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Timepoint> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_timepoint_parse_and_display() {
        let t: Timepoint = "1700000000000".parse().unwrap();
        assert_eq!(t.to_string(), "1700000000000");
        assert_eq!(t.previous().as_millis(), 1_699_999_999_999);
        assert!(t.to_datetime().is_some());
    }
}
