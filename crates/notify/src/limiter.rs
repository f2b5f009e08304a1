//! Per-day cap on repeated alarms.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use logpush_core::LogEvent;

#[derive(Debug)]
struct DayCounts {
    day: NaiveDate,
    counts: HashMap<String, u64>,
}

/// Counts dispatches per rule, host, source and message signature for the
/// current UTC day. A cap of 0 disables the limiter.
#[derive(Debug)]
pub struct DailyLimiter {
    max_per_day: u64,
    state: Mutex<DayCounts>,
}

impl DailyLimiter {
    pub fn new(max_per_day: u64, now: DateTime<Utc>) -> Self {
        Self {
            max_per_day,
            state: Mutex::new(DayCounts {
                day: now.date_naive(),
                counts: HashMap::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_per_day > 0
    }

    fn key(rule: &str, event: &LogEvent) -> String {
        format!("{rule}|{}|{}|{}", event.host, event.source, event.short_message())
    }

    /// Count one dispatch of `event` for `rule`. Returns `false` once the
    /// key has reached the cap today.
    pub fn admit(&self, rule: &str, event: &LogEvent, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut state = self.state.lock().expect("limiter lock poisoned");
        let today = now.date_naive();
        if today != state.day {
            for (key, count) in &state.counts {
                info!(key = %key, count, day = %state.day, "alarm count for previous day");
            }
            info!(previous = %state.day, "daily alarm counters reset");
            state.day = today;
            state.counts.clear();
        }

        let count = state.counts.entry(Self::key(rule, event)).or_insert(0);
        if *count >= self.max_per_day {
            warn!(
                rule,
                host = %event.host,
                source = %event.source,
                max_per_day = self.max_per_day,
                "daily alarm cap reached, event dropped"
            );
            return false;
        }
        *count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_support::event_at;

    #[test]
    fn zero_cap_admits_everything() {
        let now = Utc::now();
        let limiter = DailyLimiter::new(0, now);
        let ev = event_at("boom", now);
        assert!((0..100).all(|_| limiter.admit("R", &ev, now)));
    }

    #[test]
    fn cap_applies_per_key() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap();
        let limiter = DailyLimiter::new(2, now);
        let ev = event_at("boom at com.example.Foo", now);

        assert!(limiter.admit("R", &ev, now));
        assert!(limiter.admit("R", &ev, now));
        assert!(!limiter.admit("R", &ev, now));

        // same signature once the stack trace is cut
        let same = event_at("boom at com.example.Other", now);
        assert!(!limiter.admit("R", &same, now));

        assert!(limiter.admit("OTHER", &ev, now));
        assert!(limiter.admit("R", &event_at("different", now), now));
    }

    #[test]
    fn counters_reset_on_new_day() {
        let day1 = Utc.with_ymd_and_hms(2026, 2, 16, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 2, 17, 0, 1, 0).unwrap();
        let limiter = DailyLimiter::new(1, day1);
        let ev = event_at("boom", day1);

        assert!(limiter.admit("R", &ev, day1));
        assert!(!limiter.admit("R", &ev, day1));
        assert!(limiter.admit("R", &ev, day2));
    }
}
