//! In-game time arithmetic
//!
//! Time-of-day is minutes past midnight in `0..1440`; the day counter starts
//! at 1 and is unbounded. Absolute minutes (`day * 1440 + time_of_day`) give a
//! single monotonic axis for comparisons and boundary checks.

use crate::game::constants::time::{MINUTES_PER_DAY, MINUTES_PER_HOUR};

/// Collapse a (day, time-of-day) pair onto the absolute minute axis
#[inline]
pub fn absolute_minutes(current_day: u32, time_of_day: u32) -> u64 {
    current_day as u64 * MINUTES_PER_DAY as u64 + time_of_day as u64
}

/// Split an absolute minute back into (day, time-of-day)
#[inline]
pub fn from_absolute(absolute: u64) -> (u32, u32) {
    let day = absolute / MINUTES_PER_DAY as u64;
    let time = absolute % MINUTES_PER_DAY as u64;
    (day as u32, time as u32)
}

/// Advance a clock by `minutes`, wrapping time-of-day into the next day(s)
///
/// Returns the new `(time_of_day, current_day)`.
pub fn advance(time_of_day: u32, current_day: u32, minutes: u32) -> (u32, u32) {
    let total = time_of_day as u64 + minutes as u64;
    let days = total / MINUTES_PER_DAY as u64;
    let time = (total % MINUTES_PER_DAY as u64) as u32;
    (time, current_day.saturating_add(days as u32))
}

/// Whether a move from `start` to `end` (absolute minutes) rolls over a
/// multiple of `interval`
#[inline]
pub fn crossed_boundary(start: u64, end: u64, interval: u32) -> bool {
    if interval == 0 {
        return start != end;
    }
    start / interval as u64 != end / interval as u64
}

/// Hour of day for a time-of-day value
#[inline]
pub fn hour_of(time_of_day: u32) -> u32 {
    (time_of_day % MINUTES_PER_DAY) / MINUTES_PER_HOUR
}

/// Format a time-of-day as `HH:MM`
pub fn format_clock(time_of_day: u32) -> String {
    let t = time_of_day % MINUTES_PER_DAY;
    format!("{:02}:{:02}", t / MINUTES_PER_HOUR, t % MINUTES_PER_HOUR)
}

/// Human-readable span, e.g. "1 hour and 20 minutes"
pub fn describe_span(minutes: u32) -> String {
    let hours = minutes / MINUTES_PER_HOUR;
    let mins = minutes % MINUTES_PER_HOUR;
    let plural = |n: u32, word: &str| {
        if n == 1 {
            format!("{} {}", n, word)
        } else {
            format!("{} {}s", n, word)
        }
    };
    match (hours, mins) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} and {}", plural(h, "hour"), plural(m, "minute")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_within_day() {
        assert_eq!(advance(480, 1, 30), (510, 1));
    }

    #[test]
    fn test_advance_wraps_midnight() {
        assert_eq!(advance(1430, 1, 20), (10, 2));
    }

    #[test]
    fn test_advance_multiple_days() {
        assert_eq!(advance(0, 3, MINUTES_PER_DAY * 2 + 5), (5, 5));
    }

    #[test]
    fn test_absolute_round_trip() {
        let abs = absolute_minutes(7, 1234);
        assert_eq!(from_absolute(abs), (7, 1234));
    }

    #[test]
    fn test_crossed_boundary() {
        // 10:59 -> 11:00
        assert!(crossed_boundary(659, 660, 60));
        // 11:00 -> 11:59
        assert!(!crossed_boundary(660, 719, 60));
        assert!(crossed_boundary(absolute_minutes(1, 1430), absolute_minutes(2, 10), 120));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(605), "10:05");
        assert_eq!(format_clock(1439), "23:59");
    }

    #[test]
    fn test_describe_span() {
        assert_eq!(describe_span(20), "20 minutes");
        assert_eq!(describe_span(60), "1 hour");
        assert_eq!(describe_span(81), "1 hour and 21 minutes");
        assert_eq!(describe_span(121), "2 hours and 1 minute");
    }
}
