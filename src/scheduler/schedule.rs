use crate::config::WatcherConfig;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::warn;

/// Rewrites a standard 5-field expression (day of week `0`-`7`, Sunday as `0` or `7`)
/// into the 6-field dialect of the `cron` crate (seconds first, Sunday as `1`).
/// 6 and 7 field expressions are already in that dialect and returned unchanged.
pub fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, day, month, weekday] => format!(
            "0 {minute} {hour} {day} {month} {}",
            standard_day_of_week(weekday)
        ),
        _ => expression.to_string(),
    }
}

/// Day names mean the same in both dialects; numeric days are shifted by one.
/// A field that cannot be read is passed through for the parser to reject.
fn standard_day_of_week(field: &str) -> String {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return field.to_string();
    }
    match expand_standard_days(field) {
        Some(days) => days
            .into_iter()
            .map(|day| (day + 1).to_string())
            .collect::<Vec<_>>()
            .join(","),
        None => field.to_string(),
    }
}

/// Expands a numeric standard day-of-week field into days `0..=6` (Sunday = 0).
fn expand_standard_days(field: &str) -> Option<BTreeSet<u32>> {
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<u32>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((start, end)) = range.split_once('-') {
            (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?)
        } else {
            let start = range.parse::<u32>().ok()?;
            if item.contains('/') {
                (start, 6)
            } else {
                (start, start)
            }
        };
        if start > end || end > 7 {
            return None;
        }
        for day in (start..=end).step_by(step as usize) {
            days.insert(day % 7);
        }
    }
    Some(days)
}

pub fn parse_cron(expression: &str) -> std::result::Result<Schedule, cron::error::Error> {
    Schedule::from_str(&normalize_cron(expression))
}

/// Next-run computation for one watcher.
#[derive(Debug, Clone)]
pub struct WatcherSchedule {
    watcher: String,
    cron: Option<Schedule>,
    fallback: Duration,
}

impl WatcherSchedule {
    pub fn new(watcher: &WatcherConfig, fallback: std::time::Duration) -> Self {
        let fallback = Duration::from_std(fallback).unwrap_or_else(|_| Duration::minutes(5));
        let cron = watcher.cron_expression().and_then(|expr| match parse_cron(expr) {
            Ok(schedule) => Some(schedule),
            Err(err) => {
                warn!(
                    watcher = %watcher.name,
                    expression = expr,
                    error = %err,
                    "invalid cron expression, using fixed interval"
                );
                None
            }
        });
        Self {
            watcher: watcher.name.clone(),
            cron,
            fallback,
        }
    }

    pub fn has_cron(&self) -> bool {
        self.cron.is_some()
    }

    /// First occurrence strictly after `last`, or `last + fallback` when there is
    /// no usable cron occurrence.
    pub fn next_after(&self, last: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(schedule) = &self.cron {
            if let Some(next) = schedule.after(&last).next() {
                return next;
            }
            warn!(
                watcher = %self.watcher,
                "cron expression has no further occurrence, using fixed interval"
            );
        }
        last.checked_add_signed(self.fallback).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityKind;
    use chrono::{TimeZone, Timelike};

    fn watcher(cron: &str) -> WatcherConfig {
        WatcherConfig::new("w", "/tmp/in", EntityKind::Customer).cron(cron)
    }

    fn every_five_minutes() -> std::time::Duration {
        std::time::Duration::from_secs(300)
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    /// The next `count` runs starting from `start`, re-arming after each one.
    fn runs(expression: &str, start: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let schedule = WatcherSchedule::new(&watcher(expression), every_five_minutes());
        assert!(schedule.has_cron(), "{expression} did not parse");
        let mut last = start;
        (0..count)
            .map(|_| {
                last = schedule.next_after(last);
                last
            })
            .collect()
    }

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 9 * * 1-5"), "0 0 9 * * 2,3,4,5,6");
        assert_eq!(normalize_cron("0 9 * * 0,7"), "0 0 9 * * 1");
        assert_eq!(normalize_cron("0 9 * * */2"), "0 0 9 * * 1,3,5,7");
        assert_eq!(normalize_cron("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
        assert_eq!(normalize_cron(" 30 0 12 * * * "), "30 0 12 * * *");
    }

    #[test]
    fn test_day_of_week_uses_standard_numbering() {
        // 2024-01-07 is a Sunday.
        let sunday = at(7, 0, 0);
        assert_eq!(runs("0 9 * * 1", sunday, 2), vec![at(8, 9, 0), at(15, 9, 0)]);
        assert_eq!(
            runs("0 9 * * 1-5", sunday, 6),
            vec![
                at(8, 9, 0),
                at(9, 9, 0),
                at(10, 9, 0),
                at(11, 9, 0),
                at(12, 9, 0),
                at(15, 9, 0)
            ]
        );
        assert_eq!(runs("0 9 * * 0", sunday, 2), vec![at(7, 9, 0), at(14, 9, 0)]);
        assert_eq!(runs("0 9 * * 7", sunday, 2), vec![at(7, 9, 0), at(14, 9, 0)]);
        assert_eq!(
            runs("30 18 * * 5-7", sunday, 4),
            vec![at(7, 18, 30), at(12, 18, 30), at(13, 18, 30), at(14, 18, 30)]
        );
        assert_eq!(
            runs("0 0 * * */2", sunday, 4),
            vec![at(9, 0, 0), at(11, 0, 0), at(13, 0, 0), at(14, 0, 0)]
        );
    }

    #[test]
    fn test_out_of_range_day_of_week_falls_back() {
        let schedule = WatcherSchedule::new(&watcher("0 9 * * 8"), every_five_minutes());
        assert!(!schedule.has_cron());
    }

    #[test]
    fn test_next_run_is_strictly_after_now() {
        let schedule = WatcherSchedule::new(&watcher("*/5 * * * *"), every_five_minutes());
        assert!(schedule.has_cron());

        let on_boundary = Utc.with_ymd_and_hms(2024, 3, 10, 8, 15, 0).unwrap();
        assert_eq!(
            schedule.next_after(on_boundary),
            Utc.with_ymd_and_hms(2024, 3, 10, 8, 20, 0).unwrap()
        );

        let between = Utc.with_ymd_and_hms(2024, 3, 10, 8, 16, 42).unwrap();
        let next = schedule.next_after(between);
        assert!(next > between);
        assert_eq!(next.minute() % 5, 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_occurrences_across_year_boundary() {
        let start = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 30).unwrap();
        let jan = |day: u32, hour: u32, minute: u32| {
            Utc.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap()
        };
        assert_eq!(
            runs("0 */2 * * *", start, 3),
            vec![jan(1, 0, 0), jan(1, 2, 0), jan(1, 4, 0)]
        );
        assert_eq!(
            runs("15 10 * * *", start, 2),
            vec![jan(1, 10, 15), jan(2, 10, 15)]
        );
        // Steps restart at the top of every hour: ..., 49, 56, 0, 7.
        assert_eq!(
            runs("*/7 * * * *", jan(1, 0, 50), 3),
            vec![jan(1, 0, 56), jan(1, 1, 0), jan(1, 1, 7)]
        );
    }

    #[test]
    fn test_invalid_or_missing_cron_uses_fallback() {
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let invalid = WatcherSchedule::new(&watcher("not a cron"), every_five_minutes());
        assert!(!invalid.has_cron());
        assert_eq!(invalid.next_after(last), last + Duration::minutes(5));

        let none = WatcherSchedule::new(&watcher(""), every_five_minutes());
        assert!(!none.has_cron());
        assert_eq!(none.next_after(last), last + Duration::minutes(5));
    }

    #[test]
    fn test_huge_fallback_does_not_overflow() {
        let schedule = WatcherSchedule::new(
            &watcher(""),
            std::time::Duration::from_secs(60 * 60 * 24 * 365 * 100_000_000),
        );
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(schedule.next_after(last) > last);
    }

    #[test]
    fn test_exhausted_cron_uses_fallback() {
        // Seconds, minutes, hours, day of month, month, day of week, year.
        let schedule = WatcherSchedule::new(&watcher("0 0 0 1 1 * 2020"), every_five_minutes());
        assert!(schedule.has_cron());
        let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(schedule.next_after(last), last + Duration::minutes(5));
    }
}
