// src/domain/cadence.rs
// Subscription cadence and timezone-aware anchor computation

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Biweekly => "biweekly",
            Cadence::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Cadence::Daily),
            "weekly" => Some(Cadence::Weekly),
            "biweekly" => Some(Cadence::Biweekly),
            "monthly" => Some(Cadence::Monthly),
            _ => None,
        }
    }

    /// Compute the next cadence-anchored delivery time strictly after `from`,
    /// in the subscriber's local timezone:
    /// - daily -> next day 09:00 local
    /// - weekly -> next Monday 09:00 local
    /// - biweekly -> two weeks from this Monday, 09:00 local
    /// - monthly -> first of next month, 09:00 local
    pub fn next_anchor(&self, from: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let local = from.with_timezone(&tz);
        let anchor_time = NaiveTime::from_hms_opt(9, 0, 0).expect("valid constant time");

        let local_anchor = match self {
            Cadence::Daily => (local.date_naive() + Duration::days(1)).and_time(anchor_time),
            Cadence::Weekly => {
                let days_until_monday = days_until_weekday(local.date_naive(), chrono::Weekday::Mon);
                let candidate = local.date_naive() + Duration::days(days_until_monday as i64);
                candidate.and_time(anchor_time)
            }
            Cadence::Biweekly => {
                let current = local.date_naive().weekday().num_days_from_monday();
                let this_monday = local.date_naive() - Duration::days(current as i64);
                (this_monday + Duration::weeks(2)).and_time(anchor_time)
            }
            Cadence::Monthly => {
                let next_month_first = first_of_next_month(local.date_naive());
                next_month_first.and_time(anchor_time)
            }
        };

        resolve_local(tz, local_anchor)
    }
}

/// Days to add to reach the next occurrence of `target` strictly after
/// `from` (0 is never returned: "next Monday" always means a future date,
/// even if `from` itself is a Monday).
fn days_until_weekday(from: NaiveDate, target: chrono::Weekday) -> u32 {
    let current = from.weekday().num_days_from_monday();
    let target_n = target.num_days_from_monday();
    let diff = (target_n + 7 - current) % 7;
    if diff == 0 { 7 } else { diff }
}

fn first_of_next_month(from: NaiveDate) -> NaiveDate {
    let (year, month) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid first-of-month date")
}

/// Resolve a naive local datetime against a timezone, nudging forward past a
/// DST "spring forward" gap rather than panicking or silently picking the
/// earlier of two "fall back" instants incorrectly.
fn resolve_local(tz: Tz, naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _latest) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let nudged = naive + Duration::hours(1);
            tz.from_local_datetime(&nudged)
                .single()
                .unwrap_or_else(|| tz.from_utc_datetime(&nudged))
                .with_timezone(&Utc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn weekly_anchors_to_next_monday_nine_am_new_york() {
        // 2025-10-15T14:22:00-04:00 (Wednesday, America/New_York)
        let tz: Tz = "America/New_York".parse().unwrap();
        let from = tz
            .with_ymd_and_hms(2025, 10, 15, 14, 22, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = Cadence::Weekly.next_anchor(from, tz);
        let next_local = next.with_timezone(&tz);

        assert_eq!(next_local.year(), 2025);
        assert_eq!(next_local.month(), 10);
        assert_eq!(next_local.day(), 20);
        assert_eq!(next_local.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn daily_anchors_to_tomorrow_nine_am() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let from = tz.with_ymd_and_hms(2025, 10, 15, 3, 0, 0).unwrap().with_timezone(&Utc);
        let next = Cadence::Daily.next_anchor(from, tz).with_timezone(&tz);
        assert_eq!(next.day(), 16);
        assert_eq!(next.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn monthly_anchors_to_first_of_next_month() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let from = tz.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap().with_timezone(&Utc);
        let next = Cadence::Monthly.next_anchor(from, tz).with_timezone(&tz);
        assert_eq!(next.month(), 11);
        assert_eq!(next.day(), 1);
    }

    #[test]
    fn biweekly_is_two_weeks_after_this_monday() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let from = tz.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap().with_timezone(&Utc);
        let next = Cadence::Biweekly.next_anchor(from, tz).with_timezone(&tz);
        assert_eq!(next.month(), 10);
        assert_eq!(next.day(), 27);
    }
}
