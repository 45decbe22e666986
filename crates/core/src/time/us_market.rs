use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

// Fixed ET offset (UTC-5). DST shifts the cutoff by an hour, which is
// acceptable slack for an end-of-day job.
const ET_OFFSET_SECS: i32 = -5 * 3600;

// If the job runs before this time (ET), treat it as "yesterday's" market
// date. NYSE close is 16:00 ET; we add an hour for settled data.
const CLOSE_CUTOFF_HOUR_ET: u32 = 17;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 0;

pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }

    let et = chrono::FixedOffset::east_opt(ET_OFFSET_SECS).context("invalid ET offset")?;
    let now_et = now_utc.with_timezone(&et);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    // Roll back to previous business day.
    let holidays = configured_holidays();
    while is_weekend(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Minimal set of fixed-date NYSE closures.
    // Extend via US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        if let Some(d) = NaiveDate::from_ymd_opt(y, 1, 1) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 7, 4) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 12, 25) {
            out.insert(d);
        }
    }

    if let Ok(s) = std::env::var("US_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_arg_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let d = resolve_as_of_date(Some("2026-01-02"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2026-01-06 15:00 UTC = 10:00 ET (<17:00 cutoff) -> Monday 01-05.
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 15, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2026-01-06 23:00 UTC = 18:00 ET (>=17:00 cutoff).
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 23, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
    }

    #[test]
    fn rolls_back_over_weekend_and_holiday() {
        // 2026-01-04 is Sunday; before cutoff base is Saturday 01-03, then
        // weekend rollback lands on Friday 01-02 (01-01 is a holiday).
        let now = Utc.with_ymd_and_hms(2026, 1, 4, 15, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }
}
