//! Next-due-date computation for recurring subscriptions.
//!
//! Solar periods are applied as `expiry + k * period` from the original
//! anchor, so a month-end expiry does not drift after passing a short month.
//! Lunar periods step through lunar months (leap months included) and clamp
//! the anchor day to the length of the month they land on.

use chrono::{Datelike, Days, Months, NaiveDate};
use subtrack_core::{Period, PeriodUnit};

use crate::lunar::{self, LunarDate};

/// First due date at or after `reference`.
///
/// Returns `current` unchanged when it is not earlier than `reference`.
/// Non-positive period values count as one. In lunar mode a conversion
/// failure stops the walk and the last date that converted is returned.
pub fn next_due_date(
    current: NaiveDate,
    period: Period,
    use_lunar: bool,
    reference: NaiveDate,
) -> NaiveDate {
    if current >= reference {
        return current;
    }
    if use_lunar {
        next_lunar(current, period, reference)
    } else {
        next_solar(current, period, reference)
    }
}

fn month_index(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

fn shift_solar(anchor: NaiveDate, unit: PeriodUnit, units: u64) -> Option<NaiveDate> {
    match unit {
        PeriodUnit::Day => anchor.checked_add_days(Days::new(units)),
        PeriodUnit::Month => anchor.checked_add_months(Months::new(u32::try_from(units).ok()?)),
        PeriodUnit::Year => {
            let months = u32::try_from(units.checked_mul(12)?).ok()?;
            anchor.checked_add_months(Months::new(months))
        }
    }
}

fn next_solar(expiry: NaiveDate, period: Period, reference: NaiveDate) -> NaiveDate {
    let step = period.steps() as i64;
    let gap = match period.unit {
        PeriodUnit::Day => (reference - expiry).num_days(),
        PeriodUnit::Month => month_index(reference) - month_index(expiry),
        PeriodUnit::Year => (reference.year() - expiry.year()) as i64,
    };

    // Every multiple below `k` is still earlier than `reference`.
    let mut k = (gap / step - 1).max(1);
    let mut last = expiry;
    loop {
        match shift_solar(expiry, period.unit, (k * step) as u64) {
            Some(candidate) if candidate >= reference => return candidate,
            Some(candidate) => {
                last = candidate;
                k += 1;
            }
            None => {
                tracing::warn!("⚠️ Date overflow advancing {expiry} by {k}x{}", period.unit);
                return last;
            }
        }
    }
}

fn next_lunar(expiry: NaiveDate, period: Period, reference: NaiveDate) -> NaiveDate {
    let start = match lunar::solar_date_to_lunar(expiry) {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("⚠️ Cannot convert {expiry} to lunar: {e}");
            return expiry;
        }
    };

    let mut cursor = start;
    let mut last = expiry;
    loop {
        cursor = add_lunar_period(cursor, start.day, period.unit, period.steps());
        match lunar::lunar_to_solar(&cursor) {
            Ok(solar) if solar >= reference => return solar,
            Ok(solar) if solar > last => last = solar,
            Ok(solar) => {
                tracing::warn!("⚠️ Lunar recurrence stalled at {solar}");
                return last;
            }
            Err(e) => {
                tracing::warn!("⚠️ Lunar recurrence stopped at {cursor:?}: {e}");
                return last;
            }
        }
    }
}

fn month_len(year: i32, month: u32, is_leap: bool) -> u32 {
    if is_leap { lunar::leap_days(year) } else { lunar::month_days(year, month) }
}

/// Month following (`year`, `month`, `is_leap`), visiting the leap month
/// right after its ordinary twin.
fn next_month(year: i32, month: u32, is_leap: bool) -> (i32, u32, bool) {
    if !is_leap && lunar::leap_month(year) == month {
        (year, month, true)
    } else if month >= 12 {
        (year + 1, 1, false)
    } else {
        (year, month + 1, false)
    }
}

fn clamp_day(anchor_day: u32, len: u32) -> u32 {
    if len == 0 { anchor_day } else { anchor_day.min(len) }
}

/// Add `n` lunar units to `date`. Month and year steps re-apply
/// `anchor_day`, clamped to the target month.
pub fn add_lunar_period(date: LunarDate, anchor_day: u32, unit: PeriodUnit, n: u32) -> LunarDate {
    match unit {
        PeriodUnit::Year => {
            // Past the table on overflow, so the caller's conversion fails.
            let year = i32::try_from(n)
                .ok()
                .and_then(|n| date.year.checked_add(n))
                .unwrap_or(lunar::MAX_YEAR + 1);
            let day = clamp_day(anchor_day, lunar::month_days(year, date.month));
            LunarDate::new(year, date.month, day, false)
        }
        PeriodUnit::Month => {
            let (mut year, mut month, mut is_leap) = (date.year, date.month, date.is_leap);
            for _ in 0..n {
                if year > lunar::MAX_YEAR {
                    break;
                }
                (year, month, is_leap) = next_month(year, month, is_leap);
            }
            let day = clamp_day(anchor_day, month_len(year, month, is_leap));
            LunarDate::new(year, month, day, is_leap)
        }
        PeriodUnit::Day => {
            let (mut year, mut month, mut is_leap) = (date.year, date.month, date.is_leap);
            let mut day = date.day + n;
            loop {
                let len = month_len(year, month, is_leap);
                if len == 0 || day <= len {
                    break;
                }
                day -= len;
                (year, month, is_leap) = next_month(year, month, is_leap);
            }
            LunarDate::new(year, month, day, is_leap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_future_expiry_unchanged() {
        let expiry = ymd(2024, 5, 1);
        for lunar in [false, true] {
            let p = Period::new(1, PeriodUnit::Month);
            assert_eq!(next_due_date(expiry, p, lunar, ymd(2024, 4, 1)), expiry);
            assert_eq!(next_due_date(expiry, p, lunar, expiry), expiry);
        }
    }

    #[test]
    fn test_monthly_solar_lands_after_reference() {
        let next = next_due_date(
            ymd(2024, 1, 1),
            Period::new(1, PeriodUnit::Month),
            false,
            ymd(2024, 3, 15),
        );
        assert_eq!(next, ymd(2024, 4, 1));
    }

    #[test]
    fn test_month_end_does_not_drift() {
        let p = Period::new(1, PeriodUnit::Month);
        assert_eq!(next_due_date(ymd(2024, 1, 31), p, false, ymd(2024, 2, 15)), ymd(2024, 2, 29));
        assert_eq!(next_due_date(ymd(2024, 1, 31), p, false, ymd(2024, 3, 1)), ymd(2024, 3, 31));
    }

    #[test]
    fn test_yearly_leap_day_clamps() {
        let p = Period::new(1, PeriodUnit::Year);
        assert_eq!(next_due_date(ymd(2024, 2, 29), p, false, ymd(2024, 3, 1)), ymd(2025, 2, 28));
        assert_eq!(next_due_date(ymd(2024, 2, 29), p, false, ymd(2027, 3, 1)), ymd(2028, 2, 29));
    }

    #[test]
    fn test_daily_period() {
        let p = Period::new(10, PeriodUnit::Day);
        assert_eq!(next_due_date(ymd(2024, 1, 1), p, false, ymd(2024, 1, 25)), ymd(2024, 1, 31));
        assert_eq!(next_due_date(ymd(2024, 1, 1), p, false, ymd(2024, 1, 21)), ymd(2024, 1, 21));
    }

    #[test]
    fn test_non_positive_period_coerced_to_one() {
        let zero = Period::new(0, PeriodUnit::Day);
        assert_eq!(next_due_date(ymd(2024, 1, 1), zero, false, ymd(2024, 1, 5)), ymd(2024, 1, 5));
        let negative = Period::new(-1, PeriodUnit::Year);
        assert_eq!(
            next_due_date(ymd(2020, 6, 1), negative, false, ymd(2024, 1, 1)),
            ymd(2024, 6, 1)
        );
        let lunar = next_due_date(ymd(2024, 2, 10), zero, true, ymd(2024, 2, 20));
        assert_eq!(lunar, ymd(2024, 2, 20));
    }

    #[test]
    fn test_large_gap_is_fast() {
        let p = Period::new(1, PeriodUnit::Day);
        assert_eq!(next_due_date(ymd(1000, 1, 1), p, false, ymd(2024, 5, 5)), ymd(2024, 5, 5));
    }

    #[test]
    fn test_lunar_yearly() {
        // Lunar 2024/1/1 -> lunar 2025/1/1.
        let p = Period::new(1, PeriodUnit::Year);
        assert_eq!(next_due_date(ymd(2024, 2, 10), p, true, ymd(2024, 3, 1)), ymd(2025, 1, 29));
    }

    #[test]
    fn test_lunar_monthly_visits_leap_month() {
        // Lunar 2023/2/1 is 2023-02-20; the next lunar month is leap 2.
        let p = Period::new(1, PeriodUnit::Month);
        assert_eq!(next_due_date(ymd(2023, 2, 20), p, true, ymd(2023, 3, 1)), ymd(2023, 3, 22));
        assert_eq!(next_due_date(ymd(2023, 2, 20), p, true, ymd(2023, 3, 23)), ymd(2023, 4, 20));
    }

    #[test]
    fn test_lunar_monthly_clamps_and_restores_anchor_day() {
        // Lunar 2023/12/30; 2024/1 has 29 days, 2024/2 has 30.
        let p = Period::new(1, PeriodUnit::Month);
        assert_eq!(next_due_date(ymd(2024, 2, 9), p, true, ymd(2024, 2, 10)), ymd(2024, 3, 9));
        assert_eq!(next_due_date(ymd(2024, 2, 9), p, true, ymd(2024, 3, 10)), ymd(2024, 4, 8));
    }

    #[test]
    fn test_lunar_daily_rolls_over_months() {
        let p = Period::new(45, PeriodUnit::Day);
        assert_eq!(next_due_date(ymd(2024, 2, 10), p, true, ymd(2024, 2, 11)), ymd(2024, 3, 26));
    }

    #[test]
    fn test_huge_lunar_period_returns_last_convertible_date() {
        let expiry = ymd(2024, 2, 10);
        for unit in [PeriodUnit::Year, PeriodUnit::Month, PeriodUnit::Day] {
            let p = Period::new(i32::MAX, unit);
            assert_eq!(next_due_date(expiry, p, true, ymd(2024, 3, 1)), expiry);
        }
    }

    #[test]
    fn test_lunar_stops_at_table_end() {
        let p = Period::new(1, PeriodUnit::Year);
        let expiry = ymd(2100, 6, 1);
        assert_eq!(next_due_date(expiry, p, true, ymd(2102, 1, 1)), expiry);
    }

    #[test]
    fn test_unconvertible_expiry_returned() {
        let p = Period::new(1, PeriodUnit::Month);
        let expiry = ymd(1850, 1, 1);
        assert_eq!(next_due_date(expiry, p, true, ymd(1851, 1, 1)), expiry);
    }

    #[test]
    fn test_add_lunar_year_clears_leap_flag() {
        let leap = LunarDate::new(2023, 2, 15, true);
        let next = add_lunar_period(leap, 15, PeriodUnit::Year, 1);
        assert_eq!(next, LunarDate::new(2024, 2, 15, false));
    }
}
