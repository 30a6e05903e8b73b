// 📅 Calendar Math - pure date-interval arithmetic
//
// Every date derived from a sentence goes through this module, so fractional
// years round the same way everywhere.

use chrono::{Datelike, Months, NaiveDate};

use crate::error::{Result, TrackingError};

/// Months in a year, as used for fractional-year conversion
pub const MONTHS_PER_YEAR: u32 = 12;

// ============================================================================
// ADDITION
// ============================================================================

/// Advance `date` by whole calendar months, clamping to the end of shorter months
///
/// Example: 2023-01-31 + 1 month = 2023-02-28
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or(TrackingError::DateOverflow(date))
}

/// Split fractional years into (whole years, whole months)
///
/// The remainder becomes `round(fraction * 12)` months. `f64::round` rounds
/// half away from zero, which is half-up for the non-negative input accepted
/// here. A remainder that rounds up to 12 months stays as 12 months.
pub fn split_years(years: f64) -> Result<(u32, u32)> {
    if !years.is_finite() || years < 0.0 {
        return Err(TrackingError::InvalidSentenceLength(years));
    }
    if years > u32::MAX as f64 / MONTHS_PER_YEAR as f64 {
        return Err(TrackingError::InvalidSentenceLength(years));
    }

    let whole = years.trunc();
    let fraction = years - whole;
    let months = (fraction * MONTHS_PER_YEAR as f64).round() as u32;

    Ok((whole as u32, months))
}

/// Add a (possibly fractional) number of years to a date
///
/// The date is advanced by the whole years first, then by the rounded months.
///
/// Example: 2020-01-15 + 2.5 years = 2022-07-15
pub fn add_fractional_years(date: NaiveDate, years: f64) -> Result<NaiveDate> {
    let (whole_years, months) = split_years(years)?;

    let year_months = whole_years
        .checked_mul(MONTHS_PER_YEAR)
        .ok_or(TrackingError::DateOverflow(date))?;

    let advanced = add_months(date, year_months)?;
    add_months(advanced, months)
}

// ============================================================================
// DIFFERENCE
// ============================================================================

/// Largest `m` such that `add_months(from, m) <= to`
///
/// Uses the same clamping as `add_months`, so a date produced by adding N
/// months is always reported as exactly N months away.
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> Result<u32> {
    if to < from {
        return Err(TrackingError::InvalidRange { from, to });
    }

    let raw = (to.year() - from.year()) * MONTHS_PER_YEAR as i32 + to.month() as i32
        - from.month() as i32;
    let mut months = raw.max(0) as u32;

    while months > 0 && add_months(from, months)? > to {
        months -= 1;
    }

    Ok(months)
}

fn pluralize(value: u32, unit: &str) -> String {
    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Human-readable whole years and months between two dates
///
/// "2 years", "1 year and 8 months", "0 years and 10 months".
/// Fails with `InvalidRange` when `to` is before `from`.
pub fn human_duration(from: NaiveDate, to: NaiveDate) -> Result<String> {
    let total = whole_months_between(from, to)?;
    let years = total / MONTHS_PER_YEAR;
    let months = total % MONTHS_PER_YEAR;

    if months == 0 {
        Ok(pluralize(years, "year"))
    } else {
        Ok(format!(
            "{} and {}",
            pluralize(years, "year"),
            pluralize(months, "month")
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_add_whole_years() {
        assert_eq!(add_fractional_years(date(2023, 1, 10), 3.0).unwrap(), date(2026, 1, 10));
        assert_eq!(add_fractional_years(date(2023, 1, 10), 0.0).unwrap(), date(2023, 1, 10));
    }

    #[test]
    fn test_add_fractional_years() {
        // 0.5 years = 6 months
        assert_eq!(add_fractional_years(date(2020, 1, 15), 2.5).unwrap(), date(2022, 7, 15));

        // 5/3 years = 1 year + round(8.0) months
        assert_eq!(
            add_fractional_years(date(2020, 1, 15), 2.5 * 2.0 / 3.0).unwrap(),
            date(2021, 9, 15)
        );
    }

    #[test]
    fn test_fraction_rounds_half_up() {
        // 1/24 year = 0.5 months -> 1 month
        assert_eq!(split_years(1.0 / 24.0).unwrap(), (0, 1));
        // 0.04 years = 0.48 months -> 0 months
        assert_eq!(split_years(0.04).unwrap(), (0, 0));
        // 0.99 years = 11.88 months -> 12 months
        assert_eq!(split_years(0.99).unwrap(), (0, 12));
        assert_eq!(add_fractional_years(date(2020, 3, 1), 0.99).unwrap(), date(2021, 3, 1));
    }

    #[test]
    fn test_month_end_clamping() {
        assert_eq!(add_months(date(2023, 1, 31), 1).unwrap(), date(2023, 2, 28));
        assert_eq!(add_months(date(2024, 1, 31), 1).unwrap(), date(2024, 2, 29));
        // Leap day plus one year clamps, then months are added from the clamped date
        assert_eq!(add_fractional_years(date(2020, 2, 29), 1.0).unwrap(), date(2021, 2, 28));
    }

    #[test]
    fn test_rejects_invalid_years() {
        assert!(matches!(
            add_fractional_years(date(2023, 1, 1), -1.0),
            Err(TrackingError::InvalidSentenceLength(_))
        ));
        assert!(matches!(
            add_fractional_years(date(2023, 1, 1), f64::NAN),
            Err(TrackingError::InvalidSentenceLength(_))
        ));
        assert!(matches!(
            add_fractional_years(date(2023, 1, 1), f64::INFINITY),
            Err(TrackingError::InvalidSentenceLength(_))
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(matches!(
            add_fractional_years(NaiveDate::MAX, 1.0),
            Err(TrackingError::DateOverflow(_))
        ));
    }

    #[test]
    fn test_whole_months_between() {
        assert_eq!(whole_months_between(date(2023, 1, 10), date(2023, 1, 10)).unwrap(), 0);
        assert_eq!(whole_months_between(date(2023, 1, 10), date(2023, 2, 9)).unwrap(), 0);
        assert_eq!(whole_months_between(date(2023, 1, 10), date(2023, 2, 10)).unwrap(), 1);
        assert_eq!(whole_months_between(date(2022, 8, 31), date(2023, 2, 28)).unwrap(), 6);
    }

    #[test]
    fn test_human_duration_format() {
        assert_eq!(human_duration(date(2023, 1, 10), date(2025, 1, 10)).unwrap(), "2 years");
        assert_eq!(human_duration(date(2025, 1, 10), date(2026, 1, 10)).unwrap(), "1 year");
        assert_eq!(
            human_duration(date(2020, 1, 15), date(2021, 9, 15)).unwrap(),
            "1 year and 8 months"
        );
        assert_eq!(
            human_duration(date(2021, 9, 15), date(2022, 7, 15)).unwrap(),
            "0 years and 10 months"
        );
        assert_eq!(
            human_duration(date(2021, 1, 1), date(2023, 2, 1)).unwrap(),
            "2 years and 1 month"
        );
        assert_eq!(human_duration(date(2021, 1, 1), date(2021, 1, 1)).unwrap(), "0 years");
    }

    #[test]
    fn test_human_duration_rejects_reversed_range() {
        let err = human_duration(date(2024, 1, 1), date(2023, 1, 1)).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidRange { .. }));
    }
}
