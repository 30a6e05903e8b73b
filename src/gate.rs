// 🚦 Monthly Tracking Gate
//
// Decides whether a new behavior batch may be accepted for an inmate at a
// given moment. This is a fast-path check for forms and for the service; the
// storage layer independently enforces one batch per (inmate, year, month).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::add_months;
use crate::error::{GateReason, Result};
use crate::records::{period_of, BehaviorLogEntry};

/// Months of incarceration before the first evaluation
pub const MIN_MONTHS_BEFORE_TRACKING: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// Submission permitted
    Open,

    /// Less than a month since the sentence started
    TooEarly { earliest_date: NaiveDate },

    /// A batch already exists for the current calendar month
    AlreadySubmittedThisMonth { last_submitted_at: DateTime<Utc> },
}

impl GateState {
    pub fn is_open(&self) -> bool {
        matches!(self, GateState::Open)
    }

    pub fn closed_reason(&self) -> Option<GateReason> {
        match self {
            GateState::Open => None,
            GateState::TooEarly { .. } => Some(GateReason::TooEarly),
            GateState::AlreadySubmittedThisMonth { .. } => Some(GateReason::AlreadySubmitted),
        }
    }

    /// Text for the caller to show instead of the form
    pub fn detail(&self) -> String {
        match self {
            GateState::Open => "behavior tracking is open".to_string(),
            GateState::TooEarly { earliest_date } => format!(
                "behavior tracking opens on {}",
                earliest_date.format("%Y-%m-%d")
            ),
            GateState::AlreadySubmittedThisMonth { last_submitted_at } => format!(
                "already tracked this month on {}; next tracking opens {}",
                last_submitted_at.format("%Y-%m-%d"),
                next_month_label(*last_submitted_at)
            ),
        }
    }
}

fn next_month_label(at: DateTime<Utc>) -> String {
    let (year, month) = period_of(at);
    if month == 12 {
        format!("{}-01", year + 1)
    } else {
        format!("{}-{:02}", year, month + 1)
    }
}

/// First day on which a batch may be submitted
pub fn earliest_tracking_date(start_date: NaiveDate) -> Result<NaiveDate> {
    add_months(start_date, MIN_MONTHS_BEFORE_TRACKING)
}

/// Evaluate the gate for one inmate
///
/// TooEarly wins over AlreadySubmittedThisMonth; prior entries outside the
/// current calendar month never close the gate.
pub fn evaluate(
    start_date: NaiveDate,
    now: DateTime<Utc>,
    prior_entries: &[BehaviorLogEntry],
) -> Result<GateState> {
    let earliest_date = earliest_tracking_date(start_date)?;
    if now.date_naive() < earliest_date {
        return Ok(GateState::TooEarly { earliest_date });
    }

    let current = period_of(now);
    let last_this_month = prior_entries
        .iter()
        .filter(|entry| entry.period() == current)
        .map(|entry| entry.submitted_at)
        .max();

    match last_this_month {
        Some(last_submitted_at) => Ok(GateState::AlreadySubmittedThisMonth { last_submitted_at }),
        None => Ok(GateState::Open),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn entry_at(submitted_at: DateTime<Utc>) -> BehaviorLogEntry {
        BehaviorLogEntry {
            inmate_id: "inm-1".to_string(),
            batch_id: "batch-1".to_string(),
            rule_id: 1,
            points: 4,
            submitted_at,
        }
    }

    #[test]
    fn test_too_early_within_first_month() {
        let state = evaluate(date(2023, 1, 10), at(2023, 1, 20), &[]).unwrap();

        assert_eq!(
            state,
            GateState::TooEarly {
                earliest_date: date(2023, 2, 10)
            }
        );
        assert_eq!(state.closed_reason(), Some(GateReason::TooEarly));
        assert!(state.detail().contains("2023-02-10"));
    }

    #[test]
    fn test_opens_exactly_one_month_after_start() {
        assert!(!evaluate(date(2023, 1, 10), at(2023, 2, 9), &[]).unwrap().is_open());
        assert!(evaluate(date(2023, 1, 10), at(2023, 2, 10), &[]).unwrap().is_open());
    }

    #[test]
    fn test_already_submitted_this_month() {
        let prior = vec![entry_at(at(2023, 2, 15))];
        let state = evaluate(date(2023, 1, 10), at(2023, 2, 28), &prior).unwrap();

        assert_eq!(
            state,
            GateState::AlreadySubmittedThisMonth {
                last_submitted_at: at(2023, 2, 15)
            }
        );
        assert!(state.detail().contains("2023-03"));
    }

    #[test]
    fn test_monotonic_within_month_and_reopens_next_month() {
        let prior = vec![entry_at(at(2023, 2, 15))];
        let start = date(2023, 1, 10);

        for day in 15..=28 {
            let state = evaluate(start, at(2023, 2, day), &prior).unwrap();
            assert_eq!(state.closed_reason(), Some(GateReason::AlreadySubmitted));
        }

        assert!(evaluate(start, at(2023, 3, 1), &prior).unwrap().is_open());
    }

    #[test]
    fn test_same_month_other_year_does_not_close() {
        let prior = vec![entry_at(at(2022, 2, 15))];
        assert!(evaluate(date(2021, 1, 1), at(2023, 2, 15), &prior).unwrap().is_open());
    }

    #[test]
    fn test_december_rolls_into_january() {
        let last = at(2023, 12, 5);
        let state = GateState::AlreadySubmittedThisMonth {
            last_submitted_at: last,
        };
        assert!(state.detail().contains("2024-01"));
    }
}
