// ⚖️ Parole Timeline - release and parole dates derived from a sentence
//
// A timeline is a pure function of (start_date, sentence_length). It is never
// stored; callers recompute it on every read because the inmate record that
// owns those two fields can change underneath us.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{add_fractional_years, human_duration};
use crate::error::{Result, TrackingError};

/// Share of the sentence that must be served before parole eligibility
pub const PAROLE_FRACTION: f64 = 2.0 / 3.0;

// ============================================================================
// SENTENCE TIMELINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceTimeline {
    /// When incarceration began (None = not yet recorded)
    pub start_date: Option<NaiveDate>,

    /// Sentence length in years, fractional years allowed
    pub sentence_length: f64,

    /// Two-thirds point of the sentence
    pub parole_date: Option<NaiveDate>,

    /// Full sentence served
    pub release_date: Option<NaiveDate>,

    /// e.g. "2 years and 4 months"
    pub duration_to_parole: Option<String>,

    pub duration_from_parole_to_end: Option<String>,
}

impl SentenceTimeline {
    /// Timeline for an inmate record without a start date
    pub fn incomplete(sentence_length: f64) -> Self {
        SentenceTimeline {
            start_date: None,
            sentence_length,
            parole_date: None,
            release_date: None,
            duration_to_parole: None,
            duration_from_parole_to_end: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.start_date.is_some() && self.release_date.is_some()
    }

    /// Fraction of the sentence served on `on`, in [0, 1]
    ///
    /// Measured against the computed dates: days are interpolated linearly
    /// from start to parole (0 to 2/3) and from parole to release (2/3 to 1),
    /// so the fraction reaches PAROLE_FRACTION exactly on the parole date. A
    /// zero-length sentence counts as fully served once it has started.
    /// Returns None for an incomplete timeline.
    pub fn elapsed_fraction(&self, on: NaiveDate) -> Option<f64> {
        let start = self.start_date?;
        let parole = self.parole_date?;
        let release = self.release_date?;

        if on < start {
            Some(0.0)
        } else if on < parole {
            Some(PAROLE_FRACTION * span_share(start, parole, on))
        } else if on < release {
            Some(PAROLE_FRACTION + (1.0 - PAROLE_FRACTION) * span_share(parole, release, on))
        } else {
            Some(1.0)
        }
    }

    /// True once `on` has reached the parole date
    pub fn parole_reached(&self, on: NaiveDate) -> bool {
        self.parole_date.map_or(false, |parole| on >= parole)
    }
}

/// Share of the non-empty span [from, to) covered on `on`
fn span_share(from: NaiveDate, to: NaiveDate, on: NaiveDate) -> f64 {
    (on - from).num_days() as f64 / (to - from).num_days() as f64
}

// ============================================================================
// CALCULATOR
// ============================================================================

/// Derive a full timeline from a start date and sentence length
///
/// A missing start date is not an error: the timeline comes back incomplete.
pub fn compute(start_date: Option<NaiveDate>, sentence_length: f64) -> Result<SentenceTimeline> {
    if !sentence_length.is_finite() || sentence_length < 0.0 {
        return Err(TrackingError::InvalidSentenceLength(sentence_length));
    }

    let start = match start_date {
        Some(start) => start,
        None => return Ok(SentenceTimeline::incomplete(sentence_length)),
    };

    let release_date = add_fractional_years(start, sentence_length)?;
    let parole_date = add_fractional_years(start, sentence_length * 2.0 / 3.0)?;

    Ok(SentenceTimeline {
        start_date: Some(start),
        sentence_length,
        parole_date: Some(parole_date),
        release_date: Some(release_date),
        duration_to_parole: Some(human_duration(start, parole_date)?),
        duration_from_parole_to_end: Some(human_duration(parole_date, release_date)?),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_three_year_sentence() {
        let timeline = compute(Some(date(2023, 1, 10)), 3.0).unwrap();

        assert_eq!(
            timeline,
            SentenceTimeline {
                start_date: Some(date(2023, 1, 10)),
                sentence_length: 3.0,
                parole_date: Some(date(2025, 1, 10)),
                release_date: Some(date(2026, 1, 10)),
                duration_to_parole: Some("2 years".to_string()),
                duration_from_parole_to_end: Some("1 year".to_string()),
            }
        );
    }

    #[test]
    fn test_fractional_sentence_is_deterministic() {
        let first = compute(Some(date(2020, 1, 15)), 2.5).unwrap();
        let second = compute(Some(date(2020, 1, 15)), 2.5).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.parole_date, Some(date(2021, 9, 15)));
        assert_eq!(first.release_date, Some(date(2022, 7, 15)));
        assert_eq!(first.duration_to_parole.as_deref(), Some("1 year and 8 months"));
        assert_eq!(
            first.duration_from_parole_to_end.as_deref(),
            Some("0 years and 10 months")
        );
    }

    #[test]
    fn test_missing_start_date_is_incomplete() {
        let timeline = compute(None, 4.0).unwrap();

        assert!(!timeline.is_complete());
        assert_eq!(timeline.parole_date, None);
        assert_eq!(timeline.release_date, None);
        assert_eq!(timeline.duration_to_parole, None);
        assert_eq!(timeline.elapsed_fraction(date(2024, 1, 1)), None);
    }

    #[test]
    fn test_zero_length_sentence() {
        let timeline = compute(Some(date(2023, 5, 1)), 0.0).unwrap();

        assert_eq!(timeline.parole_date, Some(date(2023, 5, 1)));
        assert_eq!(timeline.release_date, Some(date(2023, 5, 1)));
        assert_eq!(timeline.duration_to_parole.as_deref(), Some("0 years"));
        assert_eq!(timeline.elapsed_fraction(date(2023, 5, 1)), Some(1.0));
    }

    #[test]
    fn test_negative_length_rejected() {
        assert!(matches!(
            compute(Some(date(2023, 1, 1)), -0.5),
            Err(TrackingError::InvalidSentenceLength(_))
        ));
        // Validated even without a start date
        assert!(matches!(
            compute(None, f64::NAN),
            Err(TrackingError::InvalidSentenceLength(_))
        ));
    }

    #[test]
    fn test_elapsed_fraction() {
        let timeline = compute(Some(date(2023, 1, 10)), 3.0).unwrap();

        assert_eq!(timeline.elapsed_fraction(date(2022, 12, 1)), Some(0.0));
        assert_eq!(timeline.elapsed_fraction(date(2023, 1, 10)), Some(0.0));
        assert_eq!(timeline.elapsed_fraction(date(2030, 1, 1)), Some(1.0));

        let at_parole = timeline.elapsed_fraction(date(2025, 1, 10)).unwrap();
        assert!((at_parole - PAROLE_FRACTION).abs() < 0.01);
        assert!(timeline.parole_reached(date(2025, 1, 10)));
        assert!(!timeline.parole_reached(date(2025, 1, 9)));
    }

    #[test]
    fn test_elapsed_fraction_matches_parole_date_across_leap_day() {
        // 730 days to parole, 366 after it
        let timeline = compute(Some(date(2021, 3, 1)), 3.0).unwrap();
        assert_eq!(timeline.parole_date, Some(date(2023, 3, 1)));

        assert_eq!(timeline.elapsed_fraction(date(2023, 3, 1)), Some(PAROLE_FRACTION));
        assert!(timeline.elapsed_fraction(date(2023, 2, 28)).unwrap() < PAROLE_FRACTION);

        let halfway_after = timeline.elapsed_fraction(date(2023, 8, 31)).unwrap();
        assert!((halfway_after - 5.0 / 6.0).abs() < 0.01);
    }

    #[test]
    fn test_elapsed_fraction_is_monotonic() {
        let timeline = compute(Some(date(2020, 2, 29)), 1.3).unwrap();
        let start = date(2020, 2, 1);

        let mut previous = 0.0;
        for offset in 0..600 {
            let fraction = timeline
                .elapsed_fraction(start + chrono::Duration::days(offset))
                .unwrap();
            assert!(fraction >= previous);
            assert!((0.0..=1.0).contains(&fraction));
            previous = fraction;
        }
        assert_eq!(previous, 1.0);
    }
}
