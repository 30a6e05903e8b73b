//! Error types for parole tracking

use thiserror::Error;

use crate::scoring::{MAX_POINTS, MIN_POINTS};

/// Why the monthly gate refused a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// Less than one month of the sentence has elapsed
    TooEarly,
    /// A batch was already accepted for this calendar month
    AlreadySubmitted,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::TooEarly => "too_early",
            GateReason::AlreadySubmitted => "already_submitted",
        }
    }
}

/// Errors raised by the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    /// A batch already exists for this (inmate, year, month)
    #[error("behavior batch already recorded for inmate {inmate_id} in {year}-{month:02}")]
    Conflict {
        inmate_id: String,
        year: i32,
        month: u32,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid JSON in stored row: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt stored row: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors that can occur while computing timelines or tracking behavior
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error(
        "points for rule {rule_id} must be between {min} and {max}, got {points}",
        min = MIN_POINTS,
        max = MAX_POINTS
    )]
    InvalidPoints { rule_id: u32, points: i64 },

    #[error("unknown behavior rule: {0}")]
    UnknownRule(u32),

    #[error("submission contains no rule selections")]
    EmptySubmission,

    #[error("missing required field: {0}")]
    MissingMetadata(&'static str),

    #[error("invalid date range: {to} is before {from}")]
    InvalidRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },

    #[error("sentence length must be a finite, non-negative number of years, got {0}")]
    InvalidSentenceLength(f64),

    #[error("date arithmetic overflowed from {0}")]
    DateOverflow(chrono::NaiveDate),

    #[error("behavior tracking is closed ({}): {detail}", .reason.as_str())]
    GateClosed { reason: GateReason, detail: String },

    #[error("inmate not found: {0}")]
    InmateNotFound(String),

    #[error("inmate {0} has no sentence start date")]
    MissingStartDate(String),

    #[error(transparent)]
    Store(StoreError),
}

impl TrackingError {
    /// Caller-input problems, detected before any persistence
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrackingError::InvalidPoints { .. }
                | TrackingError::UnknownRule(_)
                | TrackingError::EmptySubmission
                | TrackingError::MissingMetadata(_)
                | TrackingError::InvalidRange { .. }
                | TrackingError::InvalidSentenceLength(_)
                | TrackingError::DateOverflow(_)
        )
    }

    pub fn is_gate_closed(&self) -> bool {
        matches!(self, TrackingError::GateClosed { .. })
    }

    pub fn gate_reason(&self) -> Option<GateReason> {
        match self {
            TrackingError::GateClosed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<StoreError> for TrackingError {
    fn from(err: StoreError) -> Self {
        match err {
            // A concurrent writer won the month; callers see the same error as the gate gives
            StoreError::Conflict {
                inmate_id,
                year,
                month,
            } => TrackingError::GateClosed {
                reason: GateReason::AlreadySubmitted,
                detail: format!(
                    "inmate {} already has a behavior batch for {}-{:02}",
                    inmate_id, year, month
                ),
            },
            other => TrackingError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_already_submitted() {
        let err: TrackingError = StoreError::Conflict {
            inmate_id: "inm-1".to_string(),
            year: 2023,
            month: 2,
        }
        .into();

        assert_eq!(err.gate_reason(), Some(GateReason::AlreadySubmitted));
        assert!(err.to_string().contains("2023-02"));
    }

    #[test]
    fn test_other_store_errors_surface_as_is() {
        let err: TrackingError = StoreError::Poisoned.into();
        assert!(matches!(err, TrackingError::Store(StoreError::Poisoned)));
        assert!(!err.is_validation());
        assert!(!err.is_gate_closed());
    }

    #[test]
    fn test_validation_classification() {
        assert!(TrackingError::EmptySubmission.is_validation());
        assert!(TrackingError::UnknownRule(99).is_validation());
        assert!(!TrackingError::InmateNotFound("x".to_string()).is_validation());
    }
}
