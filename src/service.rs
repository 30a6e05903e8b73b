// 📋 Behavior Tracking Service
//
// Orchestrates one monthly submission:
//   validate input -> load inmate -> compute timeline -> load history -> gate
//   -> score -> append batch
//
// Nothing is cached between calls. The timeline is recomputed from the inmate
// record every time, and the gate is re-evaluated on every request.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{GateReason, Result, TrackingError};
use crate::gate::{self, GateState};
use crate::records::{tracked_months, InmateRecord, ParoleRecord, SubmissionBatch};
use crate::scoring::{self, EligibilityPolicy, RuleId, MAX_POSSIBLE_SCORE};
use crate::store::{BehaviorStore, InmateDirectory};
use crate::timeline::{self, SentenceTimeline};

/// What a successful submission returns to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub batch_id: String,
    pub timeline: SentenceTimeline,
    pub score: u32,
    pub max_score: u32,
    pub eligible: bool,
    /// Share of the sentence served at submission time
    pub elapsed_fraction: f64,
    /// Distinct calendar months with at least one entry (activity metric)
    pub tracked_months: usize,
}

pub struct BehaviorTrackingService<S> {
    store: S,
    policy: EligibilityPolicy,
}

impl<S> BehaviorTrackingService<S>
where
    S: InmateDirectory + BehaviorStore,
{
    pub fn new(store: S) -> Self {
        Self::with_policy(store, EligibilityPolicy::default())
    }

    pub fn with_policy(store: S, policy: EligibilityPolicy) -> Self {
        BehaviorTrackingService { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Pure timeline computation, no I/O
    pub fn compute_timeline(
        &self,
        start_date: Option<NaiveDate>,
        sentence_length: f64,
    ) -> Result<SentenceTimeline> {
        timeline::compute(start_date, sentence_length)
    }

    fn load_inmate(&self, inmate_id: &str) -> Result<InmateRecord> {
        self.store
            .find_inmate(inmate_id)?
            .ok_or_else(|| TrackingError::InmateNotFound(inmate_id.to_string()))
    }

    /// Current timeline for an inmate, computed from the live record
    pub fn inmate_timeline(&self, inmate_id: &str) -> Result<SentenceTimeline> {
        let inmate = self.load_inmate(inmate_id)?;
        timeline::compute(inmate.start_date, inmate.sentence_length)
    }

    /// Read-only gate check, e.g. to enable or disable a submission form
    pub fn evaluate_gate(&self, inmate_id: &str, now: DateTime<Utc>) -> Result<GateState> {
        let inmate = self.load_inmate(inmate_id)?;
        let start_date = inmate
            .start_date
            .ok_or_else(|| TrackingError::MissingStartDate(inmate_id.to_string()))?;

        let prior = self.store.list_entries(inmate_id)?;
        let state = gate::evaluate(start_date, now, &prior)?;

        debug!(inmate_id, open = state.is_open(), "gate evaluated");
        Ok(state)
    }

    /// Full behavior history for an inmate
    pub fn parole_record(&self, inmate_id: &str) -> Result<ParoleRecord> {
        self.load_inmate(inmate_id)?;
        let batches = self.store.list_batches(inmate_id)?;
        Ok(ParoleRecord::new(inmate_id, batches))
    }

    /// Record one monthly evaluation batch
    ///
    /// Fails without side effects on invalid input, an unrepresentable timeline
    /// or a closed gate. A storage conflict (another request took the month
    /// first) is reported as `GateClosed { AlreadySubmitted }`. No retries are
    /// attempted.
    pub fn submit(
        &self,
        inmate_id: &str,
        rule_selections: &BTreeMap<RuleId, i64>,
        committee_name: &str,
        signature_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmissionResult> {
        let selections = validate_selections(rule_selections)?;
        if committee_name.trim().is_empty() {
            return Err(TrackingError::MissingMetadata("committee_name"));
        }
        if signature_ref.trim().is_empty() {
            return Err(TrackingError::MissingMetadata("signature_ref"));
        }

        let inmate = self.load_inmate(inmate_id)?;
        let start_date = inmate
            .start_date
            .ok_or_else(|| TrackingError::MissingStartDate(inmate_id.to_string()))?;

        // Every failure must happen before the append
        let timeline = timeline::compute(inmate.start_date, inmate.sentence_length)?;
        let elapsed_fraction = timeline.elapsed_fraction(now.date_naive()).unwrap_or(0.0);

        let mut entries = self.store.list_entries(inmate_id)?;
        let state = gate::evaluate(start_date, now, &entries)?;
        if let Some(reason) = state.closed_reason() {
            info!(inmate_id, reason = reason.as_str(), "behavior submission refused by gate");
            return Err(TrackingError::GateClosed {
                reason,
                detail: state.detail(),
            });
        }

        let batch = SubmissionBatch::new(
            inmate_id,
            &selections,
            committee_name.trim(),
            signature_ref.trim(),
            now,
        );
        let score = scoring::score(&batch.entries);

        self.store.append_batch(&batch).map_err(|err| {
            let err = TrackingError::from(err);
            if err.gate_reason() == Some(GateReason::AlreadySubmitted) {
                info!(inmate_id, "concurrent submission already took this month");
            }
            err
        })?;

        let eligible = self.policy.is_eligible(score, elapsed_fraction);

        entries.extend(batch.entries.iter().cloned());

        info!(
            inmate_id,
            batch_id = %batch.batch_id,
            score,
            eligible,
            "behavior batch accepted"
        );

        Ok(SubmissionResult {
            batch_id: batch.batch_id,
            timeline,
            score,
            max_score: MAX_POSSIBLE_SCORE,
            eligible,
            elapsed_fraction,
            tracked_months: tracked_months(&entries),
        })
    }
}

/// Check every selection before anything touches storage
fn validate_selections(rule_selections: &BTreeMap<RuleId, i64>) -> Result<Vec<(RuleId, u8)>> {
    if rule_selections.is_empty() {
        return Err(TrackingError::EmptySubmission);
    }

    rule_selections
        .iter()
        .map(|(rule_id, points)| Ok((*rule_id, scoring::validate_selection(*rule_id, *points)?)))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
