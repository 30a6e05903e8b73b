// Parole records - append-only behavior history per inmate
//
// An entry is one scored observation; a batch groups the entries a committee
// submitted together, keyed by an explicit batch_id rather than by timestamp.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scoring::RuleId;

/// Inmate fields owned by the inmate-management side of the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InmateRecord {
    pub inmate_id: String,

    #[serde(default)]
    pub full_name: Option<String>,

    /// None until intake records the start of the sentence
    pub start_date: Option<NaiveDate>,

    /// Years, fractional allowed
    pub sentence_length: f64,
}

impl InmateRecord {
    pub fn new(inmate_id: &str, start_date: Option<NaiveDate>, sentence_length: f64) -> Self {
        InmateRecord {
            inmate_id: inmate_id.to_string(),
            full_name: None,
            start_date,
            sentence_length,
        }
    }
}

/// (year, month) of a timestamp
pub fn period_of(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

// ============================================================================
// BEHAVIOR LOG ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorLogEntry {
    pub inmate_id: String,
    pub batch_id: String,
    pub rule_id: RuleId,
    pub points: u8,
    /// Assigned at creation, never changed
    pub submitted_at: DateTime<Utc>,
}

impl BehaviorLogEntry {
    pub fn period(&self) -> (i32, u32) {
        period_of(self.submitted_at)
    }
}

// ============================================================================
// SUBMISSION BATCH
// ============================================================================

/// One monthly evaluation: committee metadata plus its scored entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionBatch {
    pub batch_id: String,
    pub inmate_id: String,
    pub committee_name: String,
    pub signature_ref: String,
    pub submitted_at: DateTime<Utc>,
    pub entries: Vec<BehaviorLogEntry>,
}

impl SubmissionBatch {
    /// Build a batch with a fresh UUID; every entry shares its id and timestamp
    pub fn new(
        inmate_id: &str,
        selections: &[(RuleId, u8)],
        committee_name: &str,
        signature_ref: &str,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let batch_id = uuid::Uuid::new_v4().to_string();

        let entries = selections
            .iter()
            .map(|(rule_id, points)| BehaviorLogEntry {
                inmate_id: inmate_id.to_string(),
                batch_id: batch_id.clone(),
                rule_id: *rule_id,
                points: *points,
                submitted_at,
            })
            .collect();

        SubmissionBatch {
            batch_id,
            inmate_id: inmate_id.to_string(),
            committee_name: committee_name.to_string(),
            signature_ref: signature_ref.to_string(),
            submitted_at,
            entries,
        }
    }

    pub fn period(&self) -> (i32, u32) {
        period_of(self.submitted_at)
    }
}

// ============================================================================
// PAROLE RECORD
// ============================================================================

/// Everything tracked for one inmate, oldest batch first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParoleRecord {
    pub inmate_id: String,
    pub batches: Vec<SubmissionBatch>,
}

impl ParoleRecord {
    pub fn new(inmate_id: &str, batches: Vec<SubmissionBatch>) -> Self {
        ParoleRecord {
            inmate_id: inmate_id.to_string(),
            batches,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &BehaviorLogEntry> {
        self.batches.iter().flat_map(|batch| batch.entries.iter())
    }

    pub fn last_submitted_at(&self) -> Option<DateTime<Utc>> {
        self.batches.iter().map(|batch| batch.submitted_at).max()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Distinct calendar months with at least one entry
    pub fn tracked_months(&self) -> usize {
        tracked_months(self.entries())
    }
}

/// Distinct calendar months across a set of entries
pub fn tracked_months<'a, I>(entries: I) -> usize
where
    I: IntoIterator<Item = &'a BehaviorLogEntry>,
{
    entries
        .into_iter()
        .map(|entry| entry.period())
        .collect::<BTreeSet<_>>()
        .len()
}
