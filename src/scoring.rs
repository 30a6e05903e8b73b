// 🏷️ Behavior Scoring Rules - Rules as Data
// Fixed catalog of 21 conduct criteria, each scored 1-5 per monthly batch

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};
use crate::records::BehaviorLogEntry;
use crate::timeline::PAROLE_FRACTION;

/// Stable identifier of a behavior rule (1-based, catalog order)
pub type RuleId = u32;

pub const MIN_POINTS: u8 = 1;
pub const MAX_POINTS: u8 = 5;
pub const RULE_COUNT: usize = 21;

/// 21 rules x 5 points
pub const MAX_POSSIBLE_SCORE: u32 = RULE_COUNT as u32 * MAX_POINTS as u32;

/// Share of the maximum score a batch needs for satisfactory conduct
pub const ELIGIBILITY_SCORE_RATIO: f64 = 0.75;

/// Share of the sentence that must be served before parole
pub const ELIGIBILITY_TIME_SERVED_FRACTION: f64 = PAROLE_FRACTION;

// ============================================================================
// RULE CATALOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BehaviorRule {
    pub id: RuleId,
    pub code: &'static str,
    pub description: &'static str,
}

const fn rule(id: RuleId, code: &'static str, description: &'static str) -> BehaviorRule {
    BehaviorRule {
        id,
        code,
        description,
    }
}

pub static CATALOG: [BehaviorRule; RULE_COUNT] = [
    rule(1, "facility_rules", "Complies with facility rules and regulations"),
    rule(2, "respect_staff", "Respectful conduct toward staff"),
    rule(3, "respect_inmates", "Respectful conduct toward other inmates"),
    rule(4, "work_duties", "Completes assigned work duties"),
    rule(5, "education", "Participates in education programs"),
    rule(6, "vocational_training", "Participates in vocational training"),
    rule(7, "counseling", "Attends counseling and rehabilitation sessions"),
    rule(8, "substance_free", "Remains free of drugs and alcohol"),
    rule(9, "non_violence", "Avoids violence, threats and intimidation"),
    rule(10, "hygiene", "Maintains personal and cell hygiene"),
    rule(11, "punctuality", "Attends roll calls and schedules on time"),
    rule(12, "contraband_free", "No possession of contraband"),
    rule(13, "property_care", "Takes care of facility property"),
    rule(14, "visitation_conduct", "Appropriate conduct during visits"),
    rule(15, "conflict_resolution", "Resolves conflicts peacefully"),
    rule(16, "community_service", "Takes part in community service"),
    rule(17, "recreation", "Constructive use of recreation time"),
    rule(18, "accountability", "Shows accountability for the offense"),
    rule(19, "family_contact", "Maintains constructive family contact"),
    rule(20, "reentry_planning", "Engages in release and reentry planning"),
    rule(21, "disciplinary_record", "No disciplinary reports this month"),
];

/// Full catalog in display order
pub fn catalog() -> &'static [BehaviorRule] {
    &CATALOG
}

pub fn find_rule(id: RuleId) -> Option<&'static BehaviorRule> {
    CATALOG.iter().find(|rule| rule.id == id)
}

/// Check one (rule, points) selection against the catalog
///
/// Points arrive as i64 so out-of-range input (0, negatives) reaches this
/// check instead of failing at deserialization.
pub fn validate_selection(rule_id: RuleId, points: i64) -> Result<u8> {
    if find_rule(rule_id).is_none() {
        return Err(TrackingError::UnknownRule(rule_id));
    }
    if points < MIN_POINTS as i64 || points > MAX_POINTS as i64 {
        return Err(TrackingError::InvalidPoints { rule_id, points });
    }
    Ok(points as u8)
}

// ============================================================================
// SCORING
// ============================================================================

/// Sum of points across one submission batch
pub fn score(entries: &[BehaviorLogEntry]) -> u32 {
    entries.iter().map(|entry| entry.points as u32).sum()
}

/// Parole thresholds, tunable through configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityPolicy {
    /// Minimum batch score as a share of MAX_POSSIBLE_SCORE
    pub score_ratio: f64,

    /// Minimum share of the sentence served
    pub time_served_fraction: f64,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        EligibilityPolicy {
            score_ratio: ELIGIBILITY_SCORE_RATIO,
            time_served_fraction: ELIGIBILITY_TIME_SERVED_FRACTION,
        }
    }
}

impl EligibilityPolicy {
    /// Both ratios must lie in (0, 1]
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, value) in [
            ("score_ratio", self.score_ratio),
            ("time_served_fraction", self.time_served_fraction),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(format!("{} must be in (0, 1], got {}", name, value));
            }
        }
        Ok(())
    }

    pub fn score_threshold(&self) -> f64 {
        self.score_ratio * MAX_POSSIBLE_SCORE as f64
    }

    pub fn is_eligible(&self, score: u32, elapsed_fraction: f64) -> bool {
        score as f64 >= self.score_threshold() && elapsed_fraction >= self.time_served_fraction
    }
}

/// Satisfactory conduct and two-thirds of the sentence served
pub fn is_eligible(score: u32, elapsed_fraction: f64) -> bool {
    EligibilityPolicy::default().is_eligible(score, elapsed_fraction)
}

// ============================================================================
// TESTS
// ============================================================================
