//! Retrospective analysis of the feedback log.
//!
//! Aggregates ratings per credited arm, flags arms users dislike and proposes
//! exploration changes. Proposals are advisory: nothing here writes to the
//! arm statistics.

use std::collections::BTreeMap;

use anstoss_core::FeedbackRecord;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

// Confidence calculation constants
/// Sample size at which confidence plateaus
const CONFIDENCE_SAMPLE_SIZE_PLATEAU: f32 = 50.0;
/// Confidence level when 2+ patterns detected
const CONFIDENCE_HIGH_PATTERN: f32 = 0.7;
/// Confidence level when fewer than 2 patterns detected
const CONFIDENCE_LOW_PATTERN: f32 = 0.5;
const CONFIDENCE_SAMPLE_WEIGHT: f32 = 0.4;
const CONFIDENCE_PATTERN_WEIGHT: f32 = 0.6;

// Pattern detection thresholds
/// Minimum number of ratings for one arm before it is judged
const PATTERN_MIN_RATINGS_PER_ARM: usize = 5;
/// Dissatisfaction rate (60%) above which an arm is flagged
const PATTERN_HIGH_DISSATISFACTION: f32 = 0.6;
/// Overall dissatisfaction rate (50%) for system-wide issues
const PATTERN_OVERALL_DISSATISFACTION: f32 = 0.5;

/// Amount to reduce epsilon when users are broadly dissatisfied
const ADJUSTMENT_EPSILON_DELTA: f32 = -0.05;

/// Ratings at or above this count as satisfied.
const SATISFIED_MIN_RATING: u8 = 4;
/// Ratings at or below this count as dissatisfied.
const DISSATISFIED_MAX_RATING: u8 = 2;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Rating counts for a group of feedback records.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingStatistics {
    pub total: usize,
    pub satisfied: usize,
    pub dissatisfied: usize,
    pub rating_sum: u64,
}

impl RatingStatistics {
    fn add(&mut self, record: &FeedbackRecord) {
        let rating = record.rating.get();
        self.total += 1;
        self.rating_sum += u64::from(rating);
        if rating >= SATISFIED_MIN_RATING {
            self.satisfied += 1;
        } else if rating <= DISSATISFIED_MAX_RATING {
            self.dissatisfied += 1;
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn satisfaction_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.satisfied as f32 / self.total as f32
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dissatisfaction_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.dissatisfied as f32 / self.total as f32
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_rating(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.rating_sum as f32 / self.total as f32
    }
}

/// Evidence behind a tuning proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub ratings_analyzed: usize,
    pub dissatisfaction_rate: f32,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Proposed,
    Accepted,
    Rejected,
}

/// Suggested parameter changes for a selection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningProposal {
    pub version: String,
    pub basis_policy: String,
    pub ts: String,
    /// Absolute parameter deltas, keyed by parameter name.
    pub deltas: BTreeMap<String, f32>,
    pub confidence: f32,
    pub evidence: Evidence,
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub status: ProposalStatus,
}

/// Everything `GET /feedback/report` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub overall: RatingStatistics,
    pub by_arm: BTreeMap<String, RatingStatistics>,
    pub patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<TuningProposal>,
}

#[derive(Debug)]
pub struct FeedbackAnalyzer {
    /// Minimum number of ratings before patterns are reported
    min_ratings: usize,
    /// Minimum confidence for a proposal
    min_confidence: f32,
}

impl Default for FeedbackAnalyzer {
    fn default() -> Self {
        Self {
            min_ratings: 10,
            min_confidence: 0.5,
        }
    }
}

impl FeedbackAnalyzer {
    #[must_use]
    pub fn new(min_ratings: usize, min_confidence: f32) -> Self {
        Self {
            min_ratings,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Ratings grouped by the arm they were credited to. Uncredited
    /// feedback is skipped.
    #[must_use]
    pub fn aggregate_by_arm(&self, records: &[FeedbackRecord]) -> BTreeMap<String, RatingStatistics> {
        let mut stats: BTreeMap<String, RatingStatistics> = BTreeMap::new();
        for record in records {
            if let Some(arm) = &record.arm {
                stats.entry(arm.clone()).or_default().add(record);
            }
        }
        stats
    }

    #[must_use]
    pub fn summarize(&self, records: &[FeedbackRecord]) -> RatingStatistics {
        let mut stats = RatingStatistics::default();
        for record in records {
            stats.add(record);
        }
        stats
    }

    #[must_use]
    pub fn analyze_patterns(&self, records: &[FeedbackRecord]) -> Vec<String> {
        let mut patterns = Vec::new();
        if records.len() < self.min_ratings {
            return patterns;
        }

        for (arm, stats) in &self.aggregate_by_arm(records) {
            if stats.total >= PATTERN_MIN_RATINGS_PER_ARM
                && stats.dissatisfaction_rate() > PATTERN_HIGH_DISSATISFACTION
            {
                patterns.push(format!(
                    "High dissatisfaction ({:.1}%) for arm '{}'",
                    stats.dissatisfaction_rate() * 100.0,
                    arm
                ));
            }
        }

        let overall = self.summarize(records);
        if overall.dissatisfaction_rate() > PATTERN_OVERALL_DISSATISFACTION {
            patterns.push(format!(
                "Overall dissatisfaction is high ({:.1}%)",
                overall.dissatisfaction_rate() * 100.0
            ));
        }

        patterns
    }

    /// Returns `None` with too little data, no patterns, or low confidence.
    #[must_use]
    pub fn propose_adjustment(
        &self,
        basis_policy: &str,
        records: &[FeedbackRecord],
    ) -> Option<TuningProposal> {
        if records.len() < self.min_ratings {
            return None;
        }
        let patterns = self.analyze_patterns(records);
        if patterns.is_empty() {
            return None;
        }
        let overall = self.summarize(records);

        #[allow(clippy::cast_precision_loss)]
        let confidence = {
            let sample_confidence =
                (records.len() as f32 / CONFIDENCE_SAMPLE_SIZE_PLATEAU).min(1.0);
            let pattern_confidence = if patterns.len() >= 2 {
                CONFIDENCE_HIGH_PATTERN
            } else {
                CONFIDENCE_LOW_PATTERN
            };
            (sample_confidence * CONFIDENCE_SAMPLE_WEIGHT
                + pattern_confidence * CONFIDENCE_PATTERN_WEIGHT)
                .clamp(0.0, 1.0)
        };
        if confidence < self.min_confidence {
            return None;
        }

        let mut deltas = BTreeMap::new();
        let mut reasoning = Vec::new();
        if overall.dissatisfaction_rate() > PATTERN_OVERALL_DISSATISFACTION {
            deltas.insert("epsilon".to_string(), ADJUSTMENT_EPSILON_DELTA);
            reasoning.push("Reduce exploration while most ratings are poor".to_string());
        }

        Some(TuningProposal {
            version: "0.1.0".to_string(),
            basis_policy: basis_policy.to_string(),
            ts: iso8601_now(),
            deltas,
            confidence,
            evidence: Evidence {
                ratings_analyzed: records.len(),
                dissatisfaction_rate: overall.dissatisfaction_rate(),
                patterns,
            },
            reasoning,
            status: ProposalStatus::Proposed,
        })
    }

    #[must_use]
    pub fn report(&self, basis_policy: &str, records: &[FeedbackRecord]) -> FeedbackReport {
        FeedbackReport {
            overall: self.summarize(records),
            by_arm: self.aggregate_by_arm(records),
            patterns: self.analyze_patterns(records),
            proposal: self.propose_adjustment(basis_policy, records),
        }
    }
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
