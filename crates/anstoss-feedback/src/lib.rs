#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Feedback recording and retrospective analysis.
//!
//! [`FeedbackRecorder`] validates a submission, appends it to the feedback
//! log and, when the caller names the arm that served the event, credits the
//! mapped reward to that arm. The arm is trusted as supplied, except that an
//! agent with a declared arm set only accepts credit for those arms.
//!
//! Crediting a reward to an arm that was never pulled also counts its first
//! pull, so `pulls == 0` always implies `reward_sum == 0`. Only rewards on
//! arms that were already pulled leave `pulls` untouched.
//!
//! [`FeedbackAnalyzer`] only reads the log and proposes tuning; it never
//! touches live arm statistics.

pub mod analysis;
pub mod error;
pub mod reward;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anstoss_core::{EventId, FeedbackLog, NewFeedback, Rating, RewardCredit};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

pub use analysis::{FeedbackAnalyzer, FeedbackReport, RatingStatistics, TuningProposal};
pub use error::{FeedbackError, Result, ValidationError};
pub use reward::RewardMapping;

/// User id recorded when the submission carries none.
pub const ANONYMOUS_USER: &str = "anon";

/// Feedback as submitted by a caller, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Arm that served the event, echoed back from the nudge response.
    #[serde(default)]
    pub bandit_arm: Option<String>,
    /// Agent owning `bandit_arm`; the recorder's default agent when absent.
    #[serde(default)]
    pub agent: Option<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidFeedback {
    pub feedback: NewFeedback,
    pub arm: Option<String>,
    pub agent: Option<String>,
}

impl FeedbackSubmission {
    /// Check every field before any domain logic runs.
    pub fn validate(self, now: OffsetDateTime) -> std::result::Result<ValidFeedback, ValidationError> {
        let event_id = self
            .event_id
            .as_deref()
            .and_then(EventId::parse)
            .ok_or(ValidationError::MissingField("event_id"))?;
        let raw_rating = self.rating.ok_or(ValidationError::MissingField("rating"))?;
        let rating = Rating::new(raw_rating).ok_or(ValidationError::InvalidRating(raw_rating))?;
        let user_id = non_blank(self.user_id).unwrap_or_else(|| ANONYMOUS_USER.to_string());

        Ok(ValidFeedback {
            feedback: NewFeedback {
                event_id,
                user_id,
                rating,
                reason: non_blank(self.reason),
                created_at: now,
            },
            arm: non_blank(self.bandit_arm),
            agent: non_blank(self.agent),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Outcome of a recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackReceipt {
    pub id: i64,
    pub credit: Option<RewardCredit>,
}

/// Appends feedback and feeds rewards back into the arm statistics.
pub struct FeedbackRecorder {
    log: Arc<dyn FeedbackLog>,
    mapping: RewardMapping,
    default_agent: String,
    known_arms: BTreeMap<String, BTreeSet<String>>,
}

impl std::fmt::Debug for FeedbackRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackRecorder")
            .field("mapping", &self.mapping)
            .field("default_agent", &self.default_agent)
            .field("known_arms", &self.known_arms)
            .finish_non_exhaustive()
    }
}

impl FeedbackRecorder {
    pub fn new(
        log: Arc<dyn FeedbackLog>,
        mapping: RewardMapping,
        default_agent: impl Into<String>,
    ) -> Self {
        Self {
            log,
            mapping,
            default_agent: default_agent.into(),
            known_arms: BTreeMap::new(),
        }
    }

    /// Restrict credit for `agent` to `arms`. Feedback naming any other arm
    /// of that agent is still logged, but credits nothing.
    #[must_use]
    pub fn with_arms<I, A>(mut self, agent: impl Into<String>, arms: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.known_arms
            .insert(agent.into(), arms.into_iter().map(Into::into).collect());
        self
    }

    fn accepts(&self, agent: &str, arm: &str) -> bool {
        self.known_arms
            .get(agent)
            .map_or(true, |arms| arms.contains(arm))
    }

    pub fn mapping(&self) -> RewardMapping {
        self.mapping
    }

    /// Validate and record a submission.
    ///
    /// The feedback row and the reward credit are written together; on a
    /// validation error nothing is written. Duplicate submissions are
    /// recorded (and credited) twice.
    pub fn record(&self, submission: FeedbackSubmission) -> Result<FeedbackReceipt> {
        let valid = submission.validate(OffsetDateTime::now_utc()).map_err(|e| {
            warn!(error = %e, "feedback rejected");
            e
        })?;
        self.record_valid(valid)
    }

    pub fn record_valid(&self, valid: ValidFeedback) -> Result<FeedbackReceipt> {
        let agent = valid
            .agent
            .unwrap_or_else(|| self.default_agent.clone());
        let credit = match valid.arm {
            Some(arm) if self.accepts(&agent, &arm) => Some(RewardCredit {
                reward: self.mapping.reward(valid.feedback.rating),
                agent,
                arm,
            }),
            Some(arm) => {
                warn!(agent = %agent, arm = %arm, "arm not known to agent, feedback not credited");
                None
            }
            None => None,
        };

        let id = self.log.append(&valid.feedback, credit.as_ref())?;
        info!(
            id,
            event_id = valid.feedback.event_id.as_str(),
            rating = valid.feedback.rating.get(),
            arm = credit.as_ref().map(|c| c.arm.as_str()),
            reward = credit.as_ref().map(|c| c.reward),
            "feedback recorded"
        );
        Ok(FeedbackReceipt { id, credit })
    }
}
