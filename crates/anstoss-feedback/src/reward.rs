use std::fmt;
use std::str::FromStr;

use anstoss_core::Rating;
use serde::{Deserialize, Serialize};

/// How a 1-5 rating becomes a reward in `[0, 1]`.
///
/// The reward is added to the arm's `reward_sum`. If the arm has no pulls yet,
/// a positive reward also counts as its first pull; see [`anstoss_core::store::pull_increment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardMapping {
    /// `rating / 5`: 1..5 onto 0.2..1.0.
    #[default]
    Linear,
    /// `(rating - 3) / 2` clamped to `[0, 1]`: only 4 and 5 earn reward.
    Centered,
}

impl RewardMapping {
    #[must_use]
    pub fn reward(self, rating: Rating) -> f64 {
        let r = f64::from(rating.get());
        match self {
            Self::Linear => r / 5.0,
            Self::Centered => ((r - 3.0) / 2.0).clamp(0.0, 1.0),
        }
    }
}

impl fmt::Display for RewardMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linear => "linear",
            Self::Centered => "centered",
        })
    }
}

impl FromStr for RewardMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "centered" => Ok(Self::Centered),
            other => Err(format!(
                "unknown reward mapping '{other}' (expected 'linear' or 'centered')"
            )),
        }
    }
}
