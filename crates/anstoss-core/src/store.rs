//! Speicher-Verträge für Arm-Statistiken und das Feedback-Log.
//!
//! Die Implementierungen leben in `anstoss-store`; hier stehen nur die Traits
//! und die Regeln, die jede Implementierung gleich anwenden muss.

use crate::error::{Result, StoreError};
use crate::event::{FeedbackRecord, NewFeedback};
use crate::ArmStat;

/// Gutschrift einer Belohnung auf einen Arm.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardCredit {
    pub agent: String,
    pub arm: String,
    pub reward: f64,
}

/// Persistente Zähler pro (Agent, Arm).
pub trait ArmStore: Send + Sync {
    /// Legt den Arm mit Nullzählern an, falls er fehlt. Idempotent.
    fn ensure_arm(&self, agent: &str, arm: &str) -> Result<()>;

    /// Alle registrierten Arme des Agenten in Registrierungsreihenfolge.
    fn get_arms(&self, agent: &str) -> Result<Vec<ArmStat>>;

    /// Stellt den Arm sicher und erhöht atomar `pulls` (falls `pulled`) sowie
    /// `reward_sum` (um `reward`). Ohne Ziehung und ohne Belohnung wird nur
    /// sichergestellt, dass der Arm existiert.
    fn update(&self, agent: &str, arm: &str, pulled: bool, reward: Option<f64>) -> Result<()>;
}

/// Append-only Log der Bewertungen.
pub trait FeedbackLog: Send + Sync {
    /// Hängt `feedback` an und schreibt `credit` in derselben Transaktion gut.
    /// Liefert die vergebene Zeilen-ID.
    fn append(&self, feedback: &NewFeedback, credit: Option<&RewardCredit>) -> Result<i64>;

    /// Die jüngsten `limit` Einträge, neueste zuerst.
    fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>>;
}

/// Belohnungen müssen endlich und nicht-negativ sein.
pub fn check_reward(reward: Option<f64>) -> Result<Option<f64>> {
    match reward {
        Some(r) if !r.is_finite() || r < 0.0 => Err(StoreError::InvalidReward(r)),
        other => Ok(other),
    }
}

/// Um wie viel `pulls` bei einem Update wächst.
///
/// Eine positive Belohnung auf einen nie gezogenen Arm zählt als dessen erste
/// Ziehung, damit `pulls == 0 ⇒ reward_sum == 0` erhalten bleibt.
pub fn pull_increment(current_pulls: u64, pulled: bool, reward: Option<f64>) -> u64 {
    let rewarded = reward.is_some_and(|r| r > 0.0);
    u64::from(pulled || (current_pulls == 0 && rewarded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_nan_rewards_are_rejected() {
        assert!(matches!(
            check_reward(Some(-0.1)),
            Err(StoreError::InvalidReward(_))
        ));
        assert!(check_reward(Some(f64::NAN)).is_err());
        assert!(check_reward(Some(f64::INFINITY)).is_err());
        assert_eq!(check_reward(Some(0.4)).ok(), Some(Some(0.4)));
        assert_eq!(check_reward(None).ok(), Some(None));
    }

    #[test]
    fn reward_on_fresh_arm_counts_as_first_pull() {
        assert_eq!(pull_increment(0, false, Some(1.0)), 1);
        assert_eq!(pull_increment(3, false, Some(1.0)), 0);
        assert_eq!(pull_increment(0, false, Some(0.0)), 0);
        assert_eq!(pull_increment(0, false, None), 0);
        assert_eq!(pull_increment(3, true, Some(0.5)), 1);
    }
}
