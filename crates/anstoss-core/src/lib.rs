//! Kerntypen und Traits für anstoss.
//!
//! Ein *Agent* gruppiert eine feste Menge benannter *Arme* (z. B. die Tonlagen
//! eines Motivations-Anstoßes). Für jedes Paar (Agent, Arm) werden Ziehungen
//! und kumulierte Belohnung gezählt; eine [`Policy`] wählt daraus den nächsten
//! Arm, ohne selbst den Speicher zu verändern.

pub mod error;
pub mod event;
pub mod store;

use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use error::StoreError;
pub use event::{EventId, FeedbackRecord, NewFeedback, Rating};
pub use store::{ArmStore, FeedbackLog, RewardCredit};

/// Akkumulierte Statistik eines Arms eines Agenten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStat {
    pub agent: String,
    pub arm: String,
    pub pulls: u64,
    pub reward_sum: f64,
}

impl ArmStat {
    /// Frisch registrierter Arm ohne Historie.
    pub fn new(agent: impl Into<String>, arm: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            arm: arm.into(),
            pulls: 0,
            reward_sum: 0.0,
        }
    }

    /// Mittlere Belohnung; `0.0` solange der Arm nie gezogen wurde.
    #[must_use]
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.reward_sum / self.pulls as f64
        }
    }
}

/// Ziel, das der Nutzer mit dem Anstoß verfolgt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    #[default]
    StayConsistent,
    Start,
    Recover,
}

/// Kontext einer Anstoß-Anfrage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeContext {
    pub user_id: String,
    /// Gewünschte Tonlage; dient der Policy als Rückfall-Arm.
    pub tone: String,
    pub goal: Goal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub arm: String,
    pub score: f64,
    pub why: String,
}

/// Auswahlstrategie über einen Schnappschuss der Arm-Statistiken.
///
/// Implementierungen sind reine Funktionen von `arms` und `rng`. Das Zählen
/// der Ziehung ist ein eigener Schritt des Aufrufers.
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decide(&self, arms: &[ArmStat], fallback: &str, rng: &mut dyn RngCore) -> Decision;
}
