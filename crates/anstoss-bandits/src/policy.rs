//! Auswahlstrategien über einen Schnappschuss der Arm-Statistiken.
//!
//! Beide Strategien verändern den Speicher nicht; das Zählen der Ziehung
//! übernimmt der [`Dispatcher`](crate::Dispatcher).

use anstoss_core::{ArmStat, Decision, Policy};
use rand::prelude::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{BanditError, Result};

/// Konfidenz-Score eines Arms bei `total_pulls` Ziehungen über alle Arme.
///
/// `mean + 2·√total / (pulls + 1)`
#[must_use]
pub fn ucb1_score(arm: &ArmStat, total_pulls: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let bonus = 2.0 * (total_pulls as f64).sqrt() / (arm.pulls as f64 + 1.0);
    arm.mean_reward() + bonus
}

/// UCB1-Näherung.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ucb1;

impl Policy for Ucb1 {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn decide(&self, arms: &[ArmStat], fallback: &str, _rng: &mut dyn RngCore) -> Decision {
        let total_pulls = arms.iter().map(|a| a.pulls).sum::<u64>().max(1);

        // Bei Gleichstand gewinnt der zuerst gesehene Arm.
        let mut best: Option<(&ArmStat, f64)> = None;
        for arm in arms {
            let score = ucb1_score(arm, total_pulls);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((arm, score));
            }
        }

        match best {
            Some((arm, score)) => Decision {
                arm: arm.arm.clone(),
                score,
                why: "ucb1 upper bound".into(),
            },
            None => Decision {
                arm: fallback.to_string(),
                score: 0.0,
                why: "no arms registered".into(),
            },
        }
    }
}

/// ε-greedy über eine feste Arm-Menge.
///
/// Beim Deserialisieren wird `epsilon` wie in [`EpsilonGreedy::new`] geprüft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EpsilonGreedyParams")]
pub struct EpsilonGreedy {
    epsilon: f64,
    arms: Vec<String>,
}

#[derive(Deserialize)]
struct EpsilonGreedyParams {
    epsilon: f64,
    #[serde(default)]
    arms: Vec<String>,
}

impl TryFrom<EpsilonGreedyParams> for EpsilonGreedy {
    type Error = BanditError;

    fn try_from(p: EpsilonGreedyParams) -> Result<Self> {
        Self::new(p.epsilon, p.arms)
    }
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self {
            epsilon: 0.2,
            arms: vec!["coach".into(), "friendly".into()],
        }
    }
}

impl EpsilonGreedy {
    /// `epsilon` muss in `[0, 1]` liegen. Eine leere `arms`-Liste bedeutet:
    /// über die registrierten Arme des Schnappschusses wählen.
    pub fn new(epsilon: f64, arms: Vec<String>) -> Result<Self> {
        if !epsilon.is_finite() || !(0.0..=1.0).contains(&epsilon) {
            return Err(BanditError::InvalidEpsilon(epsilon));
        }
        Ok(Self { epsilon, arms })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn arms(&self) -> &[String] {
        &self.arms
    }

    /// Persistierbare Parameter als JSON.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({"epsilon": self.epsilon, "arms": self.arms})
    }
}

impl Policy for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon-greedy"
    }

    fn decide(&self, arms: &[ArmStat], fallback: &str, rng: &mut dyn RngCore) -> Decision {
        let candidates: Vec<&str> = if self.arms.is_empty() {
            arms.iter().map(|a| a.arm.as_str()).collect()
        } else {
            self.arms.iter().map(String::as_str).collect()
        };
        if candidates.is_empty() {
            return Decision {
                arm: fallback.to_string(),
                score: 0.0,
                why: "no arms registered".into(),
            };
        }

        let mean_of = |name: &str| {
            arms.iter()
                .find(|a| a.arm == name)
                .map_or(0.0, ArmStat::mean_reward)
        };

        if rng.gen::<f64>() < self.epsilon {
            if let Some(&pick) = candidates.choose(rng) {
                return Decision {
                    arm: pick.to_string(),
                    score: mean_of(pick),
                    why: "explore ε".into(),
                };
            }
        }

        let mut best = candidates[0];
        let mut best_mean = mean_of(best);
        for &name in &candidates[1..] {
            let mean = mean_of(name);
            if mean > best_mean {
                best = name;
                best_mean = mean;
            }
        }
        Decision {
            arm: best.to_string(),
            score: best_mean,
            why: "exploit mean reward".into(),
        }
    }
}

/// Konfigurierbare Strategie.
#[derive(Debug, Clone)]
pub enum Strategy {
    Ucb1(Ucb1),
    EpsilonGreedy(EpsilonGreedy),
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Ucb1(Ucb1)
    }
}

impl Policy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Ucb1(p) => p.name(),
            Self::EpsilonGreedy(p) => p.name(),
        }
    }

    fn decide(&self, arms: &[ArmStat], fallback: &str, rng: &mut dyn RngCore) -> Decision {
        match self {
            Self::Ucb1(p) => p.decide(arms, fallback, rng),
            Self::EpsilonGreedy(p) => p.decide(arms, fallback, rng),
        }
    }
}
