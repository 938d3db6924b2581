//! Runtime configuration, from flags or `ANSTOSS_*` environment variables.

use std::path::PathBuf;

use anstoss_bandits::{BanditError, EpsilonGreedy, MessagePool, Strategy, Ucb1};
use anstoss_feedback::RewardMapping;
use clap::{Args, ValueEnum};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    #[default]
    Ucb1,
    EpsilonGreedy,
}

#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// SQLite database path (`:memory:` for a throwaway database)
    #[arg(long, env = "ANSTOSS_DB", default_value = "data/anstoss.db")]
    pub db: PathBuf,

    /// Agent whose arms drive `/nudge/send` and receive feedback rewards
    #[arg(long, env = "ANSTOSS_AGENT", default_value = "motivation")]
    pub agent: String,

    /// Selection strategy for nudges
    #[arg(long, env = "ANSTOSS_STRATEGY", value_enum, default_value_t = StrategyKind::Ucb1)]
    pub strategy: StrategyKind,

    /// Exploration rate for epsilon-greedy selection
    #[arg(long, env = "ANSTOSS_EPSILON", default_value_t = 0.2)]
    pub epsilon: f64,

    /// Rating to reward mapping: `linear` (rating/5) or `centered` ((rating-3)/2, clamped)
    #[arg(long, env = "ANSTOSS_REWARD_MAPPING", default_value = "linear")]
    pub reward_mapping: RewardMapping,

    /// Agent behind `GET /bandit/choose`
    #[arg(long, env = "ANSTOSS_CHOICE_AGENT", default_value = "motivation_tone")]
    pub choice_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("data/anstoss.db"),
            agent: "motivation".into(),
            strategy: StrategyKind::Ucb1,
            epsilon: 0.2,
            reward_mapping: RewardMapping::Linear,
            choice_agent: "motivation_tone".into(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent.trim().is_empty() {
            anyhow::bail!("agent must not be empty");
        }
        if self.choice_agent.trim().is_empty() {
            anyhow::bail!("choice agent must not be empty");
        }
        self.choice_policy()?;
        Ok(())
    }

    /// Strategy used for nudges. Epsilon-greedy explores over the pool's arms.
    pub fn nudge_policy(&self, pool: &MessagePool) -> Result<Strategy, BanditError> {
        Ok(match self.strategy {
            StrategyKind::Ucb1 => Strategy::Ucb1(Ucb1),
            StrategyKind::EpsilonGreedy => Strategy::EpsilonGreedy(EpsilonGreedy::new(
                self.epsilon,
                pool.arms().map(str::to_string).collect(),
            )?),
        })
    }

    /// Epsilon-greedy over the fixed tone arms of the choice agent.
    pub fn choice_policy(&self) -> Result<EpsilonGreedy, BanditError> {
        EpsilonGreedy::new(self.epsilon, EpsilonGreedy::default().arms().to_vec())
    }
}
