use std::sync::{Mutex, MutexGuard};

use anstoss_core::error::Result;
use anstoss_core::store::{check_reward, pull_increment};
use anstoss_core::{
    ArmStat, ArmStore, FeedbackLog, FeedbackRecord, NewFeedback, RewardCredit, StoreError,
};

/// In-memory store. One lock guards both tables, so feedback and its credit
/// land together.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    arms: Vec<ArmStat>,
    feedback: Vec<FeedbackRecord>,
}

impl Tables {
    fn arm_mut(&mut self, agent: &str, arm: &str) -> &mut ArmStat {
        let idx = match self
            .arms
            .iter()
            .position(|a| a.agent == agent && a.arm == arm)
        {
            Some(idx) => idx,
            None => {
                self.arms.push(ArmStat::new(agent, arm));
                self.arms.len() - 1
            }
        };
        &mut self.arms[idx]
    }

    fn apply(&mut self, agent: &str, arm: &str, pulled: bool, reward: Option<f64>) {
        let stat = self.arm_mut(agent, arm);
        stat.pulls += pull_increment(stat.pulls, pulled, reward);
        stat.reward_sum += reward.unwrap_or(0.0);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))
    }
}

impl ArmStore for MemoryStore {
    fn ensure_arm(&self, agent: &str, arm: &str) -> Result<()> {
        self.lock()?.arm_mut(agent, arm);
        Ok(())
    }

    fn get_arms(&self, agent: &str) -> Result<Vec<ArmStat>> {
        Ok(self
            .lock()?
            .arms
            .iter()
            .filter(|a| a.agent == agent)
            .cloned()
            .collect())
    }

    fn update(&self, agent: &str, arm: &str, pulled: bool, reward: Option<f64>) -> Result<()> {
        let reward = check_reward(reward)?;
        self.lock()?.apply(agent, arm, pulled, reward);
        Ok(())
    }
}

impl FeedbackLog for MemoryStore {
    fn append(&self, feedback: &NewFeedback, credit: Option<&RewardCredit>) -> Result<i64> {
        if let Some(c) = credit {
            check_reward(Some(c.reward))?;
        }
        let mut tables = self.lock()?;
        let id = i64::try_from(tables.feedback.len())
            .map_err(|_| StoreError::Unavailable("feedback log full".into()))?
            + 1;
        tables.feedback.push(FeedbackRecord {
            id,
            event_id: feedback.event_id.as_str().to_string(),
            user_id: feedback.user_id.clone(),
            rating: feedback.rating,
            reason: feedback.reason.clone(),
            agent: credit.map(|c| c.agent.clone()),
            arm: credit.map(|c| c.arm.clone()),
            created_at: feedback.created_at,
        });
        if let Some(c) = credit {
            tables.apply(&c.agent, &c.arm, false, Some(c.reward));
        }
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .lock()?
            .feedback
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anstoss_core::{EventId, Rating};
    use std::sync::Arc;
    use time::OffsetDateTime;

    #[test]
    fn ensure_arm_twice_yields_one_zeroed_row() {
        let store = MemoryStore::new();
        store.ensure_arm("motivation", "coach").unwrap();
        store.ensure_arm("motivation", "coach").unwrap();
        assert_eq!(
            store.get_arms("motivation").unwrap(),
            vec![ArmStat::new("motivation", "coach")]
        );
    }

    #[test]
    fn concurrent_updates_sum_exactly() {
        let store = Arc::new(MemoryStore::new());
        store.update("motivation", "coach", true, None).unwrap();
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.update("motivation", "coach", false, Some(1.0)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let arms = store.get_arms("motivation").unwrap();
        assert_eq!(arms[0].pulls, 1);
        assert!((arms[0].reward_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = MemoryStore::new();
        for (i, rating) in [4, 2, 5].into_iter().enumerate() {
            let fb = NewFeedback {
                event_id: EventId::parse(&format!("evt-{i}")).unwrap(),
                user_id: "anon".into(),
                rating: Rating::new(rating).unwrap(),
                reason: None,
                created_at: OffsetDateTime::now_utc(),
            };
            store.append(&fb, None).unwrap();
        }
        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_id, "evt-2");
        assert_eq!(recent[1].event_id, "evt-1");
    }
}
