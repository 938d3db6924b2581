//! Versand von Anstößen: Policy befragen, Vorlage wählen, Ziehung zählen.

use std::sync::Arc;

use anstoss_core::{ArmStore, Decision, NudgeContext, Policy};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{BanditError, Result};
use crate::messages::MessagePool;

/// Ergebnis eines Versands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nudge {
    pub message: String,
    pub arm_used: String,
}

/// Wählt Arme eines Agenten und zählt deren Ziehungen im Speicher.
pub struct Dispatcher {
    agent: String,
    store: Arc<dyn ArmStore>,
    policy: Box<dyn Policy>,
    pool: MessagePool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("agent", &self.agent)
            .field("policy", &self.policy.name())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        agent: impl Into<String>,
        store: Arc<dyn ArmStore>,
        policy: Box<dyn Policy>,
        pool: MessagePool,
    ) -> Self {
        Self {
            agent: agent.into(),
            store,
            policy,
            pool,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Registriert `arms` idempotent mit Nullzählern.
    pub fn register<'a>(&self, arms: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for arm in arms {
            self.store.ensure_arm(&self.agent, arm)?;
        }
        Ok(())
    }

    /// Entscheidung auf dem aktuellen Schnappschuss, ohne etwas zu zählen.
    pub fn preview(&self, fallback: &str, rng: &mut dyn RngCore) -> Result<Decision> {
        let arms = self.store.get_arms(&self.agent)?;
        Ok(self.policy.decide(&arms, fallback, rng))
    }

    /// Wählt einen Arm und zählt die Ziehung.
    pub fn choose(&self, fallback: &str, rng: &mut dyn RngCore) -> Result<Decision> {
        let decision = self.preview(fallback, rng)?;
        self.store.update(&self.agent, &decision.arm, true, None)?;
        debug_log!(
            agent = %self.agent,
            arm = %decision.arm,
            why = %decision.why,
            "arm chosen"
        );
        Ok(decision)
    }

    /// Versendet einen Anstoß für `ctx`.
    ///
    /// Die gewünschte Tonlage dient als Rückfall-Arm. Gezählt und als
    /// `arm_used` gemeldet wird immer der Arm der Policy; nur die Vorlage
    /// fällt für Arme ohne eigene Vorlagen auf den Standard-Arm zurück.
    pub fn dispatch(&self, ctx: &NudgeContext, rng: &mut dyn RngCore) -> Result<Nudge> {
        let decision = self.preview(&ctx.tone, rng)?;
        let (served_from, templates) = self.pool.resolve(&decision.arm);
        let message = templates
            .choose(rng)
            .ok_or_else(|| BanditError::EmptyPool(served_from.to_string()))?
            .clone();

        self.store.update(&self.agent, &decision.arm, true, None)?;
        debug_log!(
            agent = %self.agent,
            user_id = %ctx.user_id,
            goal = ?ctx.goal,
            arm = %decision.arm,
            templates = %served_from,
            score = decision.score,
            why = %decision.why,
            "nudge dispatched"
        );

        Ok(Nudge {
            message,
            arm_used: decision.arm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EpsilonGreedy, Ucb1};
    use anstoss_core::{ArmStat, Goal};
    use anstoss_store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx(tone: &str) -> NudgeContext {
        NudgeContext {
            user_id: "demo-user".into(),
            tone: tone.into(),
            goal: Goal::StayConsistent,
        }
    }

    fn ucb_dispatcher(store: Arc<MemoryStore>) -> Dispatcher {
        Dispatcher::new("motivation", store, Box::new(Ucb1), MessagePool::builtin())
    }

    #[test]
    fn first_nudge_uses_requested_tone_and_counts_pull() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = ucb_dispatcher(Arc::clone(&store));
        let mut rng = StdRng::seed_from_u64(9);

        let nudge = dispatcher.dispatch(&ctx("friendly"), &mut rng).unwrap();
        assert_eq!(nudge.arm_used, "friendly");
        let pool = MessagePool::builtin();
        let (_, templates) = pool.resolve("friendly");
        assert!(templates.contains(&nudge.message));

        let arms = store.get_arms("motivation").unwrap();
        assert_eq!(arms.len(), 1);
        assert_eq!(arms[0].pulls, 1);
        assert!(arms[0].reward_sum.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_tone_uses_default_templates_but_counts_the_chosen_arm() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = ucb_dispatcher(Arc::clone(&store));
        let mut rng = StdRng::seed_from_u64(9);

        let nudge = dispatcher.dispatch(&ctx("sarcastic"), &mut rng).unwrap();
        assert_eq!(nudge.arm_used, "sarcastic");
        let pool = MessagePool::builtin();
        let (_, coach) = pool.resolve("coach");
        assert!(coach.contains(&nudge.message));

        let arms = store.get_arms("motivation").unwrap();
        assert_eq!(arms.len(), 1);
        assert_eq!(arms[0].arm, "sarcastic");
        assert_eq!(arms[0].pulls, 1);
    }

    #[test]
    fn arm_without_templates_keeps_being_explored_away_from() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = ucb_dispatcher(Arc::clone(&store));
        dispatcher.register(dispatcher.pool().arms()).unwrap();
        store.update("motivation", "sarcastic", true, Some(1.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mut used = std::collections::BTreeMap::<String, u64>::new();
        for _ in 0..60 {
            let nudge = dispatcher.dispatch(&ctx("coach"), &mut rng).unwrap();
            *used.entry(nudge.arm_used).or_default() += 1;
        }
        for arm in ["coach", "friendly", "strict"] {
            assert!(used.get(arm).copied().unwrap_or(0) > 0, "{arm} never used: {used:?}");
        }
        let total: u64 = store.get_arms("motivation").unwrap().iter().map(|a| a.pulls).sum();
        assert_eq!(total, 61);
    }

    #[test]
    fn dispatch_follows_ucb_over_registered_arms() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..10 {
            store.update("motivation", "coach", true, None).unwrap();
        }
        store.update("motivation", "coach", false, Some(6.0)).unwrap();
        store.update("motivation", "friendly", true, None).unwrap();
        store.update("motivation", "friendly", true, Some(0.5)).unwrap();

        let dispatcher = ucb_dispatcher(Arc::clone(&store));
        let mut rng = StdRng::seed_from_u64(1);
        let nudge = dispatcher.dispatch(&ctx("coach"), &mut rng).unwrap();
        assert_eq!(nudge.arm_used, "friendly");

        let friendly = store
            .get_arms("motivation")
            .unwrap()
            .into_iter()
            .find(|a| a.arm == "friendly")
            .unwrap();
        assert_eq!(friendly.pulls, 3);
    }

    #[test]
    fn preview_does_not_mutate() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = ucb_dispatcher(Arc::clone(&store));
        dispatcher.register(["coach", "strict"]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);

        let decision = dispatcher.preview("coach", &mut rng).unwrap();
        assert_eq!(decision.arm, "coach");
        assert_eq!(
            store.get_arms("motivation").unwrap(),
            vec![
                ArmStat::new("motivation", "coach"),
                ArmStat::new("motivation", "strict")
            ]
        );
    }

    #[test]
    fn choose_counts_pull_for_epsilon_greedy() {
        let store = Arc::new(MemoryStore::new());
        let policy = EpsilonGreedy::new(0.0, vec!["coach".into(), "friendly".into()]).unwrap();
        let dispatcher = Dispatcher::new(
            "motivation_tone",
            Arc::clone(&store) as Arc<dyn ArmStore>,
            Box::new(policy),
            MessagePool::builtin(),
        );
        dispatcher.register(["coach", "friendly"]).unwrap();
        store.update("motivation_tone", "friendly", true, Some(1.0)).unwrap();

        let mut rng = StdRng::seed_from_u64(4);
        let decision = dispatcher.choose("coach", &mut rng).unwrap();
        assert_eq!(decision.arm, "friendly");
        let friendly = &store.get_arms("motivation_tone").unwrap()[1];
        assert_eq!(friendly.pulls, 2);
    }
}
