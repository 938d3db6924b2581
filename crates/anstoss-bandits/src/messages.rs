//! Nachrichtenvorlagen pro Arm.

use std::collections::BTreeMap;

use crate::error::{BanditError, Result};

const COACH: &[&str] = &[
    "Small steps add up. Let's finish one task now.",
    "You're capable of more than you think. Crush this session.",
];
const FRIENDLY: &[&str] = &[
    "Hey! Want to move together for 10 minutes?",
    "Your future self will high-five you for this meal choice!",
];
const STRICT: &[&str] = &[
    "No excuses: you planned this, now execute.",
    "Discipline beats motivation. Start now.",
];

/// Nicht-leere Vorlagen je Arm plus ein Standard-Arm für unbekannte Arme.
#[derive(Debug, Clone)]
pub struct MessagePool {
    default_arm: String,
    templates: BTreeMap<String, Vec<String>>,
}

impl MessagePool {
    /// Baut einen Pool; jeder Arm braucht mindestens eine Vorlage und
    /// `default_arm` muss enthalten sein.
    pub fn new<I, A, M>(default_arm: impl Into<String>, templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, Vec<M>)>,
        A: Into<String>,
        M: Into<String>,
    {
        let default_arm = default_arm.into();
        let mut map = BTreeMap::new();
        for (arm, messages) in templates {
            let arm = arm.into();
            let messages: Vec<String> = messages.into_iter().map(Into::into).collect();
            if messages.is_empty() {
                return Err(BanditError::EmptyPool(arm));
            }
            map.insert(arm, messages);
        }
        if !map.contains_key(&default_arm) {
            return Err(BanditError::EmptyPool(default_arm));
        }
        Ok(Self {
            default_arm,
            templates: map,
        })
    }

    /// Eingebaute Tonlagen `coach`, `friendly` und `strict`; Standard ist `coach`.
    pub fn builtin() -> Self {
        let templates = [("coach", COACH), ("friendly", FRIENDLY), ("strict", STRICT)]
            .into_iter()
            .map(|(arm, msgs)| {
                (
                    arm.to_string(),
                    msgs.iter().map(|m| (*m).to_string()).collect::<Vec<_>>(),
                )
            })
            .collect();
        Self {
            default_arm: "coach".into(),
            templates,
        }
    }

    pub fn default_arm(&self) -> &str {
        &self.default_arm
    }

    pub fn contains(&self, arm: &str) -> bool {
        self.templates.contains_key(arm)
    }

    pub fn arms(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Arm und Vorlagen, die für `arm` tatsächlich verwendet werden.
    /// Unbekannte Arme fallen auf den Standard-Arm zurück.
    pub fn resolve<'a>(&'a self, arm: &'a str) -> (&'a str, &'a [String]) {
        match self.templates.get_key_value(arm) {
            Some((name, msgs)) => (name.as_str(), msgs.as_slice()),
            None => {
                let msgs = self
                    .templates
                    .get(&self.default_arm)
                    .map_or(&[][..], Vec::as_slice);
                (self.default_arm.as_str(), msgs)
            }
        }
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::builtin()
    }
}
