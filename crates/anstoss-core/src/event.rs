//! Referenzen auf ausgelieferte Ereignisse und das Feedback dazu.
//!
//! Ereignisse (Mahlzeit, Training, Anstoß) gehören externen Diensten; anstoss
//! kennt nur ihre opake Kennung. Feedback-Einträge werden ausschließlich
//! angehängt und nie verändert.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opake, nicht-leere Kennung eines ausgelieferten Ereignisses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Liefert `None` für leere oder nur aus Leerzeichen bestehende Kennungen.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Bewertung zwischen 1 und 5 (inklusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            u8::try_from(value).ok().map(Self)
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("rating must be 1-5, got {value}"))
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        i64::from(rating.0)
    }
}

/// Validiertes Feedback, bereit zum Anhängen an das Log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub event_id: EventId,
    pub user_id: String,
    pub rating: Rating,
    pub reason: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Persistierter Feedback-Eintrag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub event_id: String,
    pub user_id: String,
    pub rating: Rating,
    pub reason: Option<String>,
    /// Agent und Arm, denen die Belohnung gutgeschrieben wurde.
    pub agent: Option<String>,
    pub arm: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
