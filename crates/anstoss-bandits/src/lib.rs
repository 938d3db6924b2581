//! Bandit-Policies und Anstoß-Versand für anstoss.
//!
//! - [`Ucb1`] wählt nach oberer Konfidenzschranke (Standard für Anstöße).
//! - [`EpsilonGreedy`] exploriert mit Wahrscheinlichkeit `epsilon` über eine
//!   feste Arm-Menge und nutzt sonst den besten Mittelwert.
//! - [`Dispatcher`] verbindet Policy, Speicher und [`MessagePool`].

#[allow(unused_macros)]
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::debug!($($arg)*);
    }};
}

pub mod dispatch;
pub mod error;
pub mod messages;
pub mod policy;

pub use dispatch::{Dispatcher, Nudge};
pub use error::{BanditError, Result};
pub use messages::MessagePool;
pub use policy::{ucb1_score, EpsilonGreedy, Strategy, Ucb1};
