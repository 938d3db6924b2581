//! Service layer for anstoss: configuration, the HTTP API and the demo client.

pub mod config;
pub mod demo;
pub mod server;

pub use config::{AppConfig, StrategyKind};
pub use server::{router, AppState};
