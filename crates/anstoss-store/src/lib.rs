#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Persistence for arm statistics and the feedback log.
//!
//! Two implementations of the `anstoss-core` storage traits:
//! - [`SqliteStore`]: the durable store used by the service.
//! - [`MemoryStore`]: same semantics behind a single mutex, for tests and
//!   throwaway runs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
