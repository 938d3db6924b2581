//! SQLite store.
//!
//! Every mutation is a single statement or a single transaction, so
//! concurrent writers never lose an increment.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anstoss_core::error::Result;
use anstoss_core::store::check_reward;
use anstoss_core::{
    ArmStat, ArmStore, FeedbackLog, FeedbackRecord, NewFeedback, Rating, RewardCredit, StoreError,
};
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("../migrations/001_initial.sql");

const ENSURE_ARM: &str = "INSERT OR IGNORE INTO bandit_arm (agent, arm) VALUES (?1, ?2)";

// ?3 = pulled (0/1), ?4 = reward. The pull rule mirrors
// `anstoss_core::store::pull_increment`.
const UPSERT_ARM: &str = "
    INSERT INTO bandit_arm (agent, arm, pulls, reward_sum)
    VALUES (?1, ?2, CASE WHEN ?3 = 1 OR ?4 > 0 THEN 1 ELSE 0 END, ?4)
    ON CONFLICT(agent, arm) DO UPDATE SET
        pulls = bandit_arm.pulls
            + CASE WHEN ?3 = 1 OR (bandit_arm.pulls = 0 AND ?4 > 0) THEN 1 ELSE 0 END,
        reward_sum = bandit_arm.reward_sum + ?4";

/// SQLite-backed [`ArmStore`] and [`FeedbackLog`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(db_err)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "opened sqlite store");
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("schema migration applied");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("database lock poisoned: {e}")))
    }

    /// Look up a single arm.
    pub fn arm(&self, agent: &str, arm: &str) -> Result<Option<ArmStat>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT agent, arm, pulls, reward_sum FROM bandit_arm WHERE agent = ?1 AND arm = ?2",
                params![agent, arm],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;
        row.map(arm_from_row).transpose()
    }
}

impl ArmStore for SqliteStore {
    fn ensure_arm(&self, agent: &str, arm: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(ENSURE_ARM, params![agent, arm]).map_err(db_err)?;
        Ok(())
    }

    fn get_arms(&self, agent: &str) -> Result<Vec<ArmStat>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT agent, arm, pulls, reward_sum FROM bandit_arm
                 WHERE agent = ?1 ORDER BY id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![agent], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(arm_from_row).collect()
    }

    fn update(&self, agent: &str, arm: &str, pulled: bool, reward: Option<f64>) -> Result<()> {
        let reward = check_reward(reward)?;
        let conn = self.lock_conn()?;
        apply_update(&conn, agent, arm, pulled, reward)
    }
}

impl FeedbackLog for SqliteStore {
    fn append(&self, feedback: &NewFeedback, credit: Option<&RewardCredit>) -> Result<i64> {
        if let Some(c) = credit {
            check_reward(Some(c.reward))?;
        }
        let created_at = feedback
            .created_at
            .format(&Rfc3339)
            .map_err(|e| StoreError::Corrupt(format!("created_at: {e}")))?;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO feedback (event_id, user_id, rating, reason, agent, arm, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feedback.event_id.as_str(),
                feedback.user_id,
                i64::from(feedback.rating),
                feedback.reason,
                credit.map(|c| c.agent.as_str()),
                credit.map(|c| c.arm.as_str()),
                created_at,
            ],
        )
        .map_err(db_err)?;
        let id = tx.last_insert_rowid();
        if let Some(c) = credit {
            apply_update(&tx, &c.agent, &c.arm, false, Some(c.reward))?;
        }
        tx.commit().map_err(db_err)?;
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, event_id, user_id, rating, reason, agent, arm, created_at
                 FROM feedback ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(FeedbackRow {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    user_id: row.get(2)?,
                    rating: row.get(3)?,
                    reason: row.get(4)?,
                    agent: row.get(5)?,
                    arm: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(FeedbackRow::into_record).collect()
    }
}

struct FeedbackRow {
    id: i64,
    event_id: String,
    user_id: String,
    rating: i64,
    reason: Option<String>,
    agent: Option<String>,
    arm: Option<String>,
    created_at: String,
}

impl FeedbackRow {
    fn into_record(self) -> Result<FeedbackRecord> {
        let rating = Rating::new(self.rating)
            .ok_or_else(|| StoreError::Corrupt(format!("feedback {}: rating {}", self.id, self.rating)))?;
        let created_at = OffsetDateTime::parse(&self.created_at, &Rfc3339)
            .map_err(|e| StoreError::Corrupt(format!("feedback {}: created_at: {e}", self.id)))?;
        Ok(FeedbackRecord {
            id: self.id,
            event_id: self.event_id,
            user_id: self.user_id,
            rating,
            reason: self.reason,
            agent: self.agent,
            arm: self.arm,
            created_at,
        })
    }
}

fn apply_update(
    conn: &Connection,
    agent: &str,
    arm: &str,
    pulled: bool,
    reward: Option<f64>,
) -> Result<()> {
    if !pulled && reward.is_none() {
        conn.execute(ENSURE_ARM, params![agent, arm]).map_err(db_err)?;
        return Ok(());
    }
    conn.execute(
        UPSERT_ARM,
        params![agent, arm, i64::from(pulled), reward.unwrap_or(0.0)],
    )
    .map_err(db_err)?;
    Ok(())
}

fn arm_from_row((agent, arm, pulls, reward_sum): (String, String, i64, f64)) -> Result<ArmStat> {
    let pulls = u64::try_from(pulls)
        .map_err(|_| StoreError::Corrupt(format!("{agent}/{arm}: negative pulls {pulls}")))?;
    Ok(ArmStat {
        agent,
        arm,
        pulls,
        reward_sum,
    })
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}
