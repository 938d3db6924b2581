//! Scripted client run against a live server: one nudge, five-star feedback
//! for the arm that served it, then the updated arm statistics.

use std::time::Duration;

use anyhow::{Context, Result};
use anstoss_bandits::Nudge;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::server::ArmView;

#[derive(Debug)]
pub struct DemoOutcome {
    pub nudge: Nudge,
    pub event_id: String,
    pub arms: Vec<ArmView>,
}

pub async fn run(base_url: &str) -> Result<DemoOutcome> {
    let base = base_url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let nudge: Nudge = client
        .post(format!("{base}/nudge/send"))
        .json(&json!({"user_id": "demo-user", "tone": "coach", "goal": "stay_consistent"}))
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid nudge response")?;

    let event_id = format!("demo-{}", OffsetDateTime::now_utc().unix_timestamp());
    let ack: Value = client
        .post(format!("{base}/feedback"))
        .json(&json!({
            "event_id": event_id,
            "user_id": "demo-user",
            "rating": 5,
            "reason": "demo run",
            "bandit_arm": nudge.arm_used,
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("invalid feedback response")?;
    if ack.get("ok") != Some(&Value::Bool(true)) {
        anyhow::bail!("feedback not acknowledged: {ack}");
    }

    let arms: Vec<ArmView> = client
        .get(format!("{base}/bandit/arms"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("invalid arms response")?;

    Ok(DemoOutcome {
        nudge,
        event_id,
        arms,
    })
}
