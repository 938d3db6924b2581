//! Liest einen Schnappschuss von Arm-Statistiken (JSON-Array) von stdin und
//! gibt die UCB1-Entscheidung aus.
//!
//! ```text
//! echo '[{"agent":"motivation","arm":"coach","pulls":10,"reward_sum":6.0}]' \
//!     | cargo run -p anstoss-bandits --example choose
//! ```

use std::io::{self, Read};

use anstoss_bandits::{ucb1_score, Ucb1};
use anstoss_core::{ArmStat, Decision, Policy};
use rand::thread_rng;
use serde::Serialize;

#[derive(Serialize)]
struct Scored<'a> {
    arm: &'a str,
    score: f64,
}

#[derive(Serialize)]
struct Report<'a> {
    scores: Vec<Scored<'a>>,
    decision: Decision,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let arms: Vec<ArmStat> = if input.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&input)?
    };

    let total = arms.iter().map(|a| a.pulls).sum::<u64>().max(1);
    let scores = arms
        .iter()
        .map(|a| Scored {
            arm: &a.arm,
            score: ucb1_score(a, total),
        })
        .collect();
    let decision = Ucb1.decide(&arms, "coach", &mut thread_rng());

    serde_json::to_writer_pretty(io::stdout(), &Report { scores, decision })?;
    println!();
    Ok(())
}
