//! HTTP contract of the service, driven through the router without a socket.

use std::sync::Arc;

use anstoss_cli::config::{AppConfig, StrategyKind};
use anstoss_cli::server::{router, AppState};
use anstoss_core::{ArmStore, FeedbackLog};
use anstoss_store::SqliteStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app(config: AppConfig) -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let state = AppState::new(&config, Arc::clone(&store)).unwrap();
    state.register_arms().unwrap();
    (router(state), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(
        |_| json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }),
    );
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn health_and_index() {
    let (app, _) = test_app(AppConfig::default());
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn nudge_returns_message_and_counts_the_pull() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = post_json(
        &app,
        "/nudge/send",
        json!({"user_id": "demo-user", "tone": "coach", "goal": "stay_consistent"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["arm_used"], "coach");
    assert!(!body["message"].as_str().unwrap().is_empty());

    let arms = store.get_arms("motivation").unwrap();
    let names: Vec<&str> = arms.iter().map(|a| a.arm.as_str()).collect();
    assert_eq!(names, ["coach", "friendly", "strict"]);
    assert_eq!(arms[0].pulls, 1);
    assert_eq!(arms.iter().map(|a| a.pulls).sum::<u64>(), 1);
}

#[tokio::test]
async fn unknown_tone_is_not_an_error() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = post_json(
        &app,
        "/nudge/send",
        json!({"user_id": "u1", "tone": "sarcastic"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["arm_used"], "coach");
    assert!(store.arm("motivation", "sarcastic").unwrap().is_none());
}

#[tokio::test]
async fn feedback_for_unknown_arm_does_not_stall_selection() {
    let (app, store) = test_app(AppConfig::default());
    for tone in ["coach", "friendly", "strict"] {
        let (status, _) = post_json(
            &app,
            "/nudge/send",
            json!({"user_id": "u1", "tone": tone}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = post_json(
        &app,
        "/feedback",
        json!({"event_id": "e1", "rating": 5, "bandit_arm": "sarcastic"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert!(store.arm("motivation", "sarcastic").unwrap().is_none());

    let mut used = std::collections::BTreeMap::<String, u32>::new();
    for _ in 0..30 {
        let (_, body) = post_json(
            &app,
            "/nudge/send",
            json!({"user_id": "u1", "tone": "coach"}).to_string(),
        )
        .await;
        *used.entry(body["arm_used"].as_str().unwrap().to_string()).or_default() += 1;
    }
    assert_eq!(used.len(), 3, "{used:?}");

    let arms = store.get_arms("motivation").unwrap();
    assert_eq!(arms.iter().map(|a| a.pulls).sum::<u64>(), 33);
    assert_eq!(store.recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn nudge_without_user_is_rejected() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = post_json(&app, "/nudge/send", json!({"tone": "coach"}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
    assert!(store.get_arms("motivation").unwrap().iter().all(|a| a.pulls == 0));
}

#[tokio::test]
async fn feedback_credits_the_arm_that_served_the_nudge() {
    let (app, store) = test_app(AppConfig::default());
    let (_, nudge) = post_json(
        &app,
        "/nudge/send",
        json!({"user_id": "demo-user", "tone": "friendly"}).to_string(),
    )
    .await;
    let arm = nudge["arm_used"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/feedback",
        json!({
            "event_id": "evt-1",
            "user_id": "demo-user",
            "rating": 5,
            "reason": "felt great",
            "bandit_arm": arm,
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let stat = store.arm("motivation", &arm).unwrap().unwrap();
    assert_eq!(stat.pulls, 1);
    assert!((stat.reward_sum - 1.0).abs() < 1e-12);
    assert_eq!(store.recent(10).unwrap().len(), 1);
}

#[tokio::test]
async fn out_of_range_rating_is_rejected_without_side_effects() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = post_json(
        &app,
        "/feedback",
        json!({"event_id": "evt-1", "rating": 6, "bandit_arm": "coach"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
    assert!(store.recent(10).unwrap().is_empty());
    assert!(store
        .get_arms("motivation")
        .unwrap()
        .iter()
        .all(|a| a.pulls == 0 && a.reward_sum == 0.0));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = post_json(&app, "/feedback", "{\"rating\": ".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, _) = post_json(
        &app,
        "/feedback",
        json!({"event_id": "evt-2", "rating": "five"}).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.recent(10).unwrap().is_empty());
}

#[tokio::test]
async fn choose_picks_a_registered_tone_arm() {
    let (app, store) = test_app(AppConfig::default());
    let (status, body) = get(&app, "/bandit/choose").await;
    assert_eq!(status, StatusCode::OK);
    let arm = body["arm"].as_str().unwrap();
    assert!(["coach", "friendly"].contains(&arm), "{arm}");
    assert!((body["epsilon"].as_f64().unwrap() - 0.2).abs() < 1e-12);

    let arms = store.get_arms("motivation_tone").unwrap();
    assert_eq!(arms.len(), 2);
    assert_eq!(arms.iter().map(|a| a.pulls).sum::<u64>(), 1);
}

#[tokio::test]
async fn arms_lists_statistics_with_mean() {
    let (app, store) = test_app(AppConfig::default());
    store.update("motivation", "coach", true, Some(0.8)).unwrap();
    store.update("motivation", "coach", true, Some(0.4)).unwrap();

    let (status, body) = get(&app, "/bandit/arms").await;
    assert_eq!(status, StatusCode::OK);
    let arms = body.as_array().unwrap();
    assert_eq!(arms.len(), 3);
    assert_eq!(arms[0]["arm"], "coach");
    assert_eq!(arms[0]["pulls"], 2);
    assert!((arms[0]["mean_reward"].as_f64().unwrap() - 0.6).abs() < 1e-9);

    let (_, body) = get(&app, "/bandit/arms?agent=motivation_tone").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn report_groups_ratings_by_arm() {
    let config = AppConfig {
        strategy: StrategyKind::EpsilonGreedy,
        ..AppConfig::default()
    };
    let (app, _) = test_app(config);
    for (i, (arm, rating)) in [("coach", 5), ("coach", 4), ("strict", 1)].iter().enumerate() {
        let (status, _) = post_json(
            &app,
            "/feedback",
            json!({"event_id": format!("evt-{i}"), "rating": rating, "bandit_arm": arm})
                .to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get(&app, "/feedback/report?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall"]["total"], 3);
    assert_eq!(body["by_arm"]["coach"]["satisfied"], 2);
    assert_eq!(body["by_arm"]["strict"]["dissatisfied"], 1);
    assert!(body.get("proposal").is_none());
}
