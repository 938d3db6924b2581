//! HTTP API.
//!
//! Store calls are synchronous; handlers run them on the blocking pool.

use std::sync::Arc;

use anstoss_bandits::{BanditError, Dispatcher, MessagePool, Nudge};
use anstoss_core::{ArmStat, ArmStore, FeedbackLog, Goal, NudgeContext, StoreError};
use anstoss_feedback::{
    FeedbackAnalyzer, FeedbackError, FeedbackRecorder, FeedbackReport, FeedbackSubmission,
    ValidationError,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::AppConfig;

const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "POST /nudge/send",
    "POST /feedback",
    "GET /bandit/choose",
    "GET /bandit/arms",
    "GET /feedback/report",
];

const DEFAULT_REPORT_LIMIT: usize = 500;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Services>,
}

struct Services {
    nudges: Dispatcher,
    choices: Dispatcher,
    recorder: FeedbackRecorder,
    choice_arms: Vec<String>,
    arms: Arc<dyn ArmStore>,
    log: Arc<dyn FeedbackLog>,
    analyzer: FeedbackAnalyzer,
    epsilon: f64,
    default_tone: String,
}

impl AppState {
    /// Wire the services onto `store`. Nothing is written until
    /// [`AppState::register_arms`] runs.
    pub fn new<S>(config: &AppConfig, store: Arc<S>) -> Result<Self, BanditError>
    where
        S: ArmStore + FeedbackLog + 'static,
    {
        let arms: Arc<dyn ArmStore> = store.clone();
        let log: Arc<dyn FeedbackLog> = store;
        let pool = MessagePool::builtin();
        let default_tone = pool.default_arm().to_string();
        let nudge_arms: Vec<String> = pool.arms().map(str::to_string).collect();

        let nudges = Dispatcher::new(
            config.agent.clone(),
            Arc::clone(&arms),
            Box::new(config.nudge_policy(&pool)?),
            pool.clone(),
        );
        let choice_policy = config.choice_policy()?;
        let choice_arms = choice_policy.arms().to_vec();
        let choices = Dispatcher::new(
            config.choice_agent.clone(),
            Arc::clone(&arms),
            Box::new(choice_policy),
            pool,
        );

        let recorder = FeedbackRecorder::new(
            Arc::clone(&log),
            config.reward_mapping,
            config.agent.clone(),
        )
        .with_arms(config.agent.clone(), nudge_arms)
        .with_arms(config.choice_agent.clone(), choice_arms.iter().cloned());

        Ok(Self {
            inner: Arc::new(Services {
                nudges,
                choices,
                recorder,
                choice_arms,
                arms,
                log,
                analyzer: FeedbackAnalyzer::default(),
                epsilon: config.epsilon,
                default_tone,
            }),
        })
    }

    /// Register every templated nudge arm and the fixed choice arms with
    /// zero counters. Idempotent; run once before serving.
    pub fn register_arms(&self) -> Result<(), BanditError> {
        let nudges = &self.inner.nudges;
        nudges.register(nudges.pool().arms())?;
        self.inner
            .choices
            .register(self.inner.choice_arms.iter().map(String::as_str))
    }

    pub fn nudges(&self) -> &Dispatcher {
        &self.inner.nudges
    }

    pub fn arms(&self) -> &Arc<dyn ArmStore> {
        &self.inner.arms
    }

    /// Feedback report over the most recent `limit` entries.
    pub fn report(&self, limit: usize) -> Result<FeedbackReport, StoreError> {
        let records = self.inner.log.recent(limit)?;
        Ok(self
            .inner
            .analyzer
            .report(self.inner.nudges.policy_name(), &records))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/nudge/send", post(send_nudge))
        .route("/feedback", post(submit_feedback))
        .route("/feedback/report", get(feedback_report))
        .route("/bandit/choose", get(choose_arm))
        .route("/bandit/arms", get(list_arms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error surfaced to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    StorageUnavailable(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidReward(_) => Self::Internal(e.to_string()),
            StoreError::Unavailable(_) | StoreError::Corrupt(_) => {
                Self::StorageUnavailable(e.to_string())
            }
        }
    }
}

impl From<BanditError> for ApiError {
    fn from(e: BanditError) -> Self {
        match e {
            BanditError::Store(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::Validation(v) => Self::Validation(v),
            FeedbackError::Store(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(ValidationError::Malformed(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(ValidationError::Malformed(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            Self::Validation(e) => (StatusCode::BAD_REQUEST, "ValidationError", e.to_string()),
            Self::StorageUnavailable(msg) => {
                error!(error = %msg, "storage unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "StorageUnavailable", msg)
            }
            Self::Internal(msg) => {
                error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg)
            }
        };
        (status, Json(json!({"error": kind, "detail": detail}))).into_response()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
}

async fn index() -> Json<Value> {
    Json(json!({"service": "anstoss", "endpoints": ENDPOINTS}))
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

#[derive(Debug, Deserialize)]
pub struct NudgeRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub goal: Option<Goal>,
}

impl NudgeRequest {
    fn into_context(self, default_tone: &str) -> Result<NudgeContext, ValidationError> {
        let user_id = self
            .user_id
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingField("user_id"))?;
        let tone = self
            .tone
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_tone.to_string());
        Ok(NudgeContext {
            user_id,
            tone,
            goal: self.goal.unwrap_or_default(),
        })
    }
}

async fn send_nudge(
    State(state): State<AppState>,
    payload: Result<Json<NudgeRequest>, JsonRejection>,
) -> Result<Json<Nudge>, ApiError> {
    let Json(request) = payload?;
    let ctx = request.into_context(&state.inner.default_tone)?;
    let nudge = blocking(move || {
        let mut rng = rand::thread_rng();
        Ok(state.inner.nudges.dispatch(&ctx, &mut rng)?)
    })
    .await?;
    Ok(Json(nudge))
}

async fn submit_feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackSubmission>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(submission) = payload?;
    blocking(move || Ok(state.inner.recorder.record(submission)?)).await?;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Serialize)]
struct ChoiceResponse {
    arm: String,
    epsilon: f64,
}

async fn choose_arm(State(state): State<AppState>) -> Result<Json<ChoiceResponse>, ApiError> {
    let epsilon = state.inner.epsilon;
    let decision = blocking(move || {
        let mut rng = rand::thread_rng();
        let fallback = state.inner.default_tone.clone();
        Ok(state.inner.choices.choose(&fallback, &mut rng)?)
    })
    .await?;
    Ok(Json(ChoiceResponse {
        arm: decision.arm,
        epsilon,
    }))
}

#[derive(Debug, Deserialize)]
struct ArmsQuery {
    agent: Option<String>,
}

/// Arm statistics plus the derived mean.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArmView {
    #[serde(flatten)]
    pub stat: ArmStat,
    pub mean_reward: f64,
}

impl From<ArmStat> for ArmView {
    fn from(stat: ArmStat) -> Self {
        Self {
            mean_reward: stat.mean_reward(),
            stat,
        }
    }
}

async fn list_arms(
    State(state): State<AppState>,
    query: Result<Query<ArmsQuery>, QueryRejection>,
) -> Result<Json<Vec<ArmView>>, ApiError> {
    let Query(query) = query?;
    let agent = query
        .agent
        .unwrap_or_else(|| state.inner.nudges.agent().to_string());
    let arms = blocking(move || Ok(state.inner.arms.get_arms(&agent)?)).await?;
    Ok(Json(arms.into_iter().map(ArmView::from).collect()))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    limit: Option<usize>,
}

async fn feedback_report(
    State(state): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<FeedbackReport>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_REPORT_LIMIT);
    let report = blocking(move || Ok(state.report(limit)?)).await?;
    Ok(Json(report))
}
