//! CLI for anstoss.
//!
//! Runs the HTTP service and offers offline commands that work directly on
//! the database: inspect arms, preview a selection, print the feedback report.

use std::net::SocketAddr;
use std::sync::Arc;

use anstoss_cli::config::AppConfig;
use anstoss_cli::demo;
use anstoss_cli::server::{router, AppState, ArmView};
use anstoss_store::SqliteStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on
        #[arg(long, env = "ANSTOSS_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
    /// Print arm statistics as JSON
    Arms {
        /// Agent to list (default: the nudge agent)
        #[arg(long)]
        agent: Option<String>,
    },
    /// Preview the next nudge arm without recording a pull
    Choose {
        /// Seed for reproducible epsilon-greedy draws
        #[arg(long)]
        seed: Option<u64>,

        /// Fallback tone when no arm is registered
        #[arg(long, default_value = "coach")]
        tone: String,
    },
    /// Print the feedback report as JSON
    Report {
        /// Number of most recent feedback entries to analyze
        #[arg(long, default_value = "500")]
        limit: usize,
    },
    /// Send a nudge and rate it against a running server
    Demo {
        #[arg(long, env = "ANSTOSS_BASE_URL", default_value = "http://127.0.0.1:8000")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anstoss=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.config.validate()?;

    match cli.command {
        Commands::Serve { bind } => serve(&cli.config, bind).await,
        Commands::Arms { agent } => {
            let state = open_state(&cli.config)?;
            let agent = agent.unwrap_or_else(|| cli.config.agent.clone());
            let arms: Vec<ArmView> = state
                .arms()
                .get_arms(&agent)?
                .into_iter()
                .map(ArmView::from)
                .collect();
            println!("{}", serde_json::to_string_pretty(&arms)?);
            Ok(())
        }
        Commands::Choose { seed, tone } => {
            let state = open_state(&cli.config)?;
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let decision = state.nudges().preview(&tone, &mut rng)?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        Commands::Report { limit } => {
            let state = open_state(&cli.config)?;
            let report = state.report(limit)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Demo { base_url } => {
            let outcome = demo::run(&base_url).await?;
            println!("nudge: {} (arm: {})", outcome.nudge.message, outcome.nudge.arm_used);
            println!("feedback: {} rated 5", outcome.event_id);
            println!("{}", serde_json::to_string_pretty(&outcome.arms)?);
            Ok(())
        }
    }
}

fn open_state(config: &AppConfig) -> Result<AppState> {
    let store = SqliteStore::open(&config.db)
        .with_context(|| format!("failed to open database {}", config.db.display()))?;
    Ok(AppState::new(config, Arc::new(store))?)
}

async fn serve(config: &AppConfig, bind: SocketAddr) -> Result<()> {
    let state = open_state(config)?;
    state.register_arms()?;
    info!(
        db = %config.db.display(),
        agent = %config.agent,
        policy = state.nudges().policy_name(),
        reward_mapping = %config.reward_mapping,
        "starting anstoss"
    );

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
