//! mailhook server: Gmail push webhook, watch renewal and admin API.

mod error;
mod middleware;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use mailhook::{
    auth, logging, Config, ConfigError, Database, GmailClient, HistoryRepository, Reconciler,
    SqliteHistoryRepository, WatchService,
};

use crate::middleware::Gatekeeper;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "mailhook-server", version, about = "Gmail push ingestion bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Renew the Gmail watch once and print the response
    Renew {
        /// Full Pub/Sub topic name, overriding GMAIL_PUBSUB_TOPIC
        #[arg(long)]
        topic: Option<String>,
    },

    /// Run one reconciliation pass and print the summary
    Reconcile {
        /// Cursor to reconcile from. Defaults to the latest recorded watch.
        #[arg(long)]
        history_id: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("invalid configuration")?;
    logging::init(config.log_format).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;
    let state = build_state(&config, db.clone()).context("failed to initialize services")?;

    let result = run(cli.command.unwrap_or(Command::Serve), &config, state).await;

    if let Err(e) = db.close() {
        warn!("Database not closed cleanly: {}", e);
    }
    result
}

/// Consumes the state so that every database handle is released on return.
async fn run(command: Command, config: &Config, state: AppState) -> anyhow::Result<()> {
    match command {
        Command::Serve => serve(config, state).await,
        Command::Renew { topic } => {
            let response = state.watch.renew(topic.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Reconcile { history_id } => reconcile_once(state, history_id).await,
    }
}

fn build_state(config: &Config, db: Database) -> mailhook::Result<AppState> {
    let tokens = auth::from_config(config)?;
    let gmail = Arc::new(
        GmailClient::new(&config.gmail_api_base_url, tokens).map_err(ConfigError::HttpClient)?,
    );
    let repo: Arc<dyn HistoryRepository> = Arc::new(SqliteHistoryRepository::new(db.clone()));

    let reconciler = Reconciler::new(gmail.clone(), repo.clone(), config.target_label.clone())
        .with_timeout(config.pass_timeout);
    let watch = WatchService::new(
        gmail,
        repo.clone(),
        config.project_id.clone(),
        config.pubsub_topic.clone(),
    );

    if config.is_local() {
        warn!("APP_ENV=local: admin gatekeeper is bypassed");
    }
    let gatekeeper = Arc::new(Gatekeeper::new(
        config.admin_allowlist.clone(),
        config.is_local(),
    ));

    Ok(AppState {
        db,
        repo,
        reconciler,
        watch,
        gatekeeper,
    })
}

async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let router = routes::build_router(state, Some(config.static_dir.as_path()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        "mailhook listening on {} (env={}, label={:?})",
        addr, config.app_env, config.target_label
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn reconcile_once(state: AppState, history_id: Option<u64>) -> anyhow::Result<()> {
    let cursor = match history_id {
        Some(cursor) => cursor,
        None => state
            .repo
            .latest_watch_status()
            .await?
            .map(|status| status.history_id)
            .ok_or_else(|| anyhow!("no watch status recorded; pass --history-id or renew first"))?,
    };

    let summary = state.reconciler.reconcile(cursor).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
