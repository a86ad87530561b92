mod terminal;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drivelink_config::Settings;
use drivelink_services::bootstrap::{build_orchestrator, http_client};
use drivelink_services::sync::{HttpSyncStatusSource, SyncStatusSource};
use drivelink_services::{FlowOutcome, SessionContext};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::terminal::TerminalPrompt;

#[derive(Parser)]
#[command(name = "drivelink", version, about = "Connect a Google Drive folder to the sync backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report required settings that are missing or invalid.
    CheckConfig,
    /// Authenticate, pick a folder and register it for syncing.
    Connect {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        workspace_id: Option<String>,
        /// Token the backend uses to report sync status for this user.
        #[arg(long)]
        user_token: Option<String>,
        /// Keep printing status updates until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    /// Fetch the current status of one sync.
    Status {
        #[arg(long)]
        sync_id: String,
        #[arg(long)]
        user_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "drivelink_cli=debug,drivelink_services=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    match cli.command {
        Command::CheckConfig => check_config(&settings),
        Command::Connect {
            user_id,
            workspace_id,
            user_token,
            watch,
        } => connect(&settings, user_id, workspace_id, user_token, watch).await,
        Command::Status {
            sync_id,
            user_token,
        } => status(&settings, &sync_id, user_token.as_deref()).await,
    }
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    let missing = settings.missing_required();
    if missing.is_empty() {
        println!("Configuration OK");
        return Ok(());
    }
    for key in &missing {
        println!("missing or invalid: {}", key);
    }
    anyhow::bail!("{} required setting(s) missing", missing.len())
}

async fn connect(
    settings: &Settings,
    user_id: String,
    workspace_id: Option<String>,
    user_token: Option<String>,
    watch: bool,
) -> anyhow::Result<()> {
    let mut session = SessionContext::new(
        user_id,
        workspace_id,
        settings.paragon.integration.clone(),
        settings.sync.webhook_url.clone(),
    );
    if let Some(token) = user_token {
        session = session.with_user_token(token);
    }
    info!(workspace_id = %session.workspace_id, user_id = %session.user_id, "Starting session");

    let prompt = Arc::new(TerminalPrompt::new());
    let orchestrator = build_orchestrator(settings, session, prompt.clone(), prompt)?;
    orchestrator.start().await;

    match orchestrator.connect().await {
        FlowOutcome::Connected { folder, sync_id } => {
            println!(
                "Connected {} ({}) as sync {}",
                folder.name,
                folder.location_label(),
                sync_id
            );
        }
        FlowOutcome::Cancelled => {
            println!("Folder selection cancelled.");
            orchestrator.shutdown();
            return Ok(());
        }
        FlowOutcome::Failed(message) | FlowOutcome::Blocked(message) => {
            orchestrator.shutdown();
            anyhow::bail!(message);
        }
        FlowOutcome::Busy => {
            orchestrator.shutdown();
            anyhow::bail!("A connection attempt is already in progress");
        }
        FlowOutcome::AlreadyConnected => {
            orchestrator.shutdown();
            anyhow::bail!("A folder is already connected");
        }
    }

    if watch {
        let mut updates = orchestrator.poller().subscribe();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                update = updates.recv() => match update {
                    Ok(update) => println!(
                        "{} {:?} {}",
                        update.current.sync_id,
                        update.current.status,
                        update.current.message.unwrap_or_default()
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Status updates lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}

async fn status(settings: &Settings, sync_id: &str, user_token: Option<&str>) -> anyhow::Result<()> {
    let source = HttpSyncStatusSource::new(http_client(settings)?, &settings.sync.status_base_url);
    let remote = source.fetch_status(sync_id, user_token).await?;
    let summary = &remote.summary;
    println!(
        "{}",
        serde_json::json!({
            "syncId": sync_id,
            "status": remote.status,
            "message": remote.message,
            "lastSyncedAt": summary.last_synced_at,
            "syncedRecordsCount": summary.synced_records_count,
            "totalRecords": summary.total_records,
        })
    );
    Ok(())
}
