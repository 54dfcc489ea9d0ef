use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use capture::clock::ManualClock;
use capture::config::CaptureConfig;
use capture::controller::CaptureController;
use capture::identity::DeviceIdentity;
use capture::local_store::LocalStore;
use capture::persistence::{HttpTransport, PersistenceClient};
use capture::replay::{ReplayScript, replay};
use clap::{Parser, Subcommand};
use common::session::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(about = "Keystroke and emotion capture client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record participant consent on this device
    Consent,
    /// Replay a recorded capture script and save the session
    Replay { script: PathBuf },
    /// Re-send sessions parked in the local store
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Arc::new(CaptureConfig::from_env()?);

    let local = LocalStore::new(&config.local_store).await?;
    if !local.health_check().await? {
        anyhow::bail!("Local store at {} is not writable", local.root().display());
    }

    let identity = DeviceIdentity::new(local.clone());
    let transport = Arc::new(HttpTransport::new(
        config.server_url.clone(),
        config.probe_timeout,
        config.request_timeout,
    )?);
    let persistence = PersistenceClient::new(transport, local, config.probe_server);

    match args.command {
        Command::Consent => {
            identity.record_consent().await?;
            info!("Participant id: {}", identity.user_id().await?);
        }
        Command::Flush => {
            let report = persistence.flush_pending().await?;
            info!(
                "Flushed local sessions: {} sent, {} failed, {} corrupted",
                report.sent, report.failed, report.corrupted
            );
        }
        Command::Replay { script } => {
            let script = ReplayScript::load(&script).await?;
            let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
            let mut controller = CaptureController::new(
                Context::Manual,
                clock.clone(),
                config,
                persistence,
                identity,
                None,
            );

            let result = replay(&mut controller, &clock, &script).await?;
            info!(
                "Session {} saved ({:?}): {}",
                result.session_id, result.stored_where, result.message
            );
        }
    }

    Ok(())
}
