pub mod config;
pub mod discord_api;
pub mod error;
pub mod gateway;
pub mod sniper;
pub mod state;
pub mod util;
pub mod webhook;

use config::Config;
use error::AppError;
use gateway::GatewaySession;
use state::AppState;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

const EVENT_BUFFER: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Install the fmt subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Start one gateway session per token and run until a shutdown signal
/// arrives or the destination list is used up.
pub async fn run(config: Config) -> Result<(), AppError> {
    let state = AppState::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = Vec::new();

    for token in config.active_tokens() {
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
        let session = GatewaySession::new(
            token.to_string(),
            state.gateway.clone(),
            events_tx,
            shutdown_rx.clone(),
        );
        sessions.push(tokio::spawn(session.run()));

        let dispatcher = state.dispatcher.clone();
        let credential = token.to_string();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                dispatcher.handle(event, &credential);
            }
        });
    }

    tokio::select! {
        result = shutdown_signal() => {
            result?;
            tracing::info!("Received shutdown signal.");
        }
        _ = state.exhausted.notified() => {
            tracing::warn!("Ran out of guilds to use. Shutting down.");
        }
    }

    tracing::info!("Exiting. Terminating {} sessions.", sessions.len());
    let _ = shutdown_tx.send(true);
    let closing = async {
        tokio::join!(
            futures_util::future::join_all(sessions),
            state.notifier.flush()
        )
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, closing).await.is_err() {
        tracing::warn!(
            "Sessions and webhook deliveries did not finish within {}s",
            SHUTDOWN_GRACE.as_secs()
        );
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), AppError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), AppError> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
