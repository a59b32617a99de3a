use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use herald_bot::{Bot, Config};
use herald_db::Database;
use herald_gateway::{BroadcastDispatcher, SendError, TelegramClient};

/// Pause after a failed poll when the platform gives no retry hint.
const POLL_BACKOFF: Duration = Duration::from_secs(3);
/// How long in-flight updates get to finish after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    debug!("Loaded {:?}", config);

    let db = Arc::new(Database::open(&config.db_path)?);
    let client = Arc::new(TelegramClient::new(&config.bot_token));
    let me = client.get_me().await?;
    info!("Authorized as @{}", me.username.as_deref().unwrap_or(&me.first_name));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Could not listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let dispatcher =
        BroadcastDispatcher::with_cancellation(config.broadcast, shutdown.child_token());
    let bot = Arc::new(Bot::new(
        Arc::clone(&client),
        db,
        &config,
        dispatcher,
        me.first_name.clone(),
    ));

    info!(
        owner = config.owner_id,
        admins = config.admin_ids.len(),
        "Herald polling for updates"
    );

    let mut tasks = JoinSet::new();
    let mut offset = 0i64;
    loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            polled = client.get_updates(offset, config.poll_timeout) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let bot = Arc::clone(&bot);
                    tasks.spawn(async move { bot.process(update).await });
                }
            }
            Err(e) => {
                let pause = match &e {
                    SendError::RateLimited { retry_after } => Duration::from_secs(*retry_after),
                    _ => POLL_BACKOFF,
                };
                warn!("Polling failed, retrying in {:?}: {}", pause, e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                error!("Update task panicked: {}", e);
            }
        }
    }

    info!(pending = tasks.len(), "Waiting for in-flight updates");
    let drain = async {
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                error!("Update task panicked: {}", e);
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("Gave up waiting for in-flight updates");
    }

    info!("Herald stopped");
    Ok(())
}
