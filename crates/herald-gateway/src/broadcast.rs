use std::sync::Arc;
use std::time::Duration;

use herald_types::models::{BroadcastMessage, MessageFormat};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::send::{SendCapability, SendError};

pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Pacing parameters. The batch boundary is the rate-limit boundary:
/// at most `batch_size` sends are in flight, then the job waits
/// `inter_batch_delay` before the next wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    /// A send still pending after this long counts as a failure.
    pub send_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Outcome of one job. `success + failure` always equals the number of
/// recipients the job was started with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub failure: usize,
    /// Set when the job stopped early; unattempted recipients are in `failure`.
    pub cancelled: bool,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }

    fn absorb(&mut self, other: Tally) {
        self.success += other.success;
        self.failure += other.failure;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Another broadcast is already running")]
    Busy,
}

/// Fans a message out to a recipient snapshot in paced, concurrent batches.
///
/// Cheap to clone; clones share the job slot and the cancellation token,
/// so at most one job runs per dispatcher at a time.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: BroadcastConfig,

    /// Held for the whole lifetime of a running job
    slot: Arc<Mutex<()>>,

    /// Checked between batches; tripped on shutdown
    cancel: CancellationToken,
}

impl BroadcastDispatcher {
    pub fn new(config: BroadcastConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    pub fn with_cancellation(config: BroadcastConfig, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                config,
                slot: Arc::new(Mutex::new(())),
                cancel,
            }),
        }
    }

    pub fn config(&self) -> BroadcastConfig {
        self.inner.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Claim the job slot. Fails immediately with [`BroadcastError::Busy`]
    /// while another job holds it.
    pub fn begin(&self) -> Result<BroadcastJob, BroadcastError> {
        let slot = Arc::clone(&self.inner.slot)
            .try_lock_owned()
            .map_err(|_| BroadcastError::Busy)?;

        Ok(BroadcastJob {
            config: self.inner.config,
            cancel: self.inner.cancel.clone(),
            _slot: slot,
        })
    }

    /// Claim the slot and run a job to completion.
    pub async fn dispatch(
        &self,
        message: &BroadcastMessage,
        recipients: &[i64],
        send: Arc<dyn SendCapability>,
    ) -> Result<Tally, BroadcastError> {
        let job = self.begin()?;
        Ok(job.run(message, recipients, send).await)
    }
}

/// A claimed job slot. Dropping it without running releases the slot.
pub struct BroadcastJob {
    config: BroadcastConfig,
    cancel: CancellationToken,
    _slot: OwnedMutexGuard<()>,
}

impl BroadcastJob {
    /// Deliver `message` to every id in `recipients`, in order, one batch
    /// at a time. Every recipient yields exactly one counted outcome.
    pub async fn run(
        self,
        message: &BroadcastMessage,
        recipients: &[i64],
        send: Arc<dyn SendCapability>,
    ) -> Tally {
        let mut tally = Tally::default();
        if recipients.is_empty() {
            return tally;
        }

        let batch_size = self.config.batch_size.max(1);
        let batch_count = recipients.len().div_ceil(batch_size);
        let text: Arc<str> = Arc::from(message.text.as_str());

        info!(
            recipients = recipients.len(),
            batches = batch_count,
            batch_size,
            "Broadcast started"
        );

        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                let skipped = recipients.len() - tally.total();
                tally.failure += skipped;
                tally.cancelled = true;
                warn!(
                    skipped,
                    batch = index + 1,
                    "Broadcast cancelled, remaining recipients counted as failed"
                );
                break;
            }

            let outcome = send_batch(
                batch,
                &text,
                message.format,
                &send,
                self.config.send_timeout,
            )
            .await;
            debug!(
                batch = index + 1,
                of = batch_count,
                success = outcome.success,
                failure = outcome.failure,
                "Broadcast batch finished"
            );
            tally.absorb(outcome);

            if index + 1 < batch_count {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        info!(
            success = tally.success,
            failure = tally.failure,
            cancelled = tally.cancelled,
            "Broadcast finished"
        );
        tally
    }
}

/// Start every send of one batch together and wait for all of them.
async fn send_batch(
    batch: &[i64],
    text: &Arc<str>,
    format: MessageFormat,
    send: &Arc<dyn SendCapability>,
    timeout: Duration,
) -> Tally {
    let mut tasks = JoinSet::new();
    for &recipient in batch {
        let send = Arc::clone(send);
        let text = Arc::clone(text);
        tasks.spawn(async move {
            let attempt = send.send(recipient, &text, format);
            let result = match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(SendError::TimedOut(timeout)),
            };
            (recipient, result)
        });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => tally.success += 1,
            Ok((recipient, Err(e))) => {
                tally.failure += 1;
                debug!(recipient, error = %e, "Broadcast send failed");
            }
            // A panicking adapter fails only its own recipient
            Err(e) => {
                tally.failure += 1;
                warn!("Broadcast send task did not complete: {}", e);
            }
        }
    }

    tally
}
