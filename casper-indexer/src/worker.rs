//! Worker pool over the queue streams.
//!
//! Every poll visits the configured queues in a weighted-random order and
//! reads at most as many messages as there are free permits. Each message is
//! handled on its own task; the outcome decides between ack, retry and
//! dead-letter.

use crate::handlers::block::enqueue_unverified;
use crate::handlers::HandlerContext;
use crate::metrics;
use crate::queue::{RedisQueue, StreamMessage, TaskQueue};
use crate::store::IndexStore;
use crate::tasks::Queue;
use crate::{IndexerConfig, IndexerError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const IDLE_SLEEP: Duration = Duration::from_millis(100);
const PENDING_REFRESH: Duration = Duration::from_secs(15);
const ACK_RETRIES: u32 = 3;
const CLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// What to do with a task whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry(Duration),
    DeadLetter,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.retry_initial_backoff_ms,
            max_backoff_ms: config.retry_max_backoff_ms,
        }
    }

    /// `attempt` counts the deliveries that already failed before this one
    pub fn disposition(&self, error: &IndexerError, attempt: u32) -> Disposition {
        if !error.is_retryable() || attempt >= self.max_retries {
            Disposition::DeadLetter
        } else {
            Disposition::Retry(self.backoff(attempt))
        }
    }

    /// Exponential: initial, 2x, 4x, ... capped at the max
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

pub struct Worker {
    queue: Arc<RedisQueue>,
    ctx: Arc<HandlerContext>,
    config: IndexerConfig,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    permits: u32,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        config: IndexerConfig,
        queue: Arc<RedisQueue>,
        ctx: Arc<HandlerContext>,
        cancel: CancellationToken,
    ) -> Result<Self, IndexerError> {
        let permits = u32::try_from(config.concurrency)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                IndexerError::Config(format!("Invalid concurrency: {}", config.concurrency))
            })?;

        Ok(Self {
            queue,
            ctx,
            retry: RetryPolicy::from_config(&config),
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            permits,
            config,
            cancel,
        })
    }

    /// Poll until the cancellation token fires, then wait for in-flight tasks
    pub async fn run(&self) -> Result<(), IndexerError> {
        let queues: Vec<Queue> = self.config.priorities.queues().collect();
        info!(
            "Starting worker '{}' on {} queues with concurrency {}",
            self.queue.consumer,
            queues.len(),
            self.config.concurrency
        );

        self.queue.ensure_consumer_groups(queues.iter().copied()).await?;

        let background = vec![
            tokio::spawn(verify_sweeper(
                self.ctx.store.clone(),
                self.ctx.queue.clone(),
                self.config.verify_interval_secs,
                self.config.verify_batch,
                Duration::from_secs(self.config.verify_recheck_secs),
                self.cancel.clone(),
            )),
            tokio::spawn(refresh_pending(
                self.queue.clone(),
                queues.clone(),
                self.cancel.clone(),
            )),
        ];

        // Pending entries first, then new ones
        let mut cursors: HashMap<Queue, String> =
            queues.iter().map(|q| (*q, "0".to_string())).collect();
        let mut last_claim: HashMap<Queue, Instant> = HashMap::new();
        let claim_min_idle = Duration::from_millis(self.config.claim_min_idle_ms);

        while !self.cancel.is_cancelled() {
            let order = {
                let mut rng = rand::thread_rng();
                self.config.priorities.weighted_order(&mut rng)
            };

            let mut received = 0;
            for queue in order {
                let available = self.semaphore.available_permits();
                if available == 0 || self.cancel.is_cancelled() {
                    break;
                }

                let cursor = cursors.entry(queue).or_insert_with(|| "0".to_string());

                // Once live, periodically adopt entries stranded on dead consumers
                let claim_due = cursor.as_str() == ">"
                    && last_claim
                        .get(&queue)
                        .map_or(true, |at| at.elapsed() >= CLAIM_INTERVAL);
                let mut messages = Vec::new();
                if claim_due {
                    last_claim.insert(queue, Instant::now());
                    match self.queue.claim_idle(queue, claim_min_idle, available).await {
                        Ok(claimed) if !claimed.is_empty() => {
                            info!("Claimed {} idle entries from queue {}", claimed.len(), queue);
                            messages = claimed;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim idle entries of {}: {}", queue, e),
                    }
                }

                if messages.is_empty() {
                    messages = match self.queue.read_messages(queue, cursor, available).await {
                        Ok(messages) => messages,
                        Err(e) => {
                            error!("Failed to read from queue {}: {}", queue, e);
                            continue;
                        }
                    };
                }

                if messages.is_empty() {
                    if cursor.as_str() == "0" {
                        *cursor = ">".to_string();
                        info!("Queue {} switched to live entries", queue);
                    }
                    continue;
                }

                if cursor.as_str() != ">" {
                    if let Some(last) = messages.last() {
                        *cursor = last.id.clone();
                    }
                }

                received += messages.len();
                for message in messages {
                    let permit = match self.semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let processor = Processor {
                        queue: self.queue.clone(),
                        ctx: self.ctx.clone(),
                        retry: self.retry,
                        cancel: self.cancel.clone(),
                    };
                    tokio::spawn(async move { processor.process(message, permit).await });
                }
            }

            if received == 0 {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                }
            }
        }

        info!("Waiting for in-flight tasks");
        if let Ok(permits) = self.semaphore.acquire_many(self.permits).await {
            drop(permits);
        }
        futures::future::join_all(background).await;

        info!("Worker stopped");
        Ok(())
    }
}

/// Per-message state moved into the spawned task
struct Processor {
    queue: Arc<RedisQueue>,
    ctx: Arc<HandlerContext>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Processor {
    async fn process(self, message: StreamMessage, permit: OwnedSemaphorePermit) {
        let task = match message.task() {
            Ok(task) => task,
            Err(e) => {
                error!("Undecodable message {} on {}: {}", message.id, message.queue, e);
                metrics::TASKS_DEAD_LETTERED
                    .with_label_values(&["undecodable"])
                    .inc();
                self.dead_letter(&message, &e).await;
                return;
            }
        };
        let kind = task.kind().name();
        let attempt = message.attempt();

        metrics::TASKS_ACTIVE.inc();
        let result = tokio::select! {
            result = self.ctx.handle(&task) => result,
            _ = self.cancel.cancelled() => Err(IndexerError::Cancelled),
        };
        metrics::TASKS_ACTIVE.dec();

        let error = match result {
            Ok(()) => {
                metrics::TASKS_PROCESSED.with_label_values(&[kind]).inc();
                if let Err(e) = self.ack_with_retry(&message).await {
                    error!("Failed to ACK message {} after retries: {:?}", message.id, e);
                }
                return;
            }
            Err(IndexerError::Cancelled) => {
                debug!("Task {} cancelled, message {} stays pending", kind, message.id);
                return;
            }
            Err(e) => e,
        };

        metrics::TASKS_FAILED.with_label_values(&[kind]).inc();
        error!(
            "Task {} failed on message {} (attempt {}): {}",
            kind, message.id, attempt, error
        );

        match self.retry.disposition(&error, attempt) {
            Disposition::Retry(delay) => {
                // Free the slot while backing off
                drop(permit);
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                if let Err(e) = self.queue.add(&task, attempt + 1).await {
                    error!("Failed to re-enqueue {} from message {}: {}", kind, message.id, e);
                    return;
                }
                metrics::TASKS_RETRIED.with_label_values(&[kind]).inc();
                if let Err(e) = self.ack_with_retry(&message).await {
                    error!("Failed to ACK retried message {}: {:?}", message.id, e);
                }
            }
            Disposition::DeadLetter => {
                warn!("Dead-lettering {} from message {}", kind, message.id);
                metrics::TASKS_DEAD_LETTERED.with_label_values(&[kind]).inc();
                self.dead_letter(&message, &error).await;
            }
        }
    }

    async fn dead_letter(&self, message: &StreamMessage, error: &IndexerError) {
        if let Err(e) = self.queue.dead_letter(message, &error.to_string()).await {
            error!("Failed to dead-letter message {}: {}", message.id, e);
            return;
        }
        if let Err(e) = self.ack_with_retry(message).await {
            error!("Failed to ACK dead-lettered message {}: {:?}", message.id, e);
        }
    }

    /// ACK a message with retry logic for transient failures
    async fn ack_with_retry(&self, message: &StreamMessage) -> Result<(), IndexerError> {
        let mut retries = 0;
        let mut delay_ms = 10;

        loop {
            match self.queue.ack_message(message, true).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    retries += 1;
                    if retries >= ACK_RETRIES {
                        return Err(e);
                    }

                    // 10ms, 20ms, 40ms
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;

                    debug!(
                        "Retrying ACK for message {} (attempt {}/{})",
                        message.id, retries, ACK_RETRIES
                    );
                }
            }
        }
    }
}

/// Periodically queue `block:verify` for blocks not yet verified
async fn verify_sweeper(
    store: Arc<dyn IndexStore>,
    queue: Arc<dyn TaskQueue>,
    interval_secs: u64,
    batch: i64,
    recheck: Duration,
    cancel: CancellationToken,
) {
    if interval_secs == 0 {
        info!("Verify sweeper disabled");
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match enqueue_unverified(store.as_ref(), queue.as_ref(), batch, recheck).await {
                    Ok(0) => {}
                    Ok(count) => info!("Queued verification of {} blocks", count),
                    Err(e) => warn!("Verify sweep failed: {}", e),
                }
            }
        }
    }
}

async fn refresh_pending(queue: Arc<RedisQueue>, queues: Vec<Queue>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PENDING_REFRESH);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for q in &queues {
                    match queue.pending_count(*q).await {
                        Ok(count) => metrics::QUEUE_PENDING
                            .with_label_values(&[q.name()])
                            .set(i64::try_from(count).unwrap_or(i64::MAX)),
                        Err(e) => debug!("Failed to read pending count of {}: {}", q, e),
                    }
                }
            }
        }
    }
}
