//! Delivery worker — polls the job store, claims due jobs, renders and
//! sends them through the messaging gateway, and records the outcome.
//!
//! One process runs one worker task. Sends within a tick run concurrently
//! up to a bounded fan-out (gateway rate limits); every write back to the
//! store happens from the tick loop, one job at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use apteka_common::error::AppError;
use apteka_common::types::Job;
use apteka_queue::store::JobStore;
use apteka_queue::{KNOWN_QUEUES, backoff};

use crate::gateway::{DeliveryError, MessagingGateway};
use crate::render;

/// Resolved jobs older than this many days are purged from the store.
const PURGE_RETENTION_DAYS: i64 = 7;

/// Claims older than this are released back to pending. Well past any
/// send timeout, so only a crashed worker or a failed outcome write
/// leaves claims this old.
const STALE_CLAIM_MINUTES: i64 = 10;

/// Ticks between purge passes.
const PURGE_EVERY_TICKS: u64 = 100;

/// Worker lifecycle, advanced exactly once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Failed = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Ready,
            3 => LifecycleState::Failed,
            _ => LifecycleState::Uninitialized,
        }
    }
}

/// Shared control handle for a running worker.
///
/// Cloned into the API state so the control endpoint can pause and resume
/// polling without owning the worker task.
#[derive(Clone, Default)]
pub struct WorkerHandle {
    paused: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl WorkerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop claiming new jobs. In-flight sends finish normally.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume claiming jobs on the next tick.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Worker configuration knobs, taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub send_concurrency: usize,
}

/// The background delivery loop.
pub struct DeliveryWorker<G: MessagingGateway> {
    store: JobStore,
    gateway: Arc<G>,
    config: WorkerConfig,
    handle: WorkerHandle,
    ticks: u64,
}

impl<G: MessagingGateway> DeliveryWorker<G> {
    pub fn new(store: JobStore, gateway: G, config: WorkerConfig) -> Self {
        Self {
            store,
            gateway: Arc::new(gateway),
            config,
            handle: WorkerHandle::new(),
            ticks: 0,
        }
    }

    /// The control handle to share with the API.
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Probe the gateway and mark the worker ready.
    ///
    /// `Uninitialized → Initializing → Ready | Failed`; a failed probe
    /// leaves the worker unusable rather than half-started.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        self.handle.set_state(LifecycleState::Initializing);

        if let Err(e) = self.gateway.health_check().await {
            self.handle.set_state(LifecycleState::Failed);
            anyhow::bail!("Gateway health check failed: {}", e);
        }

        self.handle.set_state(LifecycleState::Ready);
        tracing::info!("Delivery worker initialized");
        Ok(())
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled.
    pub async fn run(mut self) -> anyhow::Result<()> {
        if self.handle.state() != LifecycleState::Ready {
            self.initialize().await?;
        }

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            send_concurrency = self.config.send_concurrency,
            "Delivery worker started"
        );

        loop {
            if self.handle.is_paused() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            match self.tick().await {
                Ok(delivered) => {
                    if delivered > 0 {
                        tracing::debug!(delivered, "Tick complete");
                    }
                }
                Err(e) => {
                    // A failed tick must not kill the loop; the next tick
                    // re-claims whatever is still pending.
                    tracing::error!(error = %e, "Tick failed");
                }
            }

            self.ticks += 1;
            if self.ticks % PURGE_EVERY_TICKS == 0 {
                let cutoff = Utc::now() - chrono::Duration::days(PURGE_RETENTION_DAYS);
                if let Err(e) = self.store.purge_resolved(cutoff).await {
                    tracing::warn!(error = %e, "Purge of resolved jobs failed");
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One polling pass over all known queues.
    ///
    /// Returns the number of jobs delivered successfully this tick.
    pub async fn tick(&self) -> Result<u32, AppError> {
        self.tick_at(Utc::now()).await
    }

    /// A polling pass at an explicit instant. Lets tests drive the clock
    /// through the backoff schedule.
    pub async fn tick_at(&self, now: chrono::DateTime<Utc>) -> Result<u32, AppError> {
        // Reclaim jobs stranded in `claimed` by a crash or a failed
        // outcome write before claiming fresh work.
        self.store
            .release_stale(now - chrono::Duration::minutes(STALE_CLAIM_MINUTES))
            .await?;

        let mut delivered = 0u32;

        for queue in KNOWN_QUEUES {
            let jobs = self
                .store
                .claim_due(queue, now, self.config.batch_size)
                .await?;
            if jobs.is_empty() {
                continue;
            }

            delivered += self.deliver_batch(jobs).await;
        }

        Ok(delivered)
    }

    /// Send a batch of claimed jobs with bounded concurrency, then write
    /// each outcome back to the store.
    ///
    /// Infallible by design: one job's failure, including a failed store
    /// write, must never abort the in-flight sends of its siblings.
    async fn deliver_batch(&self, jobs: Vec<Job>) -> u32 {
        let mut set: JoinSet<(Uuid, i32, Result<i64, DeliveryError>)> = JoinSet::new();
        let mut delivered = 0u32;

        for job in jobs {
            let payload = match job.typed_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    // Undecodable payload can never succeed on retry.
                    tracing::error!(job_id = %job.id, error = %e, "Corrupt job payload");
                    if let Err(e) = self.store.fail(job.id, None).await {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to record corrupt payload");
                    }
                    continue;
                }
            };

            let message = render::render(&payload);
            let gateway = Arc::clone(&self.gateway);
            let (job_id, attempts) = (job.id, job.attempts);

            set.spawn(async move {
                let result = gateway.send(&message).await;
                (job_id, attempts, result)
            });

            if set.len() >= self.config.send_concurrency
                && let Some(joined) = set.join_next().await
            {
                delivered += self.resolve_send(joined).await;
            }
        }

        while let Some(joined) = set.join_next().await {
            delivered += self.resolve_send(joined).await;
        }

        delivered
    }

    /// Record one send outcome in the store.
    ///
    /// A failed outcome write is logged, not propagated: the job stays
    /// `claimed` and the stale-claim release re-runs it on a later tick.
    async fn resolve_send(
        &self,
        joined: Result<(Uuid, i32, Result<i64, DeliveryError>), tokio::task::JoinError>,
    ) -> u32 {
        let (job_id, prior_attempts, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Send task panicked");
                return 0;
            }
        };

        match result {
            Ok(message_id) => match self.store.complete(job_id).await {
                Ok(()) => {
                    tracing::info!(job_id = %job_id, message_id, "Notification delivered");
                    1
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record delivery");
                    0
                }
            },
            Err(DeliveryError::Transient(reason)) => {
                let attempts_made = prior_attempts + 1;
                let (delay, level) = match backoff::retry_delay(attempts_made) {
                    Some(delay) => (Some(delay), "retry scheduled"),
                    None => (None, "retries exhausted"),
                };
                match self.store.fail(job_id, delay).await {
                    Ok(()) => tracing::warn!(
                        job_id = %job_id,
                        attempts_made,
                        reason,
                        "Transient delivery failure, {}",
                        level
                    ),
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to record retry")
                    }
                }
                0
            }
            Err(DeliveryError::Permanent(reason)) => {
                if let Err(e) = self.store.fail(job_id, None).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record failure");
                } else {
                    tracing::error!(job_id = %job_id, reason, "Permanent delivery failure");
                }
                0
            }
        }
    }
}
