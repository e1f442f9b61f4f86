use crate::services::auth_service::AuthService;
use crate::services::deletions;
use crate::services::file_service::FileService;
use crate::services::jobs::{Job, JobQueue};
use crate::services::monitoring::{ErrorReporter, MonitoringEvent};
use crate::services::quota::QuotaService;
use crate::services::recycle_service::RecycleService;
use crate::services::share_service::ShareService;
use crate::services::storage::StorageService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};

/// Object deletions are given up after this many tries.
pub const MAX_DELETE_ATTEMPTS: u32 = 3;

/// Pending deletion rows handled per `RetryPendingDeletions` job.
const DELETION_BATCH: u64 = 500;

/// Everything the worker calls into.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub auth_service: Arc<AuthService>,
    pub file_service: Arc<FileService>,
    pub share_service: Arc<ShareService>,
    pub recycle_service: Arc<RecycleService>,
    pub quota: Arc<QuotaService>,
    pub reporter: Arc<dyn ErrorReporter>,
}

pub struct BackgroundWorker {
    ctx: WorkerContext,
    jobs: JobQueue,
    rx: mpsc::Receiver<Job>,
    shutdown: watch::Receiver<bool>,
    sweep_interval: Option<Duration>,
    retry_backoff: Duration,
}

impl BackgroundWorker {
    pub fn new(
        ctx: WorkerContext,
        jobs: JobQueue,
        rx: mpsc::Receiver<Job>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            jobs,
            rx,
            shutdown,
            sweep_interval: None,
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// Schedule the maintenance sweep every `every`.
    pub fn with_sweep(mut self, every: Duration) -> Self {
        self.sweep_interval = Some(every);
        self
    }

    /// Delay before retry `n` is `n * backoff`.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (sweep: {:?})",
            self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval.unwrap_or(Duration::from_secs(3600)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                job = self.rx.recv() => {
                    match job {
                        Some(job) => self.handle(job).await,
                        None => break,
                    }
                }
                _ = ticker.tick(), if self.sweep_interval.is_some() => {
                    tracing::info!("🧹 Scheduling maintenance sweep");
                    for job in Job::sweep() {
                        self.jobs.submit(job);
                    }
                }
            }
        }

        self.drain().await;
        tracing::info!("👋 Background worker stopped");
    }

    /// Finish whatever is already queued without accepting more.
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0;
        while let Ok(job) = self.rx.try_recv() {
            self.handle(job).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::info!("Drained {} queued jobs", drained);
        }
    }

    pub async fn handle(&self, job: Job) {
        tracing::debug!("Running job {}", job);
        match job {
            Job::DeleteObject { key, attempt } => self.delete_object(key, attempt).await,
            Job::PurgeExpiredRecycleItems => {
                match self.ctx.recycle_service.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Purged {} expired recycle bin items", n),
                    Err(e) => self.report(format!("Recycle bin purge failed: {}", e)).await,
                }
                self.ctx.quota.cleanup();
            }
            Job::PurgeStaleUploads => match self.ctx.file_service.purge_stale_uploads().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Discarded {} stale uploads", n),
                Err(e) => self.report(format!("Stale upload purge failed: {}", e)).await,
            },
            Job::PurgeExpiredTokens => match self.ctx.auth_service.purge_expired_tokens().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired refresh tokens", n),
                Err(e) => self.report(format!("Token purge failed: {}", e)).await,
            },
            Job::PurgeExpiredShares => match self.ctx.share_service.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired shares", n),
                Err(e) => self.report(format!("Share purge failed: {}", e)).await,
            },
            Job::RetryPendingDeletions => {
                if let Err(e) = self.retry_pending_deletions().await {
                    self.report(format!("Pending deletion sweep failed: {}", e))
                        .await;
                }
            }
        }
    }

    async fn delete_object(&self, key: String, attempt: u32) {
        let err = match self.ctx.storage.delete_object(&key).await {
            Ok(()) => {
                tracing::info!("Deleted object {}", key);
                self.forget(&key).await;
                return;
            }
            Err(e) => e,
        };

        if attempt >= MAX_DELETE_ATTEMPTS {
            self.report(format!(
                "Giving up deleting object {} after {} attempts: {}",
                key, attempt, err
            ))
            .await;
            self.forget(&key).await;
            return;
        }

        tracing::warn!(
            "Deleting object {} failed (attempt {}): {}, retrying",
            key,
            attempt,
            err
        );

        let jobs = self.jobs.clone();
        let delay = self.retry_backoff * attempt;
        tokio::spawn(async move {
            sleep(delay).await;
            let retry = Job::DeleteObject {
                key,
                attempt: attempt + 1,
            };
            if let Err(e) = jobs.enqueue(retry).await {
                tracing::warn!("Could not requeue object deletion: {}", e);
            }
        });
    }

    /// Deletions whose queued job was dropped or never finished. Each row
    /// gets one try per sweep, up to `MAX_DELETE_ATTEMPTS` in total.
    async fn retry_pending_deletions(&self) -> Result<(), sea_orm::DbErr> {
        let rows = deletions::due(&self.ctx.db, DELETION_BATCH).await?;
        let batch_full = rows.len() as u64 == DELETION_BATCH;

        let mut deleted = 0;
        for row in rows {
            match self.ctx.storage.delete_object(&row.storage_key).await {
                Ok(()) => {
                    deletions::forget(&self.ctx.db, &row.storage_key).await?;
                    deleted += 1;
                }
                Err(e) if row.attempts as u32 + 1 >= MAX_DELETE_ATTEMPTS => {
                    self.report(format!(
                        "Giving up deleting object {} after {} attempts: {}",
                        row.storage_key,
                        row.attempts + 1,
                        e
                    ))
                    .await;
                    deletions::forget(&self.ctx.db, &row.storage_key).await?;
                }
                Err(e) => {
                    tracing::warn!(
                        "Deleting object {} failed (attempt {}): {}",
                        row.storage_key,
                        row.attempts + 1,
                        e
                    );
                    deletions::record_failure(&self.ctx.db, &row.id).await?;
                }
            }
        }

        if deleted > 0 {
            tracing::info!("Deleted {} objects left pending", deleted);
        }
        if batch_full {
            self.jobs.submit(Job::RetryPendingDeletions);
        }
        Ok(())
    }

    async fn forget(&self, key: &str) {
        if let Err(e) = deletions::forget(&self.ctx.db, key).await {
            tracing::warn!("Could not clear pending deletion of {}: {}", key, e);
        }
    }

    async fn report(&self, message: String) {
        self.ctx
            .reporter
            .report(MonitoringEvent::new("worker", message))
            .await;
    }
}
