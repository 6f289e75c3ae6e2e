//! Background worker pool that drains the durable ingestion queue.
//!
//! Grounded on `openintent-kernel/src/scheduler.rs`'s `Scheduler`: a
//! `Notify`-driven loop that parks when the queue is empty and wakes on
//! either a new submission or shutdown. The in-memory `SegQueue` lanes there
//! become a single durable FIFO here, backed by `document_ingestion_job` via
//! [`healthmind_store::IngestionJobStore`], since a crashed worker must not
//! lose queued jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use healthmind_gateway::LlmGateway;
use healthmind_store::HealthStore;

use crate::ocr::OcrClient;
use crate::pipeline::run_job;

/// Default number of concurrent worker tasks.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// How long an idle worker waits for a notification before polling the
/// queue again, guarding against a missed wakeup on enqueue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct PoolInner {
    store: HealthStore,
    gateway: LlmGateway,
    ocr: OcrClient,
    extraction_model: String,
    notify: Notify,
    shutdown: AtomicBool,
}

/// A pool of background workers draining [`healthmind_store::IngestionJobStore`].
///
/// Cloning a document into the queue via `enqueue` and calling [`Self::notify`]
/// is how callers (the upload endpoint) hand work to the pool without
/// blocking on it.
pub struct IngestionWorkerPool {
    inner: Arc<PoolInner>,
    handles: Vec<JoinHandle<()>>,
}

impl IngestionWorkerPool {
    /// Spawn `worker_count` background tasks pulling from the shared queue.
    pub fn start(
        store: HealthStore,
        gateway: LlmGateway,
        ocr: OcrClient,
        extraction_model: String,
        worker_count: usize,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            store,
            gateway,
            ocr,
            extraction_model,
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        });

        let handles = (0..worker_count.max(1))
            .map(|id| {
                let inner = inner.clone();
                tokio::spawn(worker_loop(id, inner))
            })
            .collect();

        Self { inner, handles }
    }

    /// Wake a parked worker to check the queue immediately, instead of
    /// waiting out the idle poll interval. Safe to call from any task that
    /// just enqueued a job.
    pub fn notify(&self) {
        self.inner.notify.notify_one();
    }

    /// Signal every worker to stop after its current job (if any) and wake
    /// them so the shutdown flag is observed promptly.
    pub async fn shutdown(self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[instrument(skip(inner), fields(worker_id = id))]
async fn worker_loop(id: usize, inner: Arc<PoolInner>) {
    info!("ingestion worker started");
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match inner.store.ingestion_jobs.claim_next().await {
            Ok(Some(job)) => {
                info!(job_id = %job.id, document_id = %job.document_id, "claimed ingestion job");
                let result =
                    run_job(&inner.store, &inner.gateway, &inner.ocr, &inner.extraction_model, &job.document_id)
                        .await;
                let outcome = match result {
                    Ok(()) => inner.store.ingestion_jobs.mark_completed(&job.id).await,
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "ingestion job failed");
                        if job.attempts >= MAX_ATTEMPTS {
                            inner.store.ingestion_jobs.mark_failed(&job.id).await
                        } else {
                            inner.store.ingestion_jobs.requeue(&job.id).await
                        }
                    }
                };
                if let Err(e) = outcome {
                    error!(job_id = %job.id, error = %e, "failed to update job status after run");
                }
            }
            Ok(None) => {
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to claim next ingestion job, backing off");
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }
    info!("ingestion worker stopped");
}

/// Jobs are abandoned as permanently failed after this many attempts,
/// leaving the document's own status (set by `run_job`'s failure path) as
/// the durable record of what went wrong.
const MAX_ATTEMPTS: i64 = 3;
