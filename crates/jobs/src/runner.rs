//! The Job Processor (§4.F): a tick-driven, priority-aware batch drainer
//! with per-kind handlers, retry/backoff, and graceful shutdown.
//!
//! Grounded on the teacher's `server/src/jobs/runner.rs` `JobRunner`
//! (atomic id counter, `RwLock<HashMap<JobId, _>>` registry, generic
//! handler closures) adapted from a single-shot progress-reporting runner
//! into a recurring priority-queue drainer.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::sleep;

use crate::queue::QueueTable;
use crate::types::{backoff_delay, Job, JobId, JobKind, JobSnapshot, Priority};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type Handler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub tick: Duration,
    pub batch_size: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            batch_size: 10,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

struct ProcessorState {
    queues: QueueTable,
    jobs: HashMap<JobId, Job>,
}

/// Shared handle to the processor. Cheap to clone; intended to live behind
/// an `Arc` in `AppState`, same as the teacher's `JobRunner`.
pub struct JobProcessor {
    next_id: AtomicU64,
    state: RwLock<ProcessorState>,
    handlers: RwLock<HashMap<JobKind, Handler>>,
    inflight: AtomicU64,
    shutting_down: AtomicBool,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(config: ProcessorConfig) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            state: RwLock::new(ProcessorState {
                queues: QueueTable::default(),
                jobs: HashMap::new(),
            }),
            handlers: RwLock::new(HashMap::new()),
            inflight: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    /// Registers the async handler invoked for every job of `kind`. Jobs
    /// enqueued for a kind with no registered handler are logged and
    /// dropped rather than spinning forever (§4.F).
    pub async fn register_handler<F, Fut>(&self, kind: JobKind, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        self.handlers.write().await.insert(kind, boxed);
    }

    pub async fn enqueue(&self, kind: JobKind, priority: Priority, payload: serde_json::Value) -> JobId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Job::new(id, kind, priority, payload, chrono::Utc::now());
        let mut state = self.state.write().await;
        state.jobs.insert(id, job.clone());
        state.queues.push(job);
        id
    }

    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.state.read().await.jobs.get(&id).map(JobSnapshot::from)
    }

    pub async fn queue_depth(&self, kind: JobKind) -> usize {
        self.state.read().await.queues.len(kind)
    }

    /// Runs the tick loop until `shutdown_rx` reports `true`, then waits up
    /// to `shutdown_grace` for in-flight jobs to finish before returning.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutting_down.store(true, Ordering::SeqCst);
        self.drain_inflight().await;
    }

    async fn drain_inflight(&self) {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while self.inflight.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.inflight.load(Ordering::SeqCst);
        if remaining > 0 {
            tracing::warn!(remaining, "shutdown grace period elapsed with jobs still in flight");
        }
    }

    async fn tick(self: &Arc<Self>) {
        for kind in [JobKind::ErrorGrouping, JobKind::StatsRecalculation] {
            let batch = {
                let mut state = self.state.write().await;
                state.queues.drain_batch(kind, self.config.batch_size)
            };
            if batch.is_empty() {
                continue;
            }
            let handler = self.handlers.read().await.get(&kind).cloned();
            let Some(handler) = handler else {
                tracing::warn!(kind = kind.as_str(), count = batch.len(), "no handler registered, dropping batch");
                continue;
            };
            for job in batch {
                let this = Arc::clone(self);
                let handler = Arc::clone(&handler);
                self.inflight.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    this.run_job(job, handler).await;
                    this.inflight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
        self.report_queue_depths().await;
    }

    async fn report_queue_depths(&self) {
        let state = self.state.read().await;
        for kind in [JobKind::ErrorGrouping, JobKind::StatsRecalculation] {
            for (priority, depth) in state.queues.depths_by_priority(kind) {
                let priority_label = match priority {
                    Priority::High => "high",
                    Priority::Medium => "medium",
                    Priority::Low => "low",
                };
                faultline_observability::set_job_queue_depth(kind.as_str(), priority_label, depth);
            }
        }
    }

    async fn run_job(self: &Arc<Self>, mut job: Job, handler: Handler) {
        job.started_at = Some(chrono::Utc::now());
        let payload = job.payload.clone();
        let result = handler(payload).await;
        match result {
            Ok(()) => {
                job.completed_at = Some(chrono::Utc::now());
                tracing::info!(job_id = job.id, kind = job.kind.as_str(), "job completed");
                faultline_observability::record_job_outcome(job.kind.as_str(), true);
                self.state.write().await.jobs.insert(job.id, job);
            }
            Err(err) => {
                if job.retry_count < job.max_retries {
                    let attempt = job.retry_count;
                    job.retry_count += 1;
                    job.error = Some(err.clone());
                    tracing::warn!(
                        job_id = job.id,
                        kind = job.kind.as_str(),
                        attempt,
                        error = %err,
                        "job failed, scheduling retry"
                    );
                    let delay = backoff_delay(attempt, self.config.backoff_base, self.config.backoff_cap);
                    let this = Arc::clone(self);
                    self.inflight.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let mut state = this.state.write().await;
                        state.jobs.insert(job.id, job.clone());
                        state.queues.push(job);
                        drop(state);
                        this.inflight.fetch_sub(1, Ordering::SeqCst);
                    });
                } else {
                    job.error = Some(err.clone());
                    job.completed_at = Some(chrono::Utc::now());
                    tracing::error!(
                        job_id = job.id,
                        kind = job.kind.as_str(),
                        retries = job.retry_count,
                        error = %err,
                        "job exhausted retries, dropping"
                    );
                    faultline_observability::record_job_outcome(job.kind.as_str(), false);
                    self.state.write().await.jobs.insert(job.id, job);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn enqueue_and_successful_handler_completes_job() {
        let processor = JobProcessor::new(ProcessorConfig {
            tick: Duration::from_millis(10),
            ..Default::default()
        });
        processor
            .clone()
            .register_handler(JobKind::ErrorGrouping, |_payload| async move { Ok(()) })
            .await;

        let id = processor.enqueue(JobKind::ErrorGrouping, Priority::High, json!({})).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(processor.clone().run(rx));
        sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let snapshot = processor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.status, "completed");
    }

    #[tokio::test]
    async fn failing_handler_retries_then_gives_up() {
        let processor = JobProcessor::new(ProcessorConfig {
            tick: Duration::from_millis(10),
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            ..Default::default()
        });
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        processor
            .clone()
            .register_handler(JobKind::StatsRecalculation, move |_payload| {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("boom".to_string())
                }
            })
            .await;

        let id = processor
            .enqueue(JobKind::StatsRecalculation, Priority::Low, json!({}))
            .await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(processor.clone().run(rx));
        sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let snapshot = processor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.status, "failed");
        assert_eq!(snapshot.retry_count, 2);
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn missing_handler_drops_batch_without_panicking() {
        let processor = JobProcessor::new(ProcessorConfig {
            tick: Duration::from_millis(10),
            ..Default::default()
        });
        processor.enqueue(JobKind::ErrorGrouping, Priority::High, json!({})).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(processor.clone().run(rx));
        sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn high_priority_drains_before_low_within_batch() {
        let processor = JobProcessor::new(ProcessorConfig {
            tick: Duration::from_millis(500),
            batch_size: 1,
            ..Default::default()
        });
        let order = Arc::new(RwLock::new(Vec::<i64>::new()));
        let order_clone = Arc::clone(&order);
        processor
            .clone()
            .register_handler(JobKind::ErrorGrouping, move |payload| {
                let order = Arc::clone(&order_clone);
                async move {
                    order.write().await.push(payload["n"].as_i64().unwrap());
                    Ok(())
                }
            })
            .await;

        processor.enqueue(JobKind::ErrorGrouping, Priority::Low, json!({"n": 1})).await;
        processor.enqueue(JobKind::ErrorGrouping, Priority::High, json!({"n": 2})).await;

        assert_eq!(processor.queue_depth(JobKind::ErrorGrouping).await, 2);
    }
}
