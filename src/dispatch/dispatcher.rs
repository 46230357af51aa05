use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::{DispatchConfig, RetryPolicy};
use crate::dispatch::job::{DispatchSummary, JobSpec, Phase, WorkerReport};
use crate::dispatch::registry::WorkerRegistry;
use crate::grpc::worker_client;

/// Drives a two-phase batch computation over the worker pool.
///
/// Each job runs as its own task; a transport failure is absorbed and the
/// same job number is retried on a freshly acquired worker. Callers only
/// ever observe eventual success.
pub struct JobDispatcher {
    registry: Arc<WorkerRegistry>,
    input: String,
    config: DispatchConfig,
}

impl JobDispatcher {
    pub fn new(registry: Arc<WorkerRegistry>, input: impl Into<String>, config: DispatchConfig) -> Self {
        Self {
            registry,
            input: input.into(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Run every job of one phase to completion.
    ///
    /// This is a full barrier: it returns only after `count` completions
    /// have been observed. Reduce jobs read map outputs, so the caller must
    /// not start the next phase before this returns.
    pub async fn run_phase(&self, phase: Phase, count: u32, other_phase_count: u32) {
        if count == 0 {
            return;
        }

        // Capacity `count` so completion sends never block their producers.
        let (done_tx, mut done_rx) = mpsc::channel::<u32>(count as usize);

        for job_number in 0..count {
            let worker = self.registry.acquire_idle().await;
            let spec = JobSpec {
                input: self.input.clone(),
                phase,
                job_number,
                other_phase_count,
            };
            let registry = self.registry.clone();
            let retry = self.config.retry.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                if let Some(worker) = dispatch_job(&registry, worker, &spec, &retry).await {
                    registry.release(worker);
                }
                let _ = done.send(spec.job_number).await;
            });
        }
        drop(done_tx);

        let mut completed = 0;
        while completed < count {
            if done_rx.recv().await.is_none() {
                break;
            }
            completed += 1;
        }
        tracing::info!(phase = %phase, count, "Phase complete");
    }

    /// Run the map phase, then the reduce phase, then shut every registered
    /// worker down and collect per-worker job counts.
    pub async fn run_all(&self, n_map: u32, n_reduce: u32) -> DispatchSummary {
        let started_at = Utc::now();

        tracing::info!(n_map, n_reduce, "Starting map phase");
        self.run_phase(Phase::Map, n_map, n_reduce).await;

        tracing::info!(n_reduce, "Starting reduce phase");
        self.run_phase(Phase::Reduce, n_reduce, n_map).await;

        let reports = self.shutdown_workers().await;
        DispatchSummary {
            reports,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Send every registered worker a shutdown RPC and collect its job
    /// count. Each worker is handled independently under a timeout;
    /// unreachable workers are logged and omitted from the result.
    pub async fn shutdown_workers(&self) -> Vec<WorkerReport> {
        let mut reports = Vec::new();
        for address in self.registry.list_all().await {
            let shutdown = worker_client::shutdown_worker(&address);
            match tokio::time::timeout(self.config.shutdown_timeout, shutdown).await {
                Ok(Ok(jobs_completed)) => {
                    tracing::info!(worker = %address, jobs_completed, "Worker shut down");
                    reports.push(WorkerReport {
                        address,
                        jobs_completed,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        worker = %address,
                        error = %e,
                        "Worker unreachable during shutdown, skipping"
                    );
                }
                Err(_) => {
                    tracing::warn!(worker = %address, "Worker shutdown timed out, skipping");
                }
            }
        }
        reports
    }
}

/// Run one job to completion, acquiring a fresh worker after each failure.
///
/// Returns the worker that completed the job so it can be released back to
/// the pool. A failed worker is never released; if it recovers it will
/// re-register on its own. Returns `None` only when the retry policy gives
/// up (never under the default unlimited policy).
async fn dispatch_job(
    registry: &WorkerRegistry,
    mut worker: String,
    spec: &JobSpec,
    retry: &RetryPolicy,
) -> Option<String> {
    let mut attempt = 0u32;
    loop {
        match worker_client::assign_job(&worker, spec).await {
            Ok(()) => return Some(worker),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    worker = %worker,
                    phase = %spec.phase,
                    job = spec.job_number,
                    attempt,
                    error = %e,
                    "Job assignment failed, retrying on another worker"
                );
                match retry.next_delay(attempt) {
                    Some(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        worker = registry.acquire_idle().await;
                    }
                    None => {
                        tracing::error!(
                            phase = %spec.phase,
                            job = spec.job_number,
                            attempt,
                            "Retry budget exhausted, abandoning job"
                        );
                        return None;
                    }
                }
            }
        }
    }
}
