use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};

/// A worker known to the registry.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub address: String,
    pub registered_at: DateTime<Utc>,
}

/// Tracks every worker that has ever registered and hands out idle workers
/// on demand.
///
/// Acquisition blocks until some worker is idle; with no registered workers
/// it blocks indefinitely, which is the dispatcher's natural backpressure.
/// Workers are never explicitly removed: a crashed worker simply never
/// reappears in the idle pool.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInfo>>,
    idle_tx: mpsc::UnboundedSender<String>,
    idle_rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        // Unbounded so register/release never block producers.
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Self {
            workers: RwLock::new(HashMap::new()),
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
        }
    }

    /// Record a worker under its address and make it immediately available
    /// for assignment, waking one blocked `acquire_idle` if any.
    /// Re-registration refreshes the record and re-idles the worker.
    pub async fn register(&self, address: &str) {
        let info = WorkerInfo {
            address: address.to_string(),
            registered_at: Utc::now(),
        };
        self.workers.write().await.insert(address.to_string(), info);
        tracing::info!(worker = %address, "Worker registered");

        // Fails only once the registry is being torn down.
        let _ = self.idle_tx.send(address.to_string());
    }

    /// Remove and return one idle worker, waiting until one is available.
    pub async fn acquire_idle(&self) -> String {
        let mut idle = self.idle_rx.lock().await;
        idle.recv()
            .await
            .expect("registry owns the idle sender, channel cannot close")
    }

    /// Return a previously acquired worker to the idle pool, making it
    /// eligible for `acquire_idle` again.
    pub fn release(&self, address: String) {
        // Fails only once the registry is being torn down.
        let _ = self.idle_tx.send(address);
    }

    /// Every worker that has ever registered, for the shutdown sweep.
    pub async fn list_all(&self) -> Vec<String> {
        self.workers.read().await.keys().cloned().collect()
    }

    pub async fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }
}
