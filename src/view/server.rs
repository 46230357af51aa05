use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ViewConfig;
use crate::error::Result;
use crate::grpc::server::ViewGrpcServer;
use crate::view::state::{View, ViewState};

/// Point-in-time snapshot for the status dashboard.
#[derive(Debug, Clone)]
pub struct ViewStatus {
    pub view: View,
    pub acknowledged: bool,
    pub rpc_count: u64,
    pub idle: Vec<String>,
    /// Known servers with their liveness, sorted by name.
    pub servers: Vec<(String, bool)>,
}

/// The view service: a [`ViewState`] behind one exclusive lock, a periodic
/// liveness ticker, and an idempotent kill switch.
///
/// Heartbeat handling, queries, and ticks run on concurrent paths; each
/// locks the state for the entirety of its operation and never suspends
/// while holding the lock.
pub struct ViewServer {
    config: ViewConfig,
    state: Mutex<ViewState>,
    rpc_count: AtomicU64,
    shutdown: CancellationToken,
}

impl ViewServer {
    pub fn new(config: ViewConfig) -> Self {
        let state = ViewState::new(config.dead_threshold());
        Self {
            config,
            state: Mutex::new(state),
            rpc_count: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Handle one heartbeat; replies with the current view.
    pub async fn heartbeat(&self, server_id: &str, reported_viewnum: u64) -> View {
        self.rpc_count.fetch_add(1, Ordering::Relaxed);
        self.state
            .lock()
            .await
            .heartbeat(server_id, reported_viewnum, Instant::now())
    }

    /// Handle one query; pure read of the current view.
    pub async fn query(&self) -> View {
        self.rpc_count.fetch_add(1, Ordering::Relaxed);
        self.state.lock().await.query()
    }

    pub async fn status(&self) -> ViewStatus {
        let now = Instant::now();
        let state = self.state.lock().await;
        ViewStatus {
            view: state.query(),
            acknowledged: state.acknowledged(),
            rpc_count: self.rpc_count(),
            idle: state.idle_servers(),
            servers: state.liveness(now),
        }
    }

    /// Spawn the periodic liveness ticker. It runs until the service is
    /// killed.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(server.config.ping_interval);
            loop {
                tokio::select! {
                    _ = server.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        server.state.lock().await.tick(Instant::now());
                    }
                }
            }
        })
    }

    /// Run the ticker and the gRPC server until the service is killed.
    ///
    /// A fatal transport error on the accept path is unrecoverable for this
    /// process: it is logged and the whole service stops itself.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let ticker = self.spawn_ticker();

        let grpc = ViewGrpcServer::new(self.config.listen_addr, self.clone());
        let result = grpc.run(self.shutdown.clone()).await;
        if let Err(ref e) = result {
            tracing::error!(error = %e, "View service transport failed, shutting down");
        }

        self.kill();
        let _ = ticker.await;
        result.map_err(Into::into)
    }

    /// Ask the service to stop. Safe to call any number of times; halts the
    /// accept path and the ticker without touching the shared state.
    pub fn kill(&self) {
        self.shutdown.cancel();
    }

    pub fn is_dead(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of RPCs served, for observability.
    pub fn rpc_count(&self) -> u64 {
        self.rpc_count.load(Ordering::Relaxed)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
