//! Test harness for view-service and dispatcher integration tests.
//!
//! Provides handles for spawning a view service, a coordinator registration
//! endpoint, stub workers, and background heartbeat pingers. Every handle
//! aborts its tasks on drop.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};

use foreman_lite::config::ViewConfig;
use foreman_lite::dispatch::WorkerRegistry;
use foreman_lite::grpc::DispatchGrpcServer;
use foreman_lite::proto::dispatch_service_client::DispatchServiceClient;
use foreman_lite::proto::view_service_client::ViewServiceClient;
use foreman_lite::proto::worker_service_server::{WorkerService, WorkerServiceServer};
use foreman_lite::proto::{
    AssignJobReply, AssignJobRequest, HeartbeatRequest, QueryRequest, RegisterRequest,
    ShutdownReply, ShutdownRequest, ViewInfo,
};
use foreman_lite::view::{View, ViewServer};

pub fn local_addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

fn to_view(info: Option<ViewInfo>) -> View {
    let info = info.unwrap_or_default();
    View {
        viewnum: info.viewnum,
        primary: info.primary,
        backup: info.backup,
    }
}

/// View service configuration with shorter timeouts for faster tests.
pub fn test_view_config(port: u16) -> ViewConfig {
    ViewConfig::new(local_addr(port))
        .with_ping_interval(Duration::from_millis(50))
        .with_dead_pings(4)
}

pub const TEST_PING_INTERVAL: Duration = Duration::from_millis(50);
pub const TEST_DEAD_THRESHOLD: Duration = Duration::from_millis(200);

/// Handle to a running view service.
pub struct ViewHandle {
    pub addr: String,
    pub server: Arc<ViewServer>,
    run_handle: JoinHandle<()>,
}

impl ViewHandle {
    pub async fn start(port: u16) -> Self {
        let config = test_view_config(port);
        let server = Arc::new(ViewServer::new(config));

        let run_server = server.clone();
        let run_handle = tokio::spawn(async move {
            if let Err(e) = run_server.run().await {
                tracing::error!(error = %e, "view service exited with error");
            }
        });

        // Wait briefly for the gRPC server to start accepting.
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr: format!("http://127.0.0.1:{}", port),
            server,
            run_handle,
        }
    }

    pub async fn client(&self) -> ViewClient {
        ViewClient::connect(&self.addr).await
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.server.kill();
        self.run_handle.abort();
    }
}

/// Thin wrapper over the generated view service client.
pub struct ViewClient {
    inner: ViewServiceClient<Channel>,
}

impl ViewClient {
    pub async fn connect(addr: &str) -> Self {
        for _ in 0..40 {
            if let Ok(inner) = ViewServiceClient::connect(addr.to_string()).await {
                return Self { inner };
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("could not connect to view service at {}", addr);
    }

    pub async fn heartbeat(&mut self, server_id: &str, viewnum: u64) -> View {
        self.try_heartbeat(server_id, viewnum)
            .await
            .expect("heartbeat RPC failed")
    }

    pub async fn try_heartbeat(&mut self, server_id: &str, viewnum: u64) -> Option<View> {
        self.inner
            .heartbeat(HeartbeatRequest {
                server_id: server_id.to_string(),
                viewnum,
            })
            .await
            .ok()
            .map(|reply| to_view(reply.into_inner().view))
    }

    pub async fn query(&mut self) -> View {
        let reply = self
            .inner
            .query(QueryRequest {})
            .await
            .expect("query RPC failed");
        to_view(reply.into_inner().view)
    }
}

/// Background task heartbeating one server identity, acknowledging views by
/// reporting the viewnum of the last reply (as a real server would).
pub struct Pinger {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Pinger {
    /// Start a pinger for a server with no prior view knowledge.
    pub fn start(addr: String, server_id: &str) -> Self {
        Self::start_at(addr, server_id, 0)
    }

    /// Start a pinger seeded with the viewnum its server last observed.
    /// Needed when the server already holds the primary role: reporting 0
    /// would signal a restart.
    pub fn start_at(addr: String, server_id: &str, initial_viewnum: u64) -> Self {
        let token = CancellationToken::new();
        let server_id = server_id.to_string();

        let pinger_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut client = ViewClient::connect(&addr).await;
            let mut viewnum = initial_viewnum;
            let mut interval = tokio::time::interval(TEST_PING_INTERVAL);
            loop {
                tokio::select! {
                    _ = pinger_token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(view) = client.try_heartbeat(&server_id, viewnum).await {
                            viewnum = view.viewnum;
                        }
                    }
                }
            }
        });

        Self { token, handle }
    }

    /// Stop heartbeating (simulates the server going silent).
    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for Pinger {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Shared state of a stub worker.
pub struct StubWorkerState {
    pub jobs_completed: AtomicU64,
    pub healthy: AtomicBool,
    /// Every (phase, job_number) pair this worker completed.
    pub seen: Mutex<HashSet<(i32, u32)>>,
    /// Completion order, for asserting the phase barrier.
    pub order: Mutex<Vec<(i32, u32)>>,
}

impl StubWorkerState {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            seen: Mutex::new(HashSet::new()),
            order: Mutex::new(Vec::new()),
        }
    }
}

struct StubWorker {
    state: Arc<StubWorkerState>,
}

#[tonic::async_trait]
impl WorkerService for StubWorker {
    async fn assign_job(
        &self,
        request: Request<AssignJobRequest>,
    ) -> Result<Response<AssignJobReply>, Status> {
        if !self.state.healthy.load(Ordering::SeqCst) {
            return Err(Status::unavailable("worker offline"));
        }

        let req = request.into_inner();
        self.state
            .seen
            .lock()
            .unwrap()
            .insert((req.phase, req.job_number));
        self.state
            .order
            .lock()
            .unwrap()
            .push((req.phase, req.job_number));
        self.state.jobs_completed.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(AssignJobReply {}))
    }

    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<ShutdownReply>, Status> {
        Ok(Response::new(ShutdownReply {
            jobs_completed: self.state.jobs_completed.load(Ordering::SeqCst),
        }))
    }
}

/// Handle to a running stub worker.
pub struct WorkerHandle {
    pub address: String,
    pub state: Arc<StubWorkerState>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn start(port: u16) -> Self {
        let state = Arc::new(StubWorkerState::new());
        let token = CancellationToken::new();
        let addr = local_addr(port);

        let service = StubWorker {
            state: state.clone(),
        };
        let serve_token = token.clone();
        let handle = tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(WorkerServiceServer::new(service))
                .serve_with_shutdown(addr, serve_token.cancelled_owned())
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            address: format!("127.0.0.1:{}", port),
            state,
            token,
            handle,
        }
    }

    /// Make every subsequent job assignment fail at the RPC layer.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Tear the worker's server down entirely (simulates a crash).
    pub fn kill(&self) {
        self.token.cancel();
    }

    pub fn jobs_completed(&self) -> u64 {
        self.state.jobs_completed.load(Ordering::SeqCst)
    }

    pub fn seen_jobs(&self) -> HashSet<(i32, u32)> {
        self.state.seen.lock().unwrap().clone()
    }

    pub fn completion_order(&self) -> Vec<(i32, u32)> {
        self.state.order.lock().unwrap().clone()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Handle to a running worker-registration endpoint plus its registry.
pub struct CoordinatorHandle {
    pub registry: Arc<WorkerRegistry>,
    pub addr: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub async fn start(port: u16) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let token = CancellationToken::new();

        let server = DispatchGrpcServer::new(local_addr(port), registry.clone());
        let serve_token = token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(serve_token).await {
                tracing::error!(error = %e, "registration server exited with error");
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            registry,
            addr: format!("127.0.0.1:{}", port),
            token,
            handle,
        }
    }

    /// Register a worker the way real workers do: over the wire.
    pub async fn register_over_grpc(&self, worker_addr: &str) {
        let url = format!("http://{}", self.addr);
        let mut client = None;
        for _ in 0..40 {
            match DispatchServiceClient::connect(url.clone()).await {
                Ok(c) => {
                    client = Some(c);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        let mut client = client.expect("could not connect to registration endpoint");
        let reply = client
            .register(RegisterRequest {
                address: worker_addr.to_string(),
            })
            .await
            .expect("register RPC failed")
            .into_inner();
        assert!(reply.accepted);
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Wait for a condition to become true with timeout.
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true.
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(25)).await;
    assert!(result, "{}", message);
}
