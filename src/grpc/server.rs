use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::dispatch::WorkerRegistry;
use crate::grpc::dispatch_service::DispatchServiceImpl;
use crate::grpc::view_service::ViewServiceImpl;
use crate::proto::dispatch_service_server::DispatchServiceServer;
use crate::proto::view_service_server::ViewServiceServer;
use crate::view::ViewServer;

/// gRPC server for the view service.
pub struct ViewGrpcServer {
    addr: SocketAddr,
    server: Arc<ViewServer>,
}

impl ViewGrpcServer {
    pub fn new(addr: SocketAddr, server: Arc<ViewServer>) -> Self {
        Self { addr, server }
    }

    /// Serve until `shutdown` fires or the transport fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let service = ViewServiceImpl::new(self.server.clone());

        tracing::info!(addr = %self.addr, "Starting view service gRPC server");

        Server::builder()
            .add_service(ViewServiceServer::new(service))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }
}

/// gRPC server for the coordinator's worker-registration endpoint.
pub struct DispatchGrpcServer {
    addr: SocketAddr,
    registry: Arc<WorkerRegistry>,
}

impl DispatchGrpcServer {
    pub fn new(addr: SocketAddr, registry: Arc<WorkerRegistry>) -> Self {
        Self { addr, registry }
    }

    /// Serve until `shutdown` fires or the transport fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let service = DispatchServiceImpl::new(self.registry.clone());

        tracing::info!(addr = %self.addr, "Starting worker registration gRPC server");

        Server::builder()
            .add_service(DispatchServiceServer::new(service))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }
}
