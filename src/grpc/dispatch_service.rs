use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::dispatch::WorkerRegistry;
use crate::proto::dispatch_service_server::DispatchService;
use crate::proto::{RegisterReply, RegisterRequest};

/// Registration endpoint workers announce themselves on. Thin: all state
/// lives in the registry.
pub struct DispatchServiceImpl {
    registry: Arc<WorkerRegistry>,
}

impl DispatchServiceImpl {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl DispatchService for DispatchServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterReply>, Status> {
        let req = request.into_inner();
        if req.address.is_empty() {
            return Err(Status::invalid_argument("address must not be empty"));
        }

        self.registry.register(&req.address).await;
        Ok(Response::new(RegisterReply { accepted: true }))
    }
}
