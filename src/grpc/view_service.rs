use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::view_service_server::ViewService;
use crate::proto::{HeartbeatReply, HeartbeatRequest, QueryReply, QueryRequest, ViewInfo};
use crate::view::state::View;
use crate::view::ViewServer;

impl From<View> for ViewInfo {
    fn from(view: View) -> Self {
        ViewInfo {
            viewnum: view.viewnum,
            primary: view.primary,
            backup: view.backup,
        }
    }
}

/// gRPC surface of the view service.
pub struct ViewServiceImpl {
    server: Arc<ViewServer>,
}

impl ViewServiceImpl {
    pub fn new(server: Arc<ViewServer>) -> Self {
        Self { server }
    }
}

#[tonic::async_trait]
impl ViewService for ViewServiceImpl {
    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatReply>, Status> {
        let req = request.into_inner();
        if req.server_id.is_empty() {
            return Err(Status::invalid_argument("server_id must not be empty"));
        }

        let view = self.server.heartbeat(&req.server_id, req.viewnum).await;
        Ok(Response::new(HeartbeatReply {
            view: Some(view.into()),
        }))
    }

    async fn query(&self, _request: Request<QueryRequest>) -> Result<Response<QueryReply>, Status> {
        let view = self.server.query().await;
        Ok(Response::new(QueryReply {
            view: Some(view.into()),
        }))
    }
}
