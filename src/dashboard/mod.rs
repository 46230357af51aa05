use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::view::ViewServer;

#[derive(Clone)]
pub struct DashboardState {
    pub view_server: Arc<ViewServer>,
}

#[derive(Serialize)]
struct ViewStatusResponse {
    viewnum: u64,
    primary: String,
    backup: String,
    acknowledged: bool,
    rpc_count: u64,
}

#[derive(Serialize)]
struct ServerResponse {
    server_id: String,
    alive: bool,
    role: String,
}

/// Serve the JSON status API until the process exits. Bind or serve
/// failures are logged, not fatal: the dashboard is observability only.
pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/view", get(view_status_handler))
        .route("/api/servers", get(servers_handler))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn view_status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let status = state.view_server.status().await;

    Json(ViewStatusResponse {
        viewnum: status.view.viewnum,
        primary: status.view.primary.clone(),
        backup: status.view.backup.clone(),
        acknowledged: status.acknowledged,
        rpc_count: status.rpc_count,
    })
}

async fn servers_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let status = state.view_server.status().await;

    let servers: Vec<ServerResponse> = status
        .servers
        .iter()
        .map(|(server_id, alive)| {
            let role = if status.view.is_primary(server_id) {
                "primary"
            } else if status.view.is_backup(server_id) {
                "backup"
            } else if status.idle.contains(server_id) {
                "idle"
            } else {
                "unknown"
            };
            ServerResponse {
                server_id: server_id.clone(),
                alive: *alive,
                role: role.to_string(),
            }
        })
        .collect();

    Json(servers)
}
