use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
struct CheckState {
    node_id: Arc<String>,
}

#[derive(Debug, Deserialize)]
struct CheckParams {
    #[serde(rename = "nodeId")]
    node_id: Option<String>,
}

/// Inbound health check used by peers: the supplied node id must match
/// this node's identity.
pub fn router(node_id: String) -> Router {
    Router::new()
        .route("/register-check", get(register_check))
        .with_state(CheckState {
            node_id: Arc::new(node_id),
        })
}

async fn register_check(
    State(state): State<CheckState>,
    Query(params): Query<CheckParams>,
) -> StatusCode {
    match params.node_id.as_deref() {
        Some(id) if id == state.node_id.as_str() => {
            debug!("Registration check passed");
            StatusCode::OK
        }
        received => {
            warn!(received = ?received, "Registration check failed, node id mismatch");
            StatusCode::FORBIDDEN
        }
    }
}

pub async fn run_check_server(listen: &str, node_id: String) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, router(node_id)).await
}
