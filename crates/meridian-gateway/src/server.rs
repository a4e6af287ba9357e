//! The Gateway's `axum` entry point: a single `WebSocket` upgrade route
//! wired against shared [`AppState`].

use crate::connection;
use crate::state::AppState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tracing::info;

/// Build the router. Exposed separately from [`serve`] so callers (tests,
/// `meridian-daemon`) can mount it behind their own listener or compose it
/// with other routes.
pub fn router(state: AppState) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}

/// Bind and serve the Gateway until the process is asked to stop.
pub async fn serve(bind_addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "gateway listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerFrame;
    use futures::{SinkExt, StreamExt};
    use meridian_audit::AuditLog;
    use meridian_events::EventBus;
    use meridian_llm::{CredentialPool, EchoProvider};
    use meridian_policy::AccessPolicyEngine;
    use meridian_quota::QuotaManager;
    use meridian_registry::ToolRegistry;
    use meridian_runtime::{AgentRuntime, DispatchingSandbox, HandlerRegistry, SandboxDriver, SessionManager};
    use meridian_storage::{FileStorage, JobStore, PolicyStore, SessionStore, TenantStore};
    use meridian_workspace::{WorkspaceBoundary, WorkspaceConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn test_state(dir: &std::path::Path) -> AppState {
        let backend = FileStorage::new(dir);
        let tenants = Arc::new(TenantStore::open(&backend).await.unwrap());
        let policies_store = PolicyStore::open(&backend).await.unwrap();
        let policies = Arc::new(PolicyStore::open(&backend).await.unwrap());
        let jobs = Arc::new(JobStore::open(&backend).await.unwrap());
        let registry = Arc::new(ToolRegistry::builtin());
        let events = Arc::new(EventBus::new(256));
        let access_policy = Arc::new(AccessPolicyEngine::new(policies_store, Duration::from_secs(30)).await.unwrap());
        let quota = Arc::new(QuotaManager::new(Duration::from_millis(100)));
        let sessions = Arc::new(SessionStore::open(dir).await.unwrap());
        let session_manager = Arc::new(SessionManager::new(sessions.clone(), events.clone(), 1_000_000, 4));
        let boundary = WorkspaceBoundary::new(WorkspaceConfig::new(dir.to_path_buf()));
        let handlers = Arc::new(HandlerRegistry::builtin(boundary));
        let sandbox: Arc<dyn SandboxDriver> = Arc::new(DispatchingSandbox::new(None));
        let audit = Arc::new(AuditLog::open(dir).await.unwrap());

        let agent = Arc::new(AgentRuntime {
            sessions: session_manager,
            registry: registry.clone(),
            handlers,
            sandbox,
            access_policy: access_policy.clone(),
            quota: quota.clone(),
            llm: Arc::new(EchoProvider),
            credentials: Arc::new(CredentialPool::new()),
            events: events.clone(),
            audit,
            max_iterations: 5,
            turn_deadline: Duration::from_secs(5),
            tool_timeout: Duration::from_secs(1),
            model: "echo-1".to_string(),
        });

        AppState {
            sessions,
            tenants,
            policies,
            jobs,
            registry,
            agent,
            access_policy,
            quota,
            events,
            outbound_queue_max: 32,
            protocol_min: 1,
            protocol_max: 1,
        }
    }

    #[tokio::test]
    async fn handshake_then_tools_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("ws://{addr}/ws");
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let hello = serde_json::json!({
            "kind": "hello",
            "min_protocol": 1,
            "max_protocol": 1,
            "client_info": {"name": "test"},
        });
        ws.send(WsMessage::Text(hello.to_string().into())).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        let WsMessage::Text(text) = reply else { panic!("expected text frame") };
        let frame: ServerFrame = serde_json::from_str(&text).unwrap();
        match frame {
            ServerFrame::HelloOk { protocol, .. } => assert_eq!(protocol, 1),
            _ => panic!("expected hello_ok"),
        }

        let request = serde_json::json!({
            "kind": "request",
            "id": "r1",
            "method": "tools.list",
        });
        ws.send(WsMessage::Text(request.to_string().into())).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        let WsMessage::Text(text) = reply else { panic!("expected text frame") };
        let frame: ServerFrame = serde_json::from_str(&text).unwrap();
        match frame {
            ServerFrame::Response { id, result, error } => {
                assert_eq!(id, "r1");
                assert!(error.is_none());
                assert!(result.is_some());
            }
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn mismatched_protocol_range_closes_with_not_paired() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path()).await;
        state.protocol_min = 5;
        state.protocol_max = 9;
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("ws://{addr}/ws");
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let hello = serde_json::json!({
            "kind": "hello",
            "min_protocol": 1,
            "max_protocol": 1,
            "client_info": {"name": "test"},
        });
        ws.send(WsMessage::Text(hello.to_string().into())).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        let WsMessage::Text(text) = reply else { panic!("expected text frame") };
        let frame: ServerFrame = serde_json::from_str(&text).unwrap();
        match frame {
            ServerFrame::Response { error, .. } => {
                assert_eq!(error.unwrap().code, meridian_core::WireErrorCode::NotPaired);
            }
            _ => panic!("expected an error response for the failed handshake"),
        }
    }
}
