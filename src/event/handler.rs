use std::sync::Arc;

use axum::extract::ws::Message::{Binary, Close, Ping, Pong, Text};
use axum::extract::ws::{self, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, warn};
use serde::Deserialize;
use tokio::sync::{Notify, mpsc};
use tokio::try_join;

use crate::auth;
use crate::message::service::MessageService;
use crate::presence::service::PresenceService;
use crate::product;
use crate::state::AppState;

use super::ConnectionId;
use super::hub::{Connection, ConnectionInfo, Hub};
use super::model::{InboundFrame, OutboundFrame, Payload};

#[derive(Deserialize)]
pub struct HandshakeParams {
    token: Option<String>,
    #[serde(rename = "productId")]
    product_id: Option<product::Id>,
}

pub async fn ws(
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Handshake validation happens on the socket rather than at upgrade time so
/// the client always receives a structured `error` frame before the close.
async fn handle_socket(ws: WebSocket, params: HandshakeParams, state: AppState) {
    let (token, product_id) = match (params.token, params.product_id) {
        (Some(token), Some(product_id)) if !product_id.is_blank() => (token, product_id),
        _ => {
            reject(ws, super::Error::MissingHandshakeParams).await;
            return;
        }
    };

    let identity = match state.auth_service.verify(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            reject(ws, e).await;
            return;
        }
    };

    let (payload_tx, payload_rx) = mpsc::unbounded_channel();
    let conn = Connection::new(
        ConnectionInfo {
            sub: identity.sub.clone(),
            name: identity.name.clone(),
            product_id: product_id.clone(),
        },
        payload_tx,
    );
    let close = conn.close_signal();
    let conn_id = state.hub.register(conn).await;

    state.presence_service.connected(&identity.sub).await;

    // the payload receiver is still in scope, so the enqueue cannot fail
    state
        .hub
        .send(&conn_id, OutboundFrame::welcome(&identity.name, &product_id))
        .await;

    let (sink, stream) = ws.split();

    let write_task = tokio::spawn(write(
        conn_id,
        sink,
        payload_rx,
        state.hub.clone(),
        state.presence_service.clone(),
    ));
    let read_task = tokio::spawn(read(
        conn_id,
        stream,
        close,
        state.hub.clone(),
        state.presence_service.clone(),
        state.message_service.clone(),
    ));

    match try_join!(read_task, write_task) {
        Ok(_) => debug!("ws connection {conn_id} finished gracefully"),
        Err(e) => error!("ws connection {conn_id} finished with error: {e}"),
    }
}

/// Pre-registration errors go out untagged, `{ "error": ... }`; only frames
/// on an established connection carry the `type` tag.
fn rejection(detail: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": detail.to_string() }).to_string()
}

async fn reject(mut ws: WebSocket, e: impl std::fmt::Display) {
    let _ = ws.send(ws::Message::Text(rejection(e).into())).await;
    let _ = ws.close().await;
}

/// Reads client frames until the peer goes away or the hub evicts this
/// connection. Whoever gets `Some` out of the final unregister owns the
/// offline flow; every other racing path observes a no-op.
async fn read(
    conn_id: ConnectionId,
    mut stream: SplitStream<WebSocket>,
    close: Arc<Notify>,
    hub: Arc<Hub>,
    presence_service: PresenceService,
    message_service: MessageService,
) {
    loop {
        tokio::select! {
            // evicted by the hub => stop reading
            _ = close.notified() => break,

            frame = stream.next() => {
                let Some(message) = frame else { break };
                match message {
                    Err(e) => {
                        debug!("failed to read ws frame on {conn_id}: {e}");
                        break;
                    }
                    Ok(Close(frame)) => {
                        debug!("ws connection {conn_id} closed by client: {frame:?}");
                        break;
                    }
                    Ok(Text(content)) => {
                        handle_text_frame(
                            &conn_id,
                            content.as_str(),
                            &hub,
                            &presence_service,
                            &message_service,
                        )
                        .await;
                    }
                    Ok(Pong(_)) => hub.ack_ping(&conn_id).await,
                    Ok(Ping(_)) => {} // axum answers these itself
                    Ok(Binary(content)) => {
                        warn!("ignoring binary ws frame on {conn_id}: {} bytes", content.len());
                    }
                }
            }
        }
    }

    if let Some(removed) = hub.unregister(&conn_id).await {
        presence_service.disconnected(&removed.sub).await;
    }
}

/// Per-frame errors go back to the offending connection only and never close
/// it; a frame from an already-evicted connection is simply discarded.
async fn handle_text_frame(
    conn_id: &ConnectionId,
    content: &str,
    hub: &Arc<Hub>,
    presence_service: &PresenceService,
    message_service: &MessageService,
) {
    let removed = match serde_json::from_str::<InboundFrame>(content) {
        Ok(InboundFrame::Heartbeat { .. }) => {
            hub.ack_ping(conn_id).await;
            if let Some(conn) = hub.info(conn_id).await {
                presence_service.heartbeat(&conn.sub).await;
            }
            None
        }
        Ok(InboundFrame::Chat {
            message,
            recipient,
            timestamp,
        }) => {
            match message_service
                .submit(conn_id, recipient, &message, timestamp)
                .await
            {
                Ok(_) => None,
                Err(e) => {
                    warn!("message submission failed on {conn_id}: {e}");
                    hub.send(conn_id, OutboundFrame::error(e)).await
                }
            }
        }
        Err(e) => {
            warn!("malformed frame on {conn_id}: {e}");
            hub.send(conn_id, OutboundFrame::error("invalid message format"))
                .await
        }
    };

    if let Some(removed) = removed {
        presence_service.disconnected(&removed.sub).await;
    }
}

/// Drains the payload channel into the socket. The channel closing (the hub
/// dropped this connection) ends the task, and the transport is closed here
/// and nowhere else, so eviction races cannot double-close it.
async fn write(
    conn_id: ConnectionId,
    mut sink: SplitSink<WebSocket, ws::Message>,
    mut payloads: mpsc::UnboundedReceiver<Payload>,
    hub: Arc<Hub>,
    presence_service: PresenceService,
) {
    while let Some(payload) = payloads.recv().await {
        let message = match &payload {
            Payload::Frame(frame) => match serde_json::to_string(frame) {
                Ok(json) => ws::Message::Text(json.into()),
                Err(e) => {
                    error!("failed to serialize outbound frame: {e}");
                    continue;
                }
            },
            Payload::Ping => ws::Message::Ping(Default::default()),
        };

        if let Err(e) = sink.send(message).await {
            debug!("failed to write ws frame on {conn_id}: {e}");
            if let Some(removed) = hub.unregister(&conn_id).await {
                presence_service.disconnected(&removed.sub).await;
            }
            break;
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::message::repository::test::{
        InMemoryMessageRepository, UnavailableMessageRepository,
    };
    use crate::presence::store::PresenceStore;
    use crate::user;

    use super::*;

    struct Fixture {
        hub: Arc<Hub>,
        presence_service: PresenceService,
        message_service: MessageService,
    }

    fn fixture(repository: crate::message::Repository) -> Fixture {
        let hub = Arc::new(Hub::new());
        let presence_service =
            PresenceService::new(Arc::new(PresenceStore::new()), hub.clone());
        let message_service =
            MessageService::new(repository, hub.clone(), presence_service.clone());
        Fixture {
            hub,
            presence_service,
            message_service,
        }
    }

    async fn connect(
        f: &Fixture,
        s: &str,
        product: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ConnectionInfo {
            sub: user::Sub(s.into()),
            name: s.to_uppercase(),
            product_id: product::Id(product.into()),
        };
        let id = f.hub.register(Connection::new(info, tx)).await;
        (id, rx)
    }

    fn error_frames(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            if let Payload::Frame(OutboundFrame::Error { error }) = payload {
                seen.push(error);
            }
        }
        seen
    }

    fn statuses(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Vec<(user::Sub, bool)> {
        let mut seen = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            if let Payload::Frame(OutboundFrame::UserStatus {
                user_id, is_online, ..
            }) = payload
            {
                seen.push((user_id, is_online));
            }
        }
        seen
    }

    #[tokio::test]
    async fn should_send_error_frame_to_sender_when_persistence_fails() {
        let f = fixture(Arc::new(UnavailableMessageRepository));
        let (sender_id, mut sender_rx) = connect(&f, "u1", "p1").await;
        let (_other_id, mut other_rx) = connect(&f, "u2", "p1").await;

        let raw = r#"{"type":"chat","message":"hi","recipient":"u2","timestamp":"2026-08-28T10:00:00Z"}"#;
        handle_text_frame(
            &sender_id,
            raw,
            &f.hub,
            &f.presence_service,
            &f.message_service,
        )
        .await;

        assert_eq!(error_frames(&mut sender_rx).len(), 1);
        // nothing was broadcast: no chat, no error, no status
        assert!(other_rx.try_recv().is_err());
        assert!(f.hub.info(&sender_id).await.is_some());
    }

    #[tokio::test]
    async fn should_answer_malformed_frame_without_dropping_connection() {
        let f = fixture(Arc::new(InMemoryMessageRepository::new()));
        let (conn_id, mut rx) = connect(&f, "u1", "p1").await;

        handle_text_frame(
            &conn_id,
            "not json",
            &f.hub,
            &f.presence_service,
            &f.message_service,
        )
        .await;

        assert_eq!(
            error_frames(&mut rx),
            vec!["invalid message format".to_owned()]
        );
        assert!(f.hub.info(&conn_id).await.is_some());
    }

    #[tokio::test]
    async fn should_ack_ping_and_refresh_status_on_heartbeat_frame() {
        let f = fixture(Arc::new(InMemoryMessageRepository::new()));
        let (conn_id, mut rx) = connect(&f, "u1", "p1").await;
        f.presence_service.connected(&user::Sub("u1".into())).await;
        statuses(&mut rx);

        // challenge the connection so only an ack keeps it alive
        assert!(f.hub.sweep_stale().await.is_empty());

        let raw = r#"{"type":"heartbeat","timestamp":"2026-08-28T10:00:00Z"}"#;
        handle_text_frame(
            &conn_id,
            raw,
            &f.hub,
            &f.presence_service,
            &f.message_service,
        )
        .await;

        assert_eq!(statuses(&mut rx), vec![(user::Sub("u1".into()), true)]);
        assert!(f.hub.sweep_stale().await.is_empty());
        assert!(f.hub.info(&conn_id).await.is_some());
    }

    #[test]
    fn should_reject_handshake_with_untagged_error_payload() {
        let payload = rejection(crate::event::Error::MissingHandshakeParams);

        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            json!({ "error": "authentication and productId required" })
        );
    }

    #[test]
    fn should_accept_handshake_query_in_wire_format() {
        let params: HandshakeParams =
            serde_urlencoded::from_str("token=abc&productId=p42").unwrap();

        assert_eq!(params.token.as_deref(), Some("abc"));
        assert_eq!(params.product_id, Some(product::Id("p42".into())));
    }

    #[test]
    fn should_tolerate_missing_handshake_params() {
        let params: HandshakeParams = serde_urlencoded::from_str("").unwrap();

        assert!(params.token.is_none());
        assert!(params.product_id.is_none());
    }
}
