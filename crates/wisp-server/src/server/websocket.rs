//! Relay WebSocket endpoint
//!
//! Each upgraded socket is split in two. The reader feeds a relay session;
//! a writer task drains the connection's outbound queue into the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{future, stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wisp_relay::{InboundFrame, OutboundFrame, TransportError, WalletId};

use super::AppState;

/// How long the writer gets to flush queued frames after the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(relay_websocket_handler))
        .route("/ws", get(relay_websocket_handler))
        .with_state(state)
}

/// GET / and GET /ws
///
/// Upgrades the HTTP connection and hands the socket to a relay session.
async fn relay_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("Relay WebSocket connection request");

    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| handle_relay_websocket(socket, state))
}

async fn handle_relay_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    let (session, outbound) = state.relay.connect();
    let conn = session.handle().id();
    info!(conn = %conn, "Client connected");

    let mut writer = tokio::spawn(write_outbound(sink, outbound));

    let inbound = stream
        .take_until(state.shutdown.clone().cancelled_owned())
        .filter_map(|msg| future::ready(translate(msg)));

    let summary = session.run(inbound).await;

    // Termination queued a close frame; give the writer a chance to send it
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        warn!(conn = %conn, "Writer did not drain in time, aborting");
        writer.abort();
    }

    info!(
        conn = %conn,
        identity = summary.identity.as_ref().map(WalletId::as_str).unwrap_or("-"),
        frames = summary.frames_received,
        routed = summary.frames_routed,
        "Client disconnected"
    );
}

/// Map an axum message onto the relay's frame model.
///
/// Pongs carry nothing the relay acts on and are filtered out.
fn translate(
    msg: Result<Message, axum::Error>,
) -> Option<Result<InboundFrame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(InboundFrame::Binary(data))),
        Ok(Message::Ping(data)) => Some(Ok(InboundFrame::Ping(data))),
        Ok(Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Ok(InboundFrame::Close)),
        Err(e) => Some(Err(TransportError::new(e.to_string()))),
    }
}

/// Drain the outbound queue into the socket until the queue closes or a
/// write fails.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        let (msg, last) = match frame {
            OutboundFrame::Text(text) => (Message::Text(text), false),
            OutboundFrame::Pong(data) => (Message::Pong(data), false),
            OutboundFrame::Close => (Message::Close(None), true),
        };

        if let Err(e) = sink.send(msg).await {
            debug!(error = %e, "Failed to write WebSocket frame");
            break;
        }
        if last {
            break;
        }
    }

    // Dropping the receiver marks the handle closed for the sweeper
    drop(outbound);
    let _ = sink.close().await;
}
