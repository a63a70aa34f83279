use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    middleware::auth_context::AuthContext,
    models::AppState,
    notifications::realtime::Addressed,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    auth: AuthContext,
) -> impl IntoResponse {
    // subscribe before the upgrade so nothing published in between is lost
    let rx = state.realtime.subscribe();
    info!(user_id = %auth.user_id, "realtime session opened");
    ws.on_upgrade(move |socket| forward_events(socket, rx, auth.user_id))
}

/// JSON frame for `user_id`, or `None` when the event is addressed elsewhere.
fn frame_for(user_id: Uuid, msg: &Addressed) -> Option<String> {
    if msg.user_id != user_id {
        return None;
    }
    serde_json::to_string(&msg.event).ok()
}

async fn forward_events(socket: WebSocket, mut rx: broadcast::Receiver<Addressed>, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            published = rx.recv() => match published {
                Ok(msg) => {
                    let Some(frame) = frame_for(user_id, &msg) else { continue };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(%user_id, skipped, "realtime session lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = sink.close().await;
    debug!(%user_id, "realtime session closed");
}
