//! The experiment WebSocket.
//!
//! Each socket gets a `ConnectionId` and an outbound channel drained
//! by a writer task; inbound frames are parsed and cast into the
//! session actor. Malformed frames are logged and skipped — the
//! connection stays open and no session state changes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use ractor::ActorRef;
use shared_types::{ClientMessage, ParticipantId};
use tokio::sync::mpsc;

use crate::actors::session::SessionMsg;
use crate::api::ApiState;
use crate::registry::ConnectionId;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.session))
}

async fn handle_socket(socket: WebSocket, session: ActorRef<SessionMsg>) {
    let connection = ConnectionId::new();
    tracing::info!(%connection, "websocket established");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    if session
        .cast(SessionMsg::Attach {
            connection,
            sender: tx.clone(),
        })
        .is_err()
    {
        tracing::warn!(%connection, "session actor gone; closing socket");
        writer.abort();
        return;
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Connect(id)) => {
                    let participant_id = if id.is_empty() {
                        None
                    } else {
                        Some(ParticipantId(id))
                    };
                    let _ = session.cast(SessionMsg::Connect {
                        connection,
                        participant_id,
                    });
                }
                Ok(ClientMessage::SubmitDecision(message)) => {
                    let _ = session.cast(SessionMsg::Submit { message });
                }
                Err(e) => {
                    tracing::warn!(%connection, error = %e, "ignoring malformed frame");
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = session.cast(SessionMsg::Disconnect { connection });
    writer.abort();
    tracing::info!(%connection, "websocket closed");
}
