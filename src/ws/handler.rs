//! WebSocket upgrade handler and per-connection session loop.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::room::{CreateRoomParams, RoomCommand, RoomHandle};
use crate::game::world::WorldId;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection. The connection stays unbound
/// until a successful createRoom/joinRoom, after which every message is
/// forwarded to the owning room task.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn = %conn_id, "new WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(256);

    // Writer task: room messages -> WebSocket.
    let writer_conn = conn_id;
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        debug!(conn = %writer_conn, "WebSocket send failed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(conn = %writer_conn, error = %e, "failed to encode message");
                }
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new();
    let mut binding: Option<(String, RoomHandle)> = None;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn = %conn_id, "rate limited message");
                    continue;
                }
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(conn = %conn_id, error = %e, "unparseable client message");
                        continue;
                    }
                };
                handle_message(conn_id, msg, &state, &out_tx, &mut binding).await;
            }
            Ok(Message::Close(_)) => {
                info!(conn = %conn_id, "client initiated close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the room; the grace timer owns removal from here.
    if let Some((player_id, handle)) = binding {
        let _ = handle
            .cmd_tx
            .send(RoomCommand::Disconnect { conn_id, player_id })
            .await;
    }
    writer.abort();

    info!(conn = %conn_id, "WebSocket connection closed");
}

async fn handle_message(
    conn_id: Uuid,
    msg: ClientMsg,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
    binding: &mut Option<(String, RoomHandle)>,
) {
    match msg {
        ClientMsg::CreateRoom {
            room_code,
            max_players,
            host_id,
            player_name,
            world,
            level,
            canvas_height,
        } if binding.is_none() => {
            let world = WorldId::normalize(&ClientMsg::level_value(&level, &world));
            let params = CreateRoomParams {
                room_code,
                max_players,
                host_id: host_id.clone(),
                player_name,
                world,
                canvas_height,
            };
            match state.rooms.create_room(params, conn_id, out_tx.clone()) {
                Ok(handle) => *binding = Some((host_id, handle)),
                Err(message) => {
                    let _ = out_tx.send(ServerMsg::CreateDenied { message }).await;
                }
            }
        }

        ClientMsg::JoinRoom {
            room_code,
            player_id,
            name,
        } if binding.is_none() => {
            let code = room_code.trim().to_ascii_uppercase();
            let Some(handle) = state.rooms.get(&code) else {
                let _ = out_tx
                    .send(ServerMsg::JoinDenied {
                        message: "Room not found".to_string(),
                    })
                    .await;
                return;
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            let sent = handle
                .cmd_tx
                .send(RoomCommand::Join {
                    player_id: player_id.clone(),
                    name,
                    conn_id,
                    tx: out_tx.clone(),
                    reply: reply_tx,
                })
                .await;

            // The room can close between lookup and join.
            let denied = |message: String| ServerMsg::JoinDenied { message };
            if sent.is_err() {
                let _ = out_tx.send(denied("Room not found".to_string())).await;
                return;
            }
            match reply_rx.await {
                Ok(Ok(())) => *binding = Some((player_id, handle)),
                Ok(Err(message)) => {
                    let _ = out_tx.send(denied(message)).await;
                }
                Err(_) => {
                    let _ = out_tx.send(denied("Room not found".to_string())).await;
                }
            }
        }

        other => {
            if let Some((player_id, handle)) = binding {
                let _ = handle
                    .cmd_tx
                    .send(RoomCommand::Client {
                        conn_id,
                        player_id: player_id.clone(),
                        msg: other,
                    })
                    .await;
            } else {
                debug!(conn = %conn_id, "command before joining a room ignored");
            }
        }
    }
}
