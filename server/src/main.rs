use axum::{
    extract::{
        ws::{Message as AxumWsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

mod protocol;
mod state;

use protocol::{Intent, Message, VideoState};
use state::ServerState;

type ClientSender = mpsc::UnboundedSender<Message>;
type ClientSenders = Arc<RwLock<HashMap<Uuid, ClientSender>>>;

#[derive(Clone)]
struct AppState {
    server_state: ServerState,
    client_senders: ClientSenders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockstep_server=debug,info".into()),
        )
        .init();

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(3005);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app_state = AppState {
        server_state: ServerState::new(),
        client_senders: Arc::new(RwLock::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/ws", get(ws_endpoint))
        .with_state(app_state.clone());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Lockstep Server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_endpoint(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let server_state = state.server_state.clone();
    let client_senders = state.client_senders.clone();
    let client_id = Uuid::new_v4();
    server_state.add_client(client_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Register client sender
    client_senders.write().await.insert(client_id, tx.clone());

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(AxumWsMessage::Text(json)).await {
                tracing::error!("Failed to send message: {}", e);
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(AxumWsMessage::Text(text)) => {
                if let Err(e) =
                    handle_message(&text, client_id, &server_state, &client_senders).await
                {
                    tracing::error!("Error handling message: {}", e);
                    let _ = tx.send(Message::RoomError {
                        message: e.to_string(),
                    });
                }
            }
            Ok(AxumWsMessage::Close(_)) => {
                tracing::info!("Client {} closing connection", client_id);
                break;
            }
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    client_senders.write().await.remove(&client_id);
    server_state.remove_client(client_id).await;
    send_task.abort();
}

async fn handle_message(
    text: &str,
    client_id: Uuid,
    state: &ServerState,
    client_senders: &ClientSenders,
) -> anyhow::Result<()> {
    let msg: Message = serde_json::from_str(text)?;

    match msg {
        Message::CreateRoom => {
            let room_id = state.create_room(client_id);
            if let Some(tx) = client_senders.read().await.get(&client_id) {
                let _ = tx.send(Message::RoomCreated { room_id, client_id });
            }
        }

        Message::JoinRoom { room_id } => {
            let response = match state.join_room(client_id, &room_id).await {
                Ok(video_state) => Message::RoomJoined {
                    room_id: room_id.clone(),
                    client_id,
                    video_state,
                },
                Err(message) => Message::RoomError { message },
            };

            if let Some(tx) = client_senders.read().await.get(&client_id) {
                let _ = tx.send(response);
            }
        }

        Message::LeaveRoom => {
            state.leave_room(client_id).await;
            if let Some(tx) = client_senders.read().await.get(&client_id) {
                let _ = tx.send(Message::RoomLeft);
            }
        }

        Message::ChangeVideo { room_id, video_id } => {
            if state.client_room(client_id).as_deref() != Some(room_id.as_str()) {
                tracing::warn!(
                    "Client {} announced a video for room {} it is not in",
                    client_id,
                    room_id
                );
                return Ok(());
            }

            state.record_video_change(&room_id, &video_id);
            broadcast_to_room(
                state,
                client_senders,
                &room_id,
                client_id,
                VideoState {
                    video_id,
                    position: 0.0,
                    intent: Intent::Play,
                },
            )
            .await;
        }

        Message::UpdateVideo {
            room_id,
            video_id,
            position,
            intent,
        } => {
            if state.client_room(client_id).as_deref() != Some(room_id.as_str()) {
                tracing::warn!(
                    "Client {} reported playback for room {} it is not in",
                    client_id,
                    room_id
                );
                return Ok(());
            }

            let video_state = VideoState {
                video_id,
                position,
                intent,
            };
            state.record_video_update(&room_id, video_state.clone());
            broadcast_to_room(state, client_senders, &room_id, client_id, video_state).await;
        }

        _ => {
            tracing::warn!("Unexpected message from client: {:?}", msg);
        }
    }

    Ok(())
}

/// Relay a sync event to every room member. The originator is included; each
/// client recognizes and discards its own echo.
async fn broadcast_to_room(
    state: &ServerState,
    client_senders: &ClientSenders,
    room_id: &str,
    from_client: Uuid,
    video_state: VideoState,
) {
    let members = state.get_room_members(room_id).await;
    let senders = client_senders.read().await;

    tracing::debug!(
        "Broadcasting {:?} from {} to {} members in room {}",
        video_state,
        from_client,
        members.len(),
        room_id
    );

    let broadcast_msg = Message::SyncVideo {
        video_id: video_state.video_id,
        position: video_state.position,
        intent: video_state.intent,
        from_client,
    };

    for member_id in members {
        if let Some(tx) = senders.get(&member_id) {
            let _ = tx.send(broadcast_msg.clone());
        }
    }
}
