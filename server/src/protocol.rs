use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent between client and server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    // Client -> Server
    CreateRoom,
    JoinRoom {
        room_id: String,
    },
    LeaveRoom,
    ChangeVideo {
        room_id: String,
        video_id: String,
    },
    UpdateVideo {
        room_id: String,
        video_id: String,
        position: f64,
        intent: Intent,
    },

    // Server -> Client
    RoomCreated {
        room_id: String,
        client_id: Uuid,
    },
    RoomJoined {
        room_id: String,
        client_id: Uuid,
        video_state: Option<VideoState>,
    },
    RoomLeft,
    RoomError {
        message: String,
    },
    SyncVideo {
        video_id: String,
        position: f64,
        intent: Intent,
        from_client: Uuid,
    },
}

/// Desired playback mode carried by sync events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Play,
    Pause,
}

/// Last announced playback state, kept per room for late joiners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoState {
    pub video_id: String,
    pub position: f64,
    pub intent: Intent,
}

/// Room state tracked by server
#[derive(Debug, Clone, Default)]
pub struct Room {
    pub video_state: Option<VideoState>,
}

/// Client connection metadata
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub room_id: Option<String>,
}
