use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::video::VideoId;

/// Messages sent between client and server (must match server protocol)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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
        video_id: VideoId,
    },
    UpdateVideo {
        room_id: String,
        video_id: VideoId,
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
        video_id: VideoId,
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

/// Playback snapshot delivered to late joiners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoState {
    pub video_id: VideoId,
    pub position: f64,
    pub intent: Intent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_match_protocol_names() {
        let json = serde_json::to_string(&Message::CreateRoom).unwrap();
        assert_eq!(json, r#"{"type":"create_room"}"#);

        let json = serde_json::to_string(&Message::UpdateVideo {
            room_id: "123-456".to_string(),
            video_id: VideoId::new("abc"),
            position: 7.5,
            intent: Intent::Pause,
        })
        .unwrap();
        assert!(json.contains(r#""type":"update_video""#));
        assert!(json.contains(r#""intent":"pause""#));
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let malformed = r#"{"type":"sync_video","payload":{"video_id":"abc"}}"#;
        assert!(serde_json::from_str::<Message>(malformed).is_err());

        let unknown = r#"{"type":"room_exploded","payload":{}}"#;
        assert!(serde_json::from_str::<Message>(unknown).is_err());
    }

    #[test]
    fn test_sync_video_round_trip() {
        let msg = Message::SyncVideo {
            video_id: VideoId::new("dQw4w9WgXcQ"),
            position: 42.0,
            intent: Intent::Play,
            from_client: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
