use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::{ClientInfo, Intent, Room, VideoState};

const LOG_TAG: &str = "[Lockstep Server]";

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    /// All active rooms: room_id -> Room
    pub rooms: Arc<DashMap<String, Room>>,
    /// All connected clients: client_id -> ClientInfo
    pub clients: Arc<DashMap<Uuid, ClientInfo>>,
    /// Room membership: room_id -> Vec<client_id>
    pub room_members: Arc<DashMap<String, Arc<RwLock<Vec<Uuid>>>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            clients: Arc::new(DashMap::new()),
            room_members: Arc::new(DashMap::new()),
        }
    }

    pub fn create_room(&self, host_id: Uuid) -> String {
        let room_id = self.generate_room_code();

        self.rooms.insert(room_id.clone(), Room::default());
        self.room_members
            .insert(room_id.clone(), Arc::new(RwLock::new(vec![host_id])));

        // Update client's room
        if let Some(mut client) = self.clients.get_mut(&host_id) {
            client.room_id = Some(room_id.clone());
        }

        tracing::info!("{LOG_TAG} Room {} created by client {}", room_id, host_id);
        room_id
    }

    /// Add the client to the room and hand back the room's last announced
    /// playback state so the joiner can catch up.
    pub async fn join_room(
        &self,
        client_id: Uuid,
        room_id: &str,
    ) -> Result<Option<VideoState>, String> {
        let snapshot = self
            .rooms
            .get(room_id)
            .map(|room| room.video_state.clone())
            .ok_or_else(|| "Room not found".to_string())?;

        // Add client to room members
        if let Some(members) = self.room_members.get(room_id) {
            let mut members = members.write().await;
            if !members.contains(&client_id) {
                members.push(client_id);
            }
        } else {
            return Err("Room not found".to_string());
        }

        // Update client's room
        if let Some(mut client) = self.clients.get_mut(&client_id) {
            client.room_id = Some(room_id.to_string());
        }

        tracing::info!("{LOG_TAG} Client {} joined room {}", client_id, room_id);
        Ok(snapshot)
    }

    pub async fn leave_room(&self, client_id: Uuid) -> Option<String> {
        // Get client's current room
        let room_id = self.clients.get(&client_id).and_then(|c| c.room_id.clone());

        if let Some(room_id) = room_id.clone() {
            // Remove from room members
            if let Some(members) = self.room_members.get(&room_id) {
                let mut members = members.write().await;
                members.retain(|id| *id != client_id);

                // If room is empty, clean it up
                if members.is_empty() {
                    drop(members);
                    self.room_members.remove(&room_id);
                    self.rooms.remove(&room_id);
                    tracing::info!("{LOG_TAG} Room {} deleted (empty)", room_id);
                    return Some(room_id);
                }
            }

            // Clear client's room
            if let Some(mut client) = self.clients.get_mut(&client_id) {
                client.room_id = None;
            }

            tracing::info!("{LOG_TAG} Client {} left room {}", client_id, room_id);
            Some(room_id)
        } else {
            None
        }
    }

    pub async fn get_room_members(&self, room_id: &str) -> Vec<Uuid> {
        if let Some(members_ref) = self.room_members.get(room_id) {
            let members_lock = Arc::clone(&*members_ref);
            drop(members_ref);
            let members = members_lock.read().await;
            members.clone()
        } else {
            Vec::new()
        }
    }

    pub fn add_client(&self, client_id: Uuid) {
        self.clients.insert(client_id, ClientInfo { room_id: None });
        tracing::info!("{LOG_TAG} Client {} connected", client_id);
    }

    pub async fn remove_client(&self, client_id: Uuid) {
        let _ = self.leave_room(client_id).await;
        self.clients.remove(&client_id);
        tracing::info!("{LOG_TAG} Client {} disconnected", client_id);
    }

    pub fn client_room(&self, client_id: Uuid) -> Option<String> {
        self.clients.get(&client_id).and_then(|c| c.room_id.clone())
    }

    /// A newly announced video starts the shared timeline over from zero.
    pub fn record_video_change(&self, room_id: &str, video_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.video_state = Some(VideoState {
                video_id: video_id.to_string(),
                position: 0.0,
                intent: Intent::Play,
            });
        }
    }

    pub fn record_video_update(&self, room_id: &str, state: VideoState) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.video_state = Some(state);
        }
    }

    fn generate_room_code(&self) -> String {
        loop {
            let raw = (Uuid::new_v4().as_u128() % 1_000_000) as u32;
            let code = format!("{:03}-{:03}", raw / 1000, raw % 1000);
            if !self.rooms.contains_key(&code) {
                break code;
            }
        }
    }
}
