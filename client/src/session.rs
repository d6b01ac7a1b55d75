use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SyncError;
use crate::guard::EchoGuard;
use crate::playback::{Outbound, Phase, PlaybackSession, PlaybackState};
use crate::player::{PlayerSurface, SurfaceEvent};
use crate::protocol::{Intent, Message};
use crate::throttle::SyncThrottle;
use crate::video::VideoId;

/// Binds the playback state machine to a room identity and to the two
/// external collaborators: inbound transport messages and player surface
/// callbacks come in, player commands and outbound wire messages go out.
/// Owns no playback logic itself.
pub struct SessionBinder<S: PlayerSurface> {
    client_id: Option<Uuid>,
    room: Option<String>,
    guard: EchoGuard,
    throttle: SyncThrottle,
    playback: PlaybackSession<S>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl<S: PlayerSurface> SessionBinder<S> {
    pub fn new(playback: PlaybackSession<S>, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            client_id: None,
            room: None,
            guard: EchoGuard::new(),
            throttle: SyncThrottle::new(),
            playback,
            outbound,
        }
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    pub fn state(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn phase(&self) -> Phase {
        self.playback.phase()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.playback.duration_secs()
    }

    pub fn create_room(&self) {
        self.send(Message::CreateRoom);
    }

    pub fn join_room(&self, room_id: String) {
        self.send(Message::JoinRoom { room_id });
    }

    /// Leave the room and tear the session down in one step: binding, the
    /// pending video slot, and every armed window go together, so nothing
    /// stale can fire against a later binding.
    pub fn leave(&mut self) {
        if self.room.is_some() {
            self.send(Message::LeaveRoom);
        }
        self.client_id = None;
        self.room = None;
        self.guard.clear();
        self.throttle.clear();
        self.playback.reset();
    }

    /// User picked a video for the room.
    pub fn select_video(&mut self, video: VideoId, now: Instant) -> Result<(), SyncError> {
        if self.room.is_none() {
            tracing::warn!("Not in a room; create or join one before selecting a video");
            return Ok(());
        }
        self.guard.begin_local_action(now);
        let outbound = self.playback.select_video(video)?;
        self.send_outbound(outbound);
        Ok(())
    }

    /// User pressed play/pause. The surface callback this produces is what
    /// gets reported to the room.
    pub fn request_intent(&mut self, intent: Intent) -> Result<(), SyncError> {
        self.playback.request_intent(intent)
    }

    /// User dragged the progress control.
    pub fn seek(&mut self, target_secs: f64, now: Instant) -> Result<(), SyncError> {
        self.guard.begin_local_action(now);
        if let Some(outbound) = self.playback.local_seek(target_secs, now)? {
            self.send_outbound(outbound);
        }
        Ok(())
    }

    pub fn handle_server_message(&mut self, msg: Message, now: Instant) -> Result<(), SyncError> {
        match msg {
            Message::RoomCreated { room_id, client_id } => {
                tracing::info!("Room created: {}", room_id);
                self.room = Some(room_id);
                self.client_id = Some(client_id);
            }

            Message::RoomJoined {
                room_id,
                client_id,
                video_state,
            } => {
                tracing::info!("Joined room: {}", room_id);
                self.room = Some(room_id);
                self.client_id = Some(client_id);

                // One-time catch-up: exempt from the throttle.
                if let Some(vs) = video_state {
                    if !is_valid_position(vs.position) {
                        tracing::warn!("Dropping join snapshot with bad position {}", vs.position);
                        return Ok(());
                    }
                    self.playback
                        .join_snapshot(vs.video_id, vs.position, vs.intent, now)?;
                }
            }

            Message::RoomLeft => {
                tracing::info!("Left room");
            }

            Message::RoomError { message } => {
                return Err(SyncError::Room(message));
            }

            Message::SyncVideo {
                video_id,
                position,
                intent,
                from_client,
            } => {
                let Some(room) = self.room.clone() else {
                    return Err(SyncError::StaleMessage(format!(
                        "sync for {} while not in a room",
                        video_id
                    )));
                };
                if self.client_id == Some(from_client) {
                    tracing::debug!("Discarding our own sync echo in room {}", room);
                    return Ok(());
                }
                if !is_valid_position(position) {
                    tracing::warn!("Dropping sync event with bad position {}", position);
                    return Ok(());
                }

                // Suppression first: cheaper and more decisive than the
                // throttle, and it must not consume a throttle slot.
                if self.guard.is_suppressed(now) {
                    tracing::debug!("Inside own settle window, discarding sync event");
                    return Ok(());
                }
                if !self.throttle.try_acquire(now) {
                    tracing::debug!("Sync apply cool-down active, discarding event");
                    return Ok(());
                }

                self.playback.apply_remote(video_id, position, intent, now)?;
            }

            other => {
                tracing::warn!("Unexpected message from server: {:?}", other);
            }
        }
        Ok(())
    }

    pub fn handle_surface_event(&mut self, event: SurfaceEvent, now: Instant) -> Result<(), SyncError> {
        match event {
            SurfaceEvent::Ready { duration_secs } => {
                self.playback.surface_ready(duration_secs, now)?;
            }
            SurfaceEvent::Playing => self.relay_intent(Intent::Play, now),
            SurfaceEvent::Paused | SurfaceEvent::Ended => self.relay_intent(Intent::Pause, now),
            SurfaceEvent::Error { reason } => {
                return Err(SyncError::PlaybackSurface(reason));
            }
        }
        Ok(())
    }

    /// Drain pending surface callbacks and feed them through the binder.
    pub fn pump_surface(&mut self, now: Instant) -> Result<(), SyncError> {
        let events = self.playback.surface_mut().poll_events();
        for event in events {
            self.handle_surface_event(event, now)?;
        }
        Ok(())
    }

    /// Progress-poll tick.
    pub fn poll_progress(&mut self) {
        self.playback.tick_progress();
    }

    fn relay_intent(&mut self, intent: Intent, now: Instant) {
        if self.guard.is_suppressed(now) {
            tracing::debug!("Surface callback inside settle window, not re-reporting");
            return;
        }
        if let Some(outbound) = self.playback.surface_intent(intent, now) {
            self.send_outbound(outbound);
        }
    }

    fn send_outbound(&self, outbound: Outbound) {
        let Some(room_id) = self.room.clone() else {
            tracing::debug!("No room bound, dropping outbound event");
            return;
        };
        let msg = match outbound {
            Outbound::ChangeVideo { video } => Message::ChangeVideo {
                room_id,
                video_id: video,
            },
            Outbound::UpdateVideo {
                video,
                position_secs,
                intent,
            } => Message::UpdateVideo {
                room_id,
                video_id: video,
                position: position_secs,
                intent,
            },
        };
        self.send(msg);
    }

    fn send(&self, msg: Message) {
        if self.outbound.send(msg).is_err() {
            tracing::warn!("Outbound channel closed, dropping message");
        }
    }
}

fn is_valid_position(position: f64) -> bool {
    position.is_finite() && position >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::{Command, RecordingSurface};
    use crate::protocol::VideoState;
    use std::time::Duration;

    fn binder() -> (
        SessionBinder<RecordingSurface>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let binder = SessionBinder::new(PlaybackSession::new(RecordingSurface::new()), tx);
        (binder, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn commands(binder: &mut SessionBinder<RecordingSurface>) -> &mut Vec<Command> {
        &mut binder.playback.surface_mut().commands
    }

    /// Room bound, surface ready with "v1" loaded and playing; all windows
    /// from setup already elapsed relative to the returned instant.
    fn active_binder(
        base: Instant,
    ) -> (
        SessionBinder<RecordingSurface>,
        mpsc::UnboundedReceiver<Message>,
        Uuid,
        Instant,
    ) {
        let (mut binder, mut rx) = binder();
        let me = Uuid::new_v4();
        binder
            .handle_server_message(
                Message::RoomCreated {
                    room_id: "123-456".to_string(),
                    client_id: me,
                },
                base,
            )
            .unwrap();
        binder.select_video(VideoId::new("v1"), base).unwrap();
        binder
            .handle_surface_event(
                SurfaceEvent::Ready {
                    duration_secs: 100.0,
                },
                base,
            )
            .unwrap();
        drain(&mut rx);
        commands(&mut binder).clear();
        (binder, rx, me, base + Duration::from_secs(2))
    }

    #[test]
    fn test_room_binding_from_server_messages() {
        let (mut binder, _rx) = binder();
        let id = Uuid::new_v4();
        binder
            .handle_server_message(
                Message::RoomCreated {
                    room_id: "123-456".to_string(),
                    client_id: id,
                },
                Instant::now(),
            )
            .unwrap();
        assert_eq!(binder.room(), Some("123-456"));
        assert_eq!(binder.client_id(), Some(id));
    }

    #[test]
    fn test_room_error_is_surfaced_and_session_stays_prejoin() {
        let (mut binder, _rx) = binder();
        let err = binder
            .handle_server_message(
                Message::RoomError {
                    message: "Room not found".to_string(),
                },
                Instant::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Room(_)));
        assert!(binder.room().is_none());
    }

    #[test]
    fn test_sync_without_room_is_discarded_as_stale() {
        let (mut binder, mut rx) = binder();
        let err = binder
            .handle_server_message(
                Message::SyncVideo {
                    video_id: VideoId::new("v1"),
                    position: 10.0,
                    intent: Intent::Play,
                    from_client: Uuid::new_v4(),
                },
                Instant::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleMessage(_)));
        assert!(commands(&mut binder).is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_own_echo_is_discarded() {
        let base = Instant::now();
        let (mut binder, mut rx, me, now) = active_binder(base);

        binder
            .handle_server_message(
                Message::SyncVideo {
                    video_id: VideoId::new("v1"),
                    position: 50.0,
                    intent: Intent::Play,
                    from_client: me,
                },
                now,
            )
            .unwrap();
        assert!(commands(&mut binder).is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_malformed_position_is_rejected() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            binder
                .handle_server_message(
                    Message::SyncVideo {
                        video_id: VideoId::new("v1"),
                        position: bad,
                        intent: Intent::Play,
                        from_client: Uuid::new_v4(),
                    },
                    now,
                )
                .unwrap();
        }
        assert!(commands(&mut binder).is_empty());
    }

    #[test]
    fn test_throttle_applies_one_of_a_burst() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);
        let peer = Uuid::new_v4();

        // Five events inside one 500 ms window, drifting further each time.
        for i in 0..5u64 {
            binder
                .handle_server_message(
                    Message::SyncVideo {
                        video_id: VideoId::new("v1"),
                        position: 50.0 + i as f64,
                        intent: Intent::Play,
                        from_client: peer,
                    },
                    now + Duration::from_millis(i * 90),
                )
                .unwrap();
        }
        assert_eq!(commands(&mut binder).as_slice(), &[Command::Seek(50.0)]);
    }

    #[test]
    fn test_second_identical_event_is_noop() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);
        let peer = Uuid::new_v4();
        let event = Message::SyncVideo {
            video_id: VideoId::new("v1"),
            position: 50.0,
            intent: Intent::Pause,
            from_client: peer,
        };

        binder.handle_server_message(event.clone(), now).unwrap();
        let position = binder.state().position_secs;
        let playing = binder.state().playing;

        binder
            .handle_server_message(event, now + Duration::from_millis(10))
            .unwrap();
        assert_eq!(binder.state().position_secs, position);
        assert_eq!(binder.state().playing, playing);
        assert_eq!(
            commands(&mut binder).as_slice(),
            &[Command::Seek(50.0), Command::Pause]
        );
    }

    #[test]
    fn test_local_seek_echo_is_not_rebroadcast() {
        let base = Instant::now();
        let (mut binder, mut rx, _me, now) = active_binder(base);

        binder.seek(42.0, now).unwrap();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Message::UpdateVideo { position, .. } if position == 42.0));

        // The surface reports the seek back within the settle window.
        binder
            .handle_surface_event(SurfaceEvent::Playing, now + Duration::from_millis(200))
            .unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_inbound_during_own_settle_window_is_discarded() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);

        binder.seek(42.0, now).unwrap();
        commands(&mut binder).clear();

        binder
            .handle_server_message(
                Message::SyncVideo {
                    video_id: VideoId::new("v1"),
                    position: 42.0,
                    intent: Intent::Play,
                    from_client: Uuid::new_v4(),
                },
                now + Duration::from_millis(300),
            )
            .unwrap();
        assert!(commands(&mut binder).is_empty());
    }

    #[test]
    fn test_genuine_surface_pause_is_reported() {
        let base = Instant::now();
        let (mut binder, mut rx, _me, now) = active_binder(base);

        binder.handle_surface_event(SurfaceEvent::Paused, now).unwrap();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0],
            Message::UpdateVideo {
                intent: Intent::Pause,
                ..
            }
        ));
    }

    #[test]
    fn test_late_join_snapshot_applied_after_ready() {
        let (mut binder, mut rx) = binder();
        let now = Instant::now();

        binder
            .handle_server_message(
                Message::RoomJoined {
                    room_id: "123-456".to_string(),
                    client_id: Uuid::new_v4(),
                    video_state: Some(VideoState {
                        video_id: VideoId::new("v1"),
                        position: 42.0,
                        intent: Intent::Play,
                    }),
                },
                now,
            )
            .unwrap();
        assert!(commands(&mut binder).is_empty());

        binder
            .handle_surface_event(
                SurfaceEvent::Ready {
                    duration_secs: 100.0,
                },
                now,
            )
            .unwrap();
        assert_eq!(
            commands(&mut binder).as_slice(),
            &[Command::Load(VideoId::new("v1"), 42.0), Command::Play]
        );
        // Catch-up is applied, never re-announced.
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_join_snapshot_is_exempt_from_throttle() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);
        let peer = Uuid::new_v4();

        // Burn the throttle slot.
        binder
            .handle_server_message(
                Message::SyncVideo {
                    video_id: VideoId::new("v1"),
                    position: 50.0,
                    intent: Intent::Play,
                    from_client: peer,
                },
                now,
            )
            .unwrap();
        commands(&mut binder).clear();

        // A rejoin snapshot right after must still apply in full.
        binder
            .handle_server_message(
                Message::RoomJoined {
                    room_id: "123-456".to_string(),
                    client_id: Uuid::new_v4(),
                    video_state: Some(VideoState {
                        video_id: VideoId::new("v2"),
                        position: 10.0,
                        intent: Intent::Pause,
                    }),
                },
                now + Duration::from_millis(50),
            )
            .unwrap();
        assert_eq!(
            commands(&mut binder).as_slice(),
            &[Command::Load(VideoId::new("v2"), 10.0)]
        );
    }

    #[test]
    fn test_surface_error_is_nonfatal_and_reported() {
        let base = Instant::now();
        let (mut binder, _rx, _me, now) = active_binder(base);
        let video = binder.state().video.clone();

        let err = binder
            .handle_surface_event(
                SurfaceEvent::Error {
                    reason: "media failed to load".to_string(),
                },
                now,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::PlaybackSurface(_)));
        assert_eq!(binder.state().video, video);
        assert_eq!(binder.phase(), Phase::Ready);
    }

    #[test]
    fn test_teardown_silences_every_pending_window() {
        let base = Instant::now();
        let (mut binder, mut rx, _me, now) = active_binder(base);

        // Arm both windows, then leave.
        binder.seek(42.0, now).unwrap();
        binder.leave();
        drain(&mut rx);
        let baseline = commands(&mut binder).len();

        // Advance virtual time well past every pending delay and fire
        // everything that could still be queued.
        let later = now + Duration::from_secs(10);
        let stale = binder.handle_server_message(
            Message::SyncVideo {
                video_id: VideoId::new("v1"),
                position: 99.0,
                intent: Intent::Play,
                from_client: Uuid::new_v4(),
            },
            later,
        );
        assert!(matches!(stale, Err(SyncError::StaleMessage(_))));
        binder
            .handle_surface_event(SurfaceEvent::Playing, later)
            .unwrap();
        binder.poll_progress();

        assert_eq!(commands(&mut binder).len(), baseline);
        assert!(drain(&mut rx).is_empty());
        assert!(binder.room().is_none());
        assert_eq!(binder.phase(), Phase::Empty);
    }
}
