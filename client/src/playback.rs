use std::time::{Duration, Instant};

use crate::drift::{should_correct, should_load_new_video};
use crate::error::SyncError;
use crate::player::PlayerSurface;
use crate::protocol::Intent;
use crate::video::VideoId;

/// Surface callbacks arriving this soon after a remote application are the
/// echo of that application, not new local input, and are not re-reported.
pub const REMOTE_APPLY_WINDOW: Duration = Duration::from_millis(500);

/// Authoritative local view of the shared room timeline. One instance per
/// client, owned by the state machine and mutated only through transitions.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub video: Option<VideoId>,
    pub position_secs: f64,
    pub playing: bool,
    pub last_applied_at: Option<Instant>,
}

/// Where the session stands relative to the player surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No video selected
    Empty,
    /// Video identity known, surface not yet initialized
    AwaitingSurface,
    /// Surface initialized; play/pause tracked in `PlaybackState::playing`
    Ready,
}

/// One-slot queue for a sync snapshot that arrived before the surface was
/// ready. A newer snapshot overwrites an older one.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSync {
    pub video: VideoId,
    pub position_secs: f64,
    pub intent: Intent,
}

/// Outbound side effect declared by a transition. The binder turns it into
/// exactly one wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ChangeVideo {
        video: VideoId,
    },
    UpdateVideo {
        video: VideoId,
        position_secs: f64,
        intent: Intent,
    },
}

/// The playback state machine: reconciles the local player surface against
/// the shared room timeline and declares the outbound events its transitions
/// produce.
pub struct PlaybackSession<S: PlayerSurface> {
    surface: S,
    state: PlaybackState,
    phase: Phase,
    pending: Option<PendingSync>,
    duration_secs: Option<f64>,
}

impl<S: PlayerSurface> PlaybackSession<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            state: PlaybackState::default(),
            phase: Phase::Empty,
            pending: None,
            duration_secs: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs.or_else(|| self.surface.duration().ok())
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// User picked a video. Loads it (or queues it for an uninitialized
    /// surface) and declares the room-wide announcement.
    pub fn select_video(&mut self, video: VideoId) -> Result<Outbound, SyncError> {
        if self.phase == Phase::Ready {
            self.surface
                .load(&video, 0.0)
                .map_err(SyncError::PlaybackSurface)?;
            self.surface.play().map_err(SyncError::PlaybackSurface)?;
            self.state.video = Some(video.clone());
            self.state.position_secs = 0.0;
            self.state.playing = true;
        } else {
            self.pending = Some(PendingSync {
                video: video.clone(),
                position_secs: 0.0,
                intent: Intent::Play,
            });
            self.state.video = Some(video.clone());
            self.state.position_secs = 0.0;
            self.state.playing = false;
            self.phase = Phase::AwaitingSurface;
        }

        Ok(Outbound::ChangeVideo { video })
    }

    /// Surface finished initializing. Applies whatever snapshot was queued
    /// while it was not ready.
    pub fn surface_ready(&mut self, duration_secs: f64, now: Instant) -> Result<(), SyncError> {
        self.duration_secs = Some(duration_secs);
        self.phase = Phase::Ready;
        tracing::debug!("Player surface ready, duration {:.1}s", duration_secs);

        if let Some(snapshot) = self.pending.take() {
            self.apply_snapshot(snapshot, now)?;
        }
        Ok(())
    }

    /// Remote sync event, already past the binder's guard and throttle.
    pub fn apply_remote(
        &mut self,
        video: VideoId,
        position_secs: f64,
        intent: Intent,
        now: Instant,
    ) -> Result<(), SyncError> {
        if self.phase != Phase::Ready {
            tracing::debug!("Surface not ready, queuing {}", video);
            self.queue_snapshot(video, position_secs, intent);
            return Ok(());
        }

        let local_pos = self.surface.current_time().unwrap_or(self.state.position_secs);
        let loaded = self.surface.loaded_video();

        if should_load_new_video(loaded.as_ref(), &video) {
            self.apply_snapshot(
                PendingSync {
                    video,
                    position_secs,
                    intent,
                },
                now,
            )?;
        } else if should_correct(local_pos, position_secs) {
            tracing::debug!(
                "Correcting drift: local {:.1}s, remote {:.1}s",
                local_pos,
                position_secs
            );
            self.surface
                .seek(position_secs)
                .map_err(SyncError::PlaybackSurface)?;
            self.state.position_secs = position_secs;
            self.apply_intent(intent)?;
            self.state.last_applied_at = Some(now);
        } else {
            self.apply_intent(intent)?;
            self.state.last_applied_at = Some(now);
        }
        Ok(())
    }

    /// Late-join snapshot: always the full reload+seek+intent sequence,
    /// deferred until the surface reports ready.
    pub fn join_snapshot(
        &mut self,
        video: VideoId,
        position_secs: f64,
        intent: Intent,
        now: Instant,
    ) -> Result<(), SyncError> {
        if self.phase == Phase::Ready {
            self.apply_snapshot(
                PendingSync {
                    video,
                    position_secs,
                    intent,
                },
                now,
            )
        } else {
            self.queue_snapshot(video, position_secs, intent);
            Ok(())
        }
    }

    /// Surface reported a play/pause transition. Updates the authoritative
    /// state; declares an outbound report unless the transition is the echo
    /// of a recently applied remote event.
    pub fn surface_intent(&mut self, intent: Intent, now: Instant) -> Option<Outbound> {
        if let Ok(pos) = self.surface.current_time() {
            self.state.position_secs = pos;
        }
        self.state.playing = intent == Intent::Play;

        let video = self.state.video.clone()?;
        if self.within_remote_window(now) {
            return None;
        }
        Some(Outbound::UpdateVideo {
            video,
            position_secs: self.state.position_secs,
            intent,
        })
    }

    /// User dragged the progress control.
    pub fn local_seek(
        &mut self,
        target_secs: f64,
        now: Instant,
    ) -> Result<Option<Outbound>, SyncError> {
        let Some(video) = self.state.video.clone() else {
            return Ok(None);
        };

        self.surface
            .seek(target_secs)
            .map_err(SyncError::PlaybackSurface)?;
        self.state.position_secs = target_secs;

        if self.within_remote_window(now) {
            return Ok(None);
        }
        Ok(Some(Outbound::UpdateVideo {
            video,
            position_secs: target_secs,
            intent: if self.state.playing {
                Intent::Play
            } else {
                Intent::Pause
            },
        }))
    }

    /// User pressed play or pause. The resulting surface callback is what
    /// reports the transition outward.
    pub fn request_intent(&mut self, intent: Intent) -> Result<(), SyncError> {
        if self.state.video.is_none() {
            return Ok(());
        }
        self.apply_intent(intent)
    }

    /// Progress-poll tick: refresh the position from the surface clock.
    pub fn tick_progress(&mut self) {
        if self.phase == Phase::Ready && self.state.playing {
            if let Ok(pos) = self.surface.current_time() {
                self.state.position_secs = pos;
            }
        }
    }

    /// Back to `Empty`: clears the pending slot and all recorded windows.
    pub fn reset(&mut self) {
        if self.state.playing {
            let _ = self.surface.pause();
        }
        self.state = PlaybackState::default();
        self.pending = None;
        self.phase = Phase::Empty;
        self.duration_secs = None;
    }

    fn queue_snapshot(&mut self, video: VideoId, position_secs: f64, intent: Intent) {
        self.state.video = Some(video.clone());
        self.state.position_secs = position_secs;
        self.pending = Some(PendingSync {
            video,
            position_secs,
            intent,
        });
        if self.phase == Phase::Empty {
            self.phase = Phase::AwaitingSurface;
        }
    }

    /// Full reload+seek+intent application. Surface commands come first so a
    /// surface failure leaves the state untouched.
    fn apply_snapshot(&mut self, snapshot: PendingSync, now: Instant) -> Result<(), SyncError> {
        self.surface
            .load(&snapshot.video, snapshot.position_secs)
            .map_err(SyncError::PlaybackSurface)?;
        self.state.video = Some(snapshot.video);
        self.state.position_secs = snapshot.position_secs;

        match snapshot.intent {
            Intent::Play => {
                self.surface.play().map_err(SyncError::PlaybackSurface)?;
                self.state.playing = true;
            }
            Intent::Pause => {
                // Loading leaves the surface paused.
                self.state.playing = false;
            }
        }
        self.state.last_applied_at = Some(now);
        Ok(())
    }

    /// Command the surface only when the requested mode differs from the
    /// current one.
    fn apply_intent(&mut self, intent: Intent) -> Result<(), SyncError> {
        match intent {
            Intent::Play if !self.state.playing => {
                self.surface.play().map_err(SyncError::PlaybackSurface)?;
                self.state.playing = true;
            }
            Intent::Pause if self.state.playing => {
                self.surface.pause().map_err(SyncError::PlaybackSurface)?;
                self.state.playing = false;
            }
            _ => {}
        }
        Ok(())
    }

    fn within_remote_window(&self, now: Instant) -> bool {
        self.state
            .last_applied_at
            .map_or(false, |applied| now.duration_since(applied) < REMOTE_APPLY_WINDOW)
    }
}
