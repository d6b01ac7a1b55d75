use std::collections::VecDeque;
use std::time::Instant;

use crate::video::VideoId;

/// Fallback duration reported by the simulated surface. Real surfaces learn
/// it from the media; the simulation has no media to ask.
const SIMULATED_DURATION_SECS: f64 = 600.0;

/// Command surface of the rendering player. The player itself is an external
/// collaborator (an embedded iframe player, a native element, ...); the
/// synchronization core only ever talks through this vocabulary.
pub trait PlayerSurface {
    /// Load a media item positioned at the given offset. Loading leaves the
    /// player paused.
    fn load(&mut self, video: &VideoId, at_secs: f64) -> Result<(), String>;
    fn play(&mut self) -> Result<(), String>;
    fn pause(&mut self) -> Result<(), String>;
    fn seek(&mut self, secs: f64) -> Result<(), String>;
    fn current_time(&self) -> Result<f64, String>;
    fn duration(&self) -> Result<f64, String>;
    fn loaded_video(&self) -> Option<VideoId>;

    /// Drain callbacks the surface produced since the last poll. The driver
    /// feeds these back to the session binder in order.
    fn poll_events(&mut self) -> Vec<SurfaceEvent> {
        Vec::new()
    }
}

/// Callbacks a player surface reports back to the session
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// Fired once, when the surface finishes initializing
    Ready { duration_secs: f64 },
    Playing,
    Paused,
    Ended,
    Error { reason: String },
}

/// Headless stand-in for the external player: tracks position against a
/// wall-clock anchor while playing and reports the same callbacks a real
/// surface would.
pub struct SimulatedPlayer {
    video: Option<VideoId>,
    /// Position at the last anchor point
    position: f64,
    /// Set while playing; position advances from this instant
    playing_since: Option<Instant>,
    duration: f64,
    events: VecDeque<SurfaceEvent>,
}

impl SimulatedPlayer {
    /// The simulation has no mount step, so it announces readiness as soon
    /// as it exists; the driver picks the callback up on its next poll.
    pub fn new() -> Self {
        let mut events = VecDeque::new();
        events.push_back(SurfaceEvent::Ready {
            duration_secs: SIMULATED_DURATION_SECS,
        });
        Self {
            video: None,
            position: 0.0,
            playing_since: None,
            duration: SIMULATED_DURATION_SECS,
            events,
        }
    }

    fn clock_position(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.position + elapsed).min(self.duration)
    }

    fn require_media(&self) -> Result<(), String> {
        if self.video.is_none() {
            return Err("no media loaded".to_string());
        }
        Ok(())
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerSurface for SimulatedPlayer {
    fn load(&mut self, video: &VideoId, at_secs: f64) -> Result<(), String> {
        self.video = Some(video.clone());
        self.position = at_secs.clamp(0.0, self.duration);
        self.playing_since = None;
        tracing::debug!("Simulated surface loaded {} at {:.1}s", video, self.position);
        Ok(())
    }

    fn play(&mut self) -> Result<(), String> {
        self.require_media()?;
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
            self.events.push_back(SurfaceEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), String> {
        self.require_media()?;
        if self.playing_since.is_some() {
            self.position = self.clock_position();
            self.playing_since = None;
            self.events.push_back(SurfaceEvent::Paused);
        }
        Ok(())
    }

    fn seek(&mut self, secs: f64) -> Result<(), String> {
        self.require_media()?;
        self.position = secs.clamp(0.0, self.duration);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
            // A seek while playing resumes with a fresh playing callback,
            // the way embedded players report it after rebuffering.
            self.events.push_back(SurfaceEvent::Playing);
        }
        Ok(())
    }

    fn current_time(&self) -> Result<f64, String> {
        self.require_media()?;
        Ok(self.clock_position())
    }

    fn duration(&self) -> Result<f64, String> {
        Ok(self.duration)
    }

    fn loaded_video(&self) -> Option<VideoId> {
        self.video.clone()
    }

    fn poll_events(&mut self) -> Vec<SurfaceEvent> {
        if self.playing_since.is_some() && self.clock_position() >= self.duration {
            self.position = self.duration;
            self.playing_since = None;
            self.events.push_back(SurfaceEvent::Ended);
        }
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// What a surface was told to do, for asserting command sequences
    #[derive(Debug, Clone, PartialEq)]
    pub enum Command {
        Load(VideoId, f64),
        Play,
        Pause,
        Seek(f64),
    }

    /// Test surface that records every command and reports whatever position
    /// and duration the test pins.
    #[derive(Default)]
    pub struct RecordingSurface {
        pub commands: Vec<Command>,
        pub time: f64,
        pub total: f64,
        pub video: Option<VideoId>,
    }

    impl RecordingSurface {
        pub fn new() -> Self {
            Self {
                total: 100.0,
                ..Self::default()
            }
        }
    }

    impl PlayerSurface for RecordingSurface {
        fn load(&mut self, video: &VideoId, at_secs: f64) -> Result<(), String> {
            self.commands.push(Command::Load(video.clone(), at_secs));
            self.video = Some(video.clone());
            self.time = at_secs;
            Ok(())
        }

        fn play(&mut self) -> Result<(), String> {
            self.commands.push(Command::Play);
            Ok(())
        }

        fn pause(&mut self) -> Result<(), String> {
            self.commands.push(Command::Pause);
            Ok(())
        }

        fn seek(&mut self, secs: f64) -> Result<(), String> {
            self.commands.push(Command::Seek(secs));
            self.time = secs;
            Ok(())
        }

        fn current_time(&self) -> Result<f64, String> {
            Ok(self.time)
        }

        fn duration(&self) -> Result<f64, String> {
            Ok(self.total)
        }

        fn loaded_video(&self) -> Option<VideoId> {
            self.video.clone()
        }
    }
}
