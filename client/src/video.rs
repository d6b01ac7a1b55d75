use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque catalog key identifying a media item. Equality is by value; no two
/// different items share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check if the input is a watch URL rather than a bare catalog key
pub fn is_watch_url(input: &str) -> bool {
    input.contains("youtube.com/watch")
        || input.contains("youtu.be/")
        || input.contains("youtube.com/shorts/")
        || input.contains("youtube.com/live/")
}

/// Extract the video id from a watch URL
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    // Handle youtu.be/VIDEO_ID
    if url.contains("youtu.be/") {
        return url
            .split("youtu.be/")
            .nth(1)
            .map(|s| s.split(&['?', '&', '/'][..]).next().unwrap_or(s))
            .filter(|s| !s.is_empty())
            .map(VideoId::new);
    }

    // Handle youtube.com/watch?v=VIDEO_ID
    if url.contains("youtube.com/watch") {
        if let Some(query) = url.split('?').nth(1) {
            for param in query.split('&') {
                if let Some(id) = param.strip_prefix("v=") {
                    if !id.is_empty() {
                        return Some(VideoId::new(id));
                    }
                }
            }
        }
    }

    // Handle youtube.com/shorts/VIDEO_ID or youtube.com/live/VIDEO_ID
    if url.contains("/shorts/") || url.contains("/live/") {
        return url
            .split('/')
            .last()
            .map(|s| s.split(&['?', '&'][..]).next().unwrap_or(s))
            .filter(|s| !s.is_empty())
            .map(VideoId::new);
    }

    None
}

/// Resolve user input into a video identity: either a watch URL or a bare key
pub fn parse_video_ref(input: &str) -> Option<VideoId> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_watch_url(trimmed) {
        return extract_video_id(trimmed);
    }
    if trimmed.contains(char::is_whitespace) || trimmed.contains('/') {
        return None;
    }
    Some(VideoId::new(trimmed))
}
