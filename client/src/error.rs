use thiserror::Error;

/// Failures recovered at the session boundary. None of these abort the
/// synchronization loop; the next inbound sync event re-reconciles state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No transport connection; the outbound event was dropped, not queued.
    #[error("transport unavailable, outbound event dropped")]
    TransportUnavailable,

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The server rejected a room operation; the session stays pre-join.
    #[error("room error: {0}")]
    Room(String),

    /// The player surface failed. Playback state is unchanged and nothing is
    /// retried; recovery is a user-initiated video selection.
    #[error("player surface error: {0}")]
    PlaybackSurface(String),

    /// Inbound message for a room this client is not bound to. Callers
    /// discard it quietly; it never reaches the playback core.
    #[error("stale message: {0}")]
    StaleMessage(String),
}
