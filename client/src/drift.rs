use crate::video::VideoId;

/// Positional drift beyond which a correction seek is issued, in seconds.
/// One second absorbs normal clock and network jitter without visible jumps.
pub const DRIFT_TOLERANCE_SECS: f64 = 1.0;

/// True when the reported remote position has drifted far enough from the
/// local position to warrant a correction. The tolerance boundary itself is
/// accepted as in sync.
pub fn should_correct(local_secs: f64, remote_secs: f64) -> bool {
    (local_secs - remote_secs).abs() > DRIFT_TOLERANCE_SECS
}

/// True when the remote event names a different media item, which requires a
/// full reload rather than a seek. Loading always lands on the remote
/// position, so the drift check does not apply.
pub fn should_load_new_video(local: Option<&VideoId>, remote: &VideoId) -> bool {
    local != Some(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_tolerance_is_not_corrected() {
        assert!(!should_correct(10.0, 10.0));
        assert!(!should_correct(10.0, 10.5));
        assert!(!should_correct(10.5, 10.0));
    }

    #[test]
    fn test_boundary_is_not_corrected() {
        assert!(!should_correct(10.0, 11.0));
        assert!(!should_correct(11.0, 10.0));
    }

    #[test]
    fn test_past_tolerance_is_corrected() {
        assert!(should_correct(10.0, 12.0));
        assert!(should_correct(12.0, 10.0));
        assert!(should_correct(0.0, 1.001));
    }

    #[test]
    fn test_new_video_requires_reload() {
        let v1 = VideoId::new("v1");
        let v2 = VideoId::new("v2");
        assert!(should_load_new_video(None, &v1));
        assert!(should_load_new_video(Some(&v1), &v2));
        assert!(!should_load_new_video(Some(&v1), &v1));
    }
}
