//! Multi-modal synchronizer skeleton (spec DESIGN NOTES, open question b).
//!
//! Implements time-window pruning only: a packet is considered
//! "synchronized" once every tracked stream has reported a timestamp within
//! `window` of each other. Cross-stream content matching (aligning samples
//! by something other than wall-clock proximity) is out of scope here and
//! left as an open extension point for a consumer built on top of the core.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;

/// Tracks the most recent timestamp seen per stream in a named group and
/// answers whether the group is currently within its synchronization
/// window.
pub struct SyncWindow {
    streams: Vec<String>,
    window: Duration,
    last_timestamps: Mutex<HashMap<String, f64>>,
}

impl SyncWindow {
    pub fn new(streams: Vec<String>, window: Duration) -> Self {
        Self {
            streams,
            window,
            last_timestamps: Mutex::new(HashMap::new()),
        }
    }

    /// Records `timestamp` for `stream` and reports whether all tracked
    /// streams now fall within the configured window of each other. Returns
    /// `false` until every stream in the group has reported at least once.
    pub async fn observe(&self, stream: &str, timestamp: f64) -> bool {
        if !self.streams.iter().any(|s| s == stream) {
            return false;
        }

        let mut seen = self.last_timestamps.lock().await;
        seen.insert(stream.to_string(), timestamp);
        if seen.len() < self.streams.len() {
            return false;
        }

        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for ts in seen.values() {
            min = min.min(*ts);
            max = max.max(*ts);
        }
        (max - min) <= self.window.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_unsynced_until_every_stream_reports() {
        let window = SyncWindow::new(vec!["eeg".into(), "gaze".into()], Duration::from_millis(10));
        assert!(!window.observe("eeg", 1.000).await);
    }

    #[tokio::test]
    async fn within_window_is_synchronized() {
        let window = SyncWindow::new(vec!["eeg".into(), "gaze".into()], Duration::from_millis(10));
        window.observe("eeg", 1.000).await;
        assert!(window.observe("gaze", 1.005).await);
    }

    #[tokio::test]
    async fn outside_window_is_not_synchronized() {
        let window = SyncWindow::new(vec!["eeg".into(), "gaze".into()], Duration::from_millis(10));
        window.observe("eeg", 1.000).await;
        assert!(!window.observe("gaze", 1.050).await);
    }

    #[tokio::test]
    async fn unknown_stream_is_ignored() {
        let window = SyncWindow::new(vec!["eeg".into()], Duration::from_millis(10));
        assert!(!window.observe("unrelated", 1.0).await);
    }
}
