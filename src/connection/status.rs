//! # Connection Status
//!
//! Point-in-time snapshot of the connection for the rendering consumer.

use chrono::{DateTime, Utc};

use crate::mission::{DownloadOutcome, DownloadState};
use crate::protocol::Identity;

/// Connection snapshot returned by `ConnectionManager::status`
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    /// Whether the active link is open
    pub connected: bool,

    pub active_address: Option<String>,
    pub passive_address: Option<String>,

    /// Autopilot identity learned at handshake
    pub target: Option<Identity>,

    /// When the handshake completed
    pub connected_at: Option<DateTime<Utc>>,

    /// Frames received on both links since connect
    pub frames_received: u64,

    pub download_state: DownloadState,
    pub last_download: Option<DownloadOutcome>,

    /// Most recent transport error
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let target = self
            .target
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let link = if self.connected { "up" } else { "down" };
        let mut line = format!(
            "link {} target {} frames {} mission {:?}",
            link, target, self.frames_received, self.download_state
        );
        if let Some(err) = &self.last_error {
            line.push_str(&format!(" error \"{}\"", err));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let status = ConnectionStatus {
            connected: true,
            active_address: Some("udpin:127.0.0.1:14551".to_string()),
            passive_address: None,
            target: Some(Identity::new(1, 1)),
            connected_at: Some(Utc::now()),
            frames_received: 42,
            download_state: DownloadState::Idle,
            last_download: None,
            last_error: None,
        };
        assert_eq!(status.summary(), "link up target 1/1 frames 42 mission Idle");

        let lost = ConnectionStatus {
            connected: false,
            last_error: Some("gone".to_string()),
            ..status
        };
        assert!(lost.summary().starts_with("link down"));
        assert!(lost.summary().ends_with("error \"gone\""));
    }
}
