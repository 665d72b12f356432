//! # Mission Download
//!
//! Downloads the autopilot's mission over the active link.
//!
//! # Download Flow (Autopilot → GCS)
//!
//! 1. GCS sends MISSION_REQUEST_LIST
//! 2. Autopilot responds with MISSION_COUNT
//! 3. GCS sends MISSION_REQUEST_INT for seq=0
//! 4. Autopilot responds with MISSION_ITEM(_INT) for seq=0
//! 5. ... repeat until all items received
//! 6. GCS sends MISSION_ACK
//!
//! # Timeout Handling
//!
//! - MISSION_COUNT: request list resent after 1.2 s without an answer
//! - Items: request for the next sequence resent after 1.0 s without progress
//! - After 5 resends the download is negative-acknowledged and aborted
//!
//! Time is passed in explicitly (`now`) so the machine is deterministic
//! under test.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::item::MissionItem;
use crate::link::Link;
use crate::protocol::frame::{MISSION_ACK_ACCEPTED, MISSION_ACK_ERROR};
use crate::protocol::Outbound;

/// Wait for MISSION_COUNT before resending the list request
pub const COUNT_TIMEOUT: Duration = Duration::from_millis(1200);

/// Wait for the requested item before resending the request
pub const ITEM_TIMEOUT: Duration = Duration::from_millis(1000);

/// Resends allowed before the download is aborted
pub const MAX_RETRIES: u32 = 5;

/// Download session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    /// No download in progress
    #[default]
    Idle,
    /// List requested, waiting for MISSION_COUNT
    AwaitingCount,
    /// Waiting for the item at `next_seq`
    AwaitingItem,
    /// Every expected item arrived; acknowledged on the next tick
    Complete,
    /// Retries exhausted; negative acknowledgment sent
    Aborted,
}

/// How the last download session ended
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// Session completed and the mission list was published
    Completed {
        items: Vec<MissionItem>,
        expected: u16,
        /// MISSION_ACK result that was sent
        result: u8,
    },
    /// Session gave up after exhausting retries, or was cancelled
    Aborted { reason: String },
    /// Session could not start
    Failed { reason: String },
}

/// Mission download state machine
#[derive(Debug, Default)]
pub struct MissionDownload {
    state: DownloadState,
    expected_count: u16,
    next_seq: u16,
    received: BTreeMap<u16, MissionItem>,
    retry_count: u32,
    last_request: Option<Instant>,
    last_outcome: Option<DownloadOutcome>,
}

impl MissionDownload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Whether a session is in progress.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.state != DownloadState::Idle
    }

    #[must_use]
    pub fn expected_count(&self) -> u16 {
        self.expected_count
    }

    #[must_use]
    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    #[must_use]
    pub fn last_outcome(&self) -> Option<&DownloadOutcome> {
        self.last_outcome.as_ref()
    }

    /// Starts a download by requesting the mission list.
    ///
    /// A no-op while a session is already in flight. If the request cannot
    /// be sent the session stays idle and the failure becomes the last
    /// outcome.
    ///
    /// # Returns
    ///
    /// `true` if a new session started.
    pub fn start(&mut self, link: &mut Link, now: Instant) -> bool {
        if self.is_in_flight() {
            debug!("Mission download already active ({:?}), skip", self.state);
            return false;
        }

        self.expected_count = 0;
        self.next_seq = 0;
        self.received.clear();
        self.retry_count = 0;

        info!("Send MISSION_REQUEST_LIST");
        if let Err(e) = link.send(Outbound::MissionRequestList) {
            warn!("MISSION_REQUEST_LIST send failed: {}", e);
            self.last_outcome = Some(DownloadOutcome::Failed { reason: e.to_string() });
            return false;
        }

        self.state = DownloadState::AwaitingCount;
        self.last_request = Some(now);
        true
    }

    /// Handles MISSION_COUNT from the active link.
    pub fn handle_count(&mut self, count: u16, link: &mut Link, now: Instant) {
        if self.state != DownloadState::AwaitingCount {
            debug!("Ignoring MISSION_COUNT {} in state {:?}", count, self.state);
            return;
        }

        info!("Mission count: {}", count);
        self.expected_count = count;
        self.next_seq = 0;
        self.retry_count = 0;

        if count == 0 {
            self.state = DownloadState::Complete;
            return;
        }

        self.state = DownloadState::AwaitingItem;
        self.request_seq(0, link, now);
    }

    /// Handles MISSION_ITEM or MISSION_ITEM_INT from the active link.
    ///
    /// Items other than `next_seq` are kept for late or out-of-order
    /// delivery but do not advance the download, including items beyond the
    /// announced count. Duplicates overwrite the stored item.
    pub fn handle_item(&mut self, item: MissionItem, link: &mut Link, now: Instant) {
        match self.state {
            DownloadState::AwaitingItem | DownloadState::Complete => {}
            _ => {
                debug!("Ignoring mission item {} in state {:?}", item.seq, self.state);
                return;
            }
        }
        if item.seq >= self.expected_count {
            debug!("Mission item {} beyond count {}", item.seq, self.expected_count);
        }

        self.received.insert(item.seq, item);

        if self.state == DownloadState::AwaitingItem && item.seq == self.next_seq {
            self.retry_count = 0;
            self.next_seq += 1;
            if self.next_seq < self.expected_count {
                self.request_seq(self.next_seq, link, now);
            } else {
                self.state = DownloadState::Complete;
            }
        }
    }

    /// Advances timers and finishes completed sessions.
    ///
    /// Call once per poll after inbound frames have been handled.
    ///
    /// # Returns
    ///
    /// The outcome if a session ended during this tick. A session that runs
    /// out of retries stays `Aborted` for one tick and reports its outcome
    /// on the following one.
    pub fn tick(&mut self, link: &mut Link, now: Instant) -> Option<DownloadOutcome> {
        match self.state {
            DownloadState::Idle => None,
            DownloadState::AwaitingCount => {
                if !self.timed_out(now, COUNT_TIMEOUT) {
                    return None;
                }
                if self.retry_count >= MAX_RETRIES {
                    error!("MISSION_COUNT timeout, abort");
                    self.abort_with_nack(link, "no MISSION_COUNT after retries");
                    return None;
                }
                self.retry_count += 1;
                warn!("Resend MISSION_REQUEST_LIST (attempt {})", self.retry_count);
                if let Err(e) = link.send(Outbound::MissionRequestList) {
                    warn!("Resend failed: {}", e);
                }
                self.last_request = Some(now);
                None
            }
            DownloadState::AwaitingItem => {
                if !self.timed_out(now, ITEM_TIMEOUT) {
                    return None;
                }
                if self.retry_count >= MAX_RETRIES {
                    error!("Mission item {} timeout, abort", self.next_seq);
                    let reason = format!("no mission item {} after retries", self.next_seq);
                    self.abort_with_nack(link, &reason);
                    return None;
                }
                self.retry_count += 1;
                warn!("Retry mission seq {} (attempt {})", self.next_seq, self.retry_count);
                self.request_seq(self.next_seq, link, now);
                None
            }
            DownloadState::Complete => Some(self.finish(link)),
            DownloadState::Aborted => {
                self.state = DownloadState::Idle;
                self.last_outcome.clone()
            }
        }
    }

    /// Cancels an in-flight session.
    ///
    /// Attempts one negative acknowledgment when a link is given; send
    /// failures are ignored. A session already `Aborted` has sent its
    /// acknowledgment and keeps its outcome.
    pub fn abort(&mut self, link: Option<&mut Link>, reason: &str) {
        match self.state {
            DownloadState::Idle => return,
            DownloadState::Aborted => {
                self.state = DownloadState::Idle;
                return;
            }
            _ => {}
        }
        info!("Mission download cancelled: {}", reason);
        if let Some(link) = link {
            if let Err(e) = link.send(Outbound::MissionAck { result: MISSION_ACK_ERROR }) {
                debug!("Cancel ACK not sent: {}", e);
            }
        }
        self.state = DownloadState::Idle;
        self.last_outcome = Some(DownloadOutcome::Aborted { reason: reason.to_string() });
    }

    fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_request {
            Some(last) => now.saturating_duration_since(last) > timeout,
            None => true,
        }
    }

    fn request_seq(&mut self, seq: u16, link: &mut Link, now: Instant) {
        debug!("Requesting mission seq {}", seq);
        if let Err(e) = link.send(Outbound::MissionRequest { seq }) {
            warn!("Mission request {} send failed: {}", seq, e);
        }
        self.last_request = Some(now);
    }

    fn send_ack(link: &mut Link, result: u8) {
        if let Err(e) = link.send(Outbound::MissionAck { result }) {
            warn!("Send mission ACK failed: {}", e);
        }
    }

    fn abort_with_nack(&mut self, link: &mut Link, reason: &str) {
        Self::send_ack(link, MISSION_ACK_ERROR);
        self.state = DownloadState::Aborted;
        self.last_outcome = Some(DownloadOutcome::Aborted { reason: reason.to_string() });
    }

    fn finish(&mut self, link: &mut Link) -> DownloadOutcome {
        info!(
            "Mission download complete: {}/{}",
            self.received.len(),
            self.expected_count
        );
        let result = if self.received.len() == usize::from(self.expected_count) {
            MISSION_ACK_ACCEPTED
        } else {
            MISSION_ACK_ERROR
        };
        Self::send_ack(link, result);

        let items: Vec<MissionItem> = self.received.values().copied().collect();
        for item in &items {
            info!("  Mission item: {}", item);
        }

        let outcome = DownloadOutcome::Completed {
            items,
            expected: self.expected_count,
            result,
        };
        self.last_outcome = Some(outcome.clone());
        self.state = DownloadState::Idle;
        outcome
    }
}
