//! # Connection Module
//!
//! Owns the protocol sessions and drives the poll loop.
//!
//! This module handles:
//! - Opening the active link and learning the autopilot identity from its
//!   first heartbeat
//! - An optional receive-only passive link
//! - GCS heartbeats at 1 Hz on the active link
//! - Draining both links into the dispatcher, then ticking the mission
//!   download
//! - Shutdown, including mid-download

pub mod status;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MissionMode};
use crate::dispatch::MessageDispatcher;
use crate::error::{MavvizError, Result};
use crate::link::address::LinkAddress;
use crate::link::udp::UdpLink;
use crate::link::{Link, LinkRole, LinkTransport};
use crate::mission::{DownloadOutcome, MissionDownload};
use crate::protocol::{Frame, Identity, Outbound};
use crate::telemetry::{TelemetryStore, TelemetryView};

pub use status::ConnectionStatus;

/// Minimum spacing of GCS heartbeats
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep between receive attempts while waiting for the handshake
const HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Port the autopilot usually streams telemetry to
const TELEMETRY_PORT: u16 = 14551;

/// Port the autopilot usually sends mission traffic to
const MISSION_PORT: u16 = 14552;

/// Active and passive sessions plus the mission download
pub struct ConnectionManager {
    config: Config,
    store: Arc<TelemetryStore>,
    dispatcher: MessageDispatcher,
    download: MissionDownload,
    active: Option<Link>,
    passive: Option<Link>,
    last_heartbeat: Option<Instant>,
    connected_at: Option<chrono::DateTime<Utc>>,
    frames_received: u64,
    last_error: Option<String>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("active", &self.active)
            .field("passive", &self.passive)
            .field("download", &self.download.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager with an empty telemetry store.
    pub fn new(config: Config) -> Self {
        let store = TelemetryStore::shared(config.telemetry.capacity);
        let dispatcher = MessageDispatcher::new(&config, store.clone(), Instant::now());
        Self {
            config,
            store,
            dispatcher,
            download: MissionDownload::new(),
            active: None,
            passive: None,
            last_heartbeat: None,
            connected_at: None,
            frames_received: 0,
            last_error: None,
        }
    }

    /// Opens the configured UDP links and performs the handshake.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if a connection string does not parse
    /// - `Io` if a socket cannot be bound
    /// - `HandshakeTimeout` if no vehicle heartbeat arrives in time
    pub async fn connect(&mut self) -> Result<()> {
        let link = &self.config.link;
        let active_address: LinkAddress = link.active_address.parse()?;

        let passive_address = match link.separate_passive_address() {
            Some(addr) => Some(addr.parse::<LinkAddress>()?),
            None => None,
        };

        let mode = self.config.mission.mode;
        for warning in address_warnings(&active_address, passive_address.as_ref(), mode) {
            warn!("{}", warning);
        }

        let active = UdpLink::open(&active_address)?;
        let passive = match passive_address {
            Some(addr) => Some(Box::new(UdpLink::open(&addr)?) as Box<dyn LinkTransport>),
            None => None,
        };

        self.connect_with(Box::new(active), passive).await
    }

    /// Performs the handshake over caller-supplied transports.
    ///
    /// Any previous session is closed first. On failure both transports are
    /// closed.
    pub async fn connect_with(
        &mut self,
        active: Box<dyn LinkTransport>,
        passive: Option<Box<dyn LinkTransport>>,
    ) -> Result<()> {
        self.close();

        let cfg = &self.config.link;
        let mut active = Link::new(
            LinkRole::Active,
            cfg.active_address.clone(),
            Identity::new(cfg.source_system, cfg.source_component),
            active,
        );
        let mut passive = passive.map(|transport| {
            Link::new(
                LinkRole::Passive,
                cfg.separate_passive_address().unwrap_or("passive").to_string(),
                Identity::new(cfg.source_system, cfg.passive_component),
                transport,
            )
        });

        let timeout_ms = cfg.handshake_timeout_ms;
        info!("Waiting for heartbeat on {}", active.address());

        let handshake = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            wait_for_vehicle(&mut active),
        )
        .await;

        let target = match handshake {
            Ok(Ok(target)) => target,
            Ok(Err(e)) => {
                close_quietly(&mut active, passive.as_mut());
                return Err(e);
            }
            Err(_) => {
                close_quietly(&mut active, passive.as_mut());
                return Err(MavvizError::HandshakeTimeout {
                    address: active.address().to_string(),
                    timeout_ms,
                });
            }
        };

        active.set_target(target);
        info!("Heartbeat OK: sys={} comp={}", target.system_id, target.component_id);

        if let Some(link) = passive.as_mut() {
            link.set_target(target);
            info!("Passive link attached: {}", link.address());
        }

        self.active = Some(active);
        self.passive = passive;
        self.last_heartbeat = None;
        self.connected_at = Some(Utc::now());
        self.frames_received = 0;
        self.last_error = None;
        Ok(())
    }

    /// Whether a session is attached and the active link is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active.as_ref().is_some_and(Link::is_open)
    }

    /// Runs one poll cycle at the current instant.
    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    /// Runs one poll cycle.
    ///
    /// Sends a heartbeat if due, drains the active link and then the passive
    /// link into the dispatcher, then ticks the mission download.
    pub fn poll_at(&mut self, now: Instant) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let due = self
            .last_heartbeat
            .map_or(true, |last| now.saturating_duration_since(last) >= HEARTBEAT_INTERVAL);
        if due && active.is_open() {
            if let Err(e) = active.send(Outbound::Heartbeat) {
                warn!("Heartbeat send failed: {}", e);
                self.last_error = Some(e.to_string());
            }
            self.last_heartbeat = Some(now);
        }

        loop {
            match active.try_recv() {
                Ok(Some(inbound)) => {
                    self.frames_received += 1;
                    self.dispatcher.dispatch(
                        inbound,
                        LinkRole::Active,
                        now,
                        &mut self.download,
                        Some(&mut *active),
                    );
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Active link lost: {}", e);
                    self.last_error = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(passive) = self.passive.as_mut() {
            loop {
                match passive.try_recv() {
                    Ok(Some(inbound)) => {
                        self.frames_received += 1;
                        self.dispatcher
                            .dispatch(inbound, LinkRole::Passive, now, &mut self.download, None);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Passive link lost: {}", e);
                        self.last_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        if let Some(DownloadOutcome::Completed { items, .. }) = self.download.tick(active, now) {
            self.store.publish_mission(items);
        }
    }

    /// Starts a mission download at the current instant.
    pub fn request_mission(&mut self) -> bool {
        self.request_mission_at(Instant::now())
    }

    /// Starts a mission download when the mission mode is `active`.
    ///
    /// # Returns
    ///
    /// `true` if a new download started.
    pub fn request_mission_at(&mut self, now: Instant) -> bool {
        if self.config.mission.mode != MissionMode::Active {
            info!("Mission mode {}, not requesting mission", self.config.mission.mode);
            return false;
        }
        match self.active.as_mut() {
            Some(link) if link.is_open() => self.download.start(link, now),
            _ => {
                warn!("Mission request skipped: not connected");
                false
            }
        }
    }

    /// Releases both links.
    ///
    /// An in-flight download is cancelled with one negative acknowledgment
    /// attempt. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.download.abort(self.active.as_mut(), "connection closed");

        let mut closed = false;
        for mut link in [self.active.take(), self.passive.take()].into_iter().flatten() {
            if let Err(e) = link.close() {
                debug!("Closing {} link {}: {}", link.role(), link.address(), e);
            }
            closed = true;
        }
        if closed {
            info!("Connection closed");
        }
    }

    /// Current connection snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            active_address: self.active.as_ref().map(|l| l.address().to_string()),
            passive_address: self.passive.as_ref().map(|l| l.address().to_string()),
            target: self.active.as_ref().and_then(Link::target),
            connected_at: self.connected_at,
            frames_received: self.frames_received,
            download_state: self.download.state(),
            last_download: self.download.last_outcome().cloned(),
            last_error: self.last_error.clone(),
        }
    }

    /// Read-only handle on the telemetry store.
    #[must_use]
    pub fn view(&self) -> TelemetryView {
        TelemetryView::new(self.store.clone())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Receives until a vehicle heartbeat arrives.
///
/// Heartbeats from other ground stations are skipped. A component id of 0
/// is replaced by 1.
async fn wait_for_vehicle(link: &mut Link) -> Result<Identity> {
    loop {
        while let Some(inbound) = link.try_recv()? {
            if let Frame::Heartbeat(heartbeat) = inbound.frame {
                if heartbeat.is_vehicle {
                    let component_id = match inbound.sender.component_id {
                        0 => 1,
                        id => id,
                    };
                    return Ok(Identity::new(inbound.sender.system_id, component_id));
                }
                debug!("Skipping GCS heartbeat from {}", inbound.sender);
            }
        }
        tokio::time::sleep(HANDSHAKE_POLL_INTERVAL).await;
    }
}

fn close_quietly(active: &mut Link, passive: Option<&mut Link>) {
    if let Err(e) = active.close() {
        debug!("Closing active link: {}", e);
    }
    if let Some(link) = passive {
        if let Err(e) = link.close() {
            debug!("Closing passive link: {}", e);
        }
    }
}

/// Warnings about the link layout before the links are opened.
///
/// A missing passive link means mission traffic and telemetry share one
/// session. The reversed-port hint only matters when this client drives the
/// mission download.
fn address_warnings(
    active: &LinkAddress,
    passive: Option<&LinkAddress>,
    mode: MissionMode,
) -> Vec<String> {
    let Some(passive) = passive else {
        return vec![format!(
            "Active and passive connection are identical ({}); mission traffic is not separated",
            active
        )];
    };

    let reversed = active.socket_addr().port() == TELEMETRY_PORT
        && passive.socket_addr().port() == MISSION_PORT;
    if mode == MissionMode::Active && reversed {
        return vec![format!(
            "Active/passive may be reversed (active={}, passive={}); the active link should \
             use the port the autopilot sends mission traffic to",
            TELEMETRY_PORT, MISSION_PORT
        )];
    }
    Vec::new()
}
