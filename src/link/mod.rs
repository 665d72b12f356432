//! # Link Module
//!
//! Protocol sessions with the autopilot.
//!
//! This module handles:
//! - Parsing connection strings (`udpin:`, `udpout:`, `udp:`)
//! - The [`LinkTransport`] seam between sessions and sockets
//! - Non-blocking MAVLink-over-UDP transport
//! - Session identity (local and target system/component ids)

pub mod address;
pub mod udp;

use tracing::debug;

use crate::error::{MavvizError, Result};
use crate::protocol::{Identity, Inbound, Outbound};

/// Non-blocking frame transport under a [`Link`]
#[cfg_attr(test, mockall::automock)]
pub trait LinkTransport: Send {
    /// Returns the next pending frame, or `None` when nothing is queued.
    ///
    /// Never blocks.
    fn try_recv(&mut self) -> Result<Option<Inbound>>;

    /// Sends one frame from `local` addressed to `target`.
    fn send(&mut self, local: Identity, target: Identity, outbound: Outbound) -> Result<()>;

    /// Releases the underlying socket. Calling it twice is harmless.
    fn close(&mut self) -> Result<()>;
}

/// Role of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Bidirectional session used for heartbeats and mission requests
    Active,

    /// Receive-only session used for redundant observation
    Passive,
}

impl std::fmt::Display for LinkRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkRole::Active => f.write_str("active"),
            LinkRole::Passive => f.write_str("passive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Open,
    Lost,
    Closed,
}

/// An open protocol session
pub struct Link {
    role: LinkRole,
    address: String,
    local: Identity,
    target: Option<Identity>,
    transport: Box<dyn LinkTransport>,
    state: LinkState,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("role", &self.role)
            .field("address", &self.address)
            .field("local", &self.local)
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Wraps an opened transport.
    ///
    /// # Arguments
    ///
    /// * `role` - Active or passive
    /// * `address` - Connection string, for logs and status
    /// * `local` - Identity this client uses on the session
    /// * `transport` - Opened transport
    pub fn new(
        role: LinkRole,
        address: impl Into<String>,
        local: Identity,
        transport: Box<dyn LinkTransport>,
    ) -> Self {
        Self {
            role,
            address: address.into(),
            local,
            target: None,
            transport,
            state: LinkState::Open,
        }
    }

    #[must_use]
    pub fn role(&self) -> LinkRole {
        self.role
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn local(&self) -> Identity {
        self.local
    }

    /// Autopilot identity learned at handshake.
    #[must_use]
    pub fn target(&self) -> Option<Identity> {
        self.target
    }

    pub fn set_target(&mut self, target: Identity) {
        self.target = Some(target);
    }

    /// Whether the session can still receive.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Returns the next pending frame.
    ///
    /// A receive failure marks the session lost; later calls return `Ok(None)`.
    pub fn try_recv(&mut self) -> Result<Option<Inbound>> {
        if self.state != LinkState::Open {
            return Ok(None);
        }
        match self.transport.try_recv() {
            Ok(inbound) => Ok(inbound),
            Err(e) => {
                self.state = LinkState::Lost;
                Err(match e {
                    MavvizError::ConnectionLost(_) => e,
                    other => MavvizError::ConnectionLost(format!(
                        "{} link {}: {}",
                        self.role, self.address, other
                    )),
                })
            }
        }
    }

    /// Sends one frame to the target.
    ///
    /// # Errors
    ///
    /// - `TransportSend` on a passive session, before the target is known,
    ///   or when the transport rejects the frame
    /// - `ConnectionLost` once the session is lost or closed
    pub fn send(&mut self, outbound: Outbound) -> Result<()> {
        if self.role == LinkRole::Passive {
            return Err(MavvizError::TransportSend(format!(
                "{} not sent: passive link is receive-only",
                outbound.kind()
            )));
        }
        if self.state != LinkState::Open {
            return Err(MavvizError::ConnectionLost(format!(
                "{} not sent: link {} is closed",
                outbound.kind(),
                self.address
            )));
        }
        let target = self.target.ok_or_else(|| {
            MavvizError::TransportSend(format!("{} not sent: target unknown", outbound.kind()))
        })?;

        self.transport.send(self.local, target, outbound)?;
        debug!("Sent {} to {} on {} link", outbound.kind(), target, self.role);
        Ok(())
    }

    /// Closes the session. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.state == LinkState::Closed {
            return Ok(());
        }
        self.state = LinkState::Closed;
        self.transport.close()
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Scripted transport for testing
    ///
    /// Frames pushed with [`ScriptedTransport::push`] are returned by
    /// `try_recv` in order; every sent frame is recorded.
    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        pub incoming: Arc<Mutex<VecDeque<Inbound>>>,
        pub sent: Arc<Mutex<Vec<(Identity, Identity, Outbound)>>>,
        pub send_error: Arc<Mutex<bool>>,
        pub recv_error: Arc<Mutex<bool>>,
        pub closed: Arc<Mutex<u32>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, inbound: Inbound) {
            self.incoming.lock().unwrap().push_back(inbound);
        }

        pub fn pending(&self) -> usize {
            self.incoming.lock().unwrap().len()
        }

        pub fn sent(&self) -> Vec<Outbound> {
            self.sent.lock().unwrap().iter().map(|(_, _, o)| *o).collect()
        }

        pub fn sent_with_ids(&self) -> Vec<(Identity, Identity, Outbound)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn set_send_error(&self, fail: bool) {
            *self.send_error.lock().unwrap() = fail;
        }

        pub fn set_recv_error(&self, fail: bool) {
            *self.recv_error.lock().unwrap() = fail;
        }

        pub fn close_count(&self) -> u32 {
            *self.closed.lock().unwrap()
        }
    }

    impl LinkTransport for ScriptedTransport {
        fn try_recv(&mut self) -> Result<Option<Inbound>> {
            if *self.recv_error.lock().unwrap() {
                return Err(MavvizError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "Mock recv error",
                )));
            }
            Ok(self.incoming.lock().unwrap().pop_front())
        }

        fn send(&mut self, local: Identity, target: Identity, outbound: Outbound) -> Result<()> {
            if *self.send_error.lock().unwrap() {
                return Err(MavvizError::TransportSend("Mock send error".to_string()));
            }
            self.sent.lock().unwrap().push((local, target, outbound));
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::ScriptedTransport;
    use super::*;
    use crate::protocol::frame::{Frame, HeartbeatFrame};

    fn active_link(transport: &ScriptedTransport) -> Link {
        Link::new(
            LinkRole::Active,
            "udpin:127.0.0.1:14551",
            Identity::new(252, 191),
            Box::new(transport.clone()),
        )
    }

    #[test]
    fn test_send_requires_target() {
        let transport = ScriptedTransport::new();
        let mut link = active_link(&transport);

        let result = link.send(Outbound::Heartbeat);
        assert!(matches!(result, Err(MavvizError::TransportSend(_))));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_send_uses_local_and_target_identity() {
        let transport = ScriptedTransport::new();
        let mut link = active_link(&transport);
        link.set_target(Identity::new(1, 1));

        link.send(Outbound::MissionRequestList).unwrap();
        assert_eq!(
            transport.sent_with_ids(),
            vec![(Identity::new(252, 191), Identity::new(1, 1), Outbound::MissionRequestList)]
        );
    }

    #[test]
    fn test_passive_link_never_sends() {
        let transport = ScriptedTransport::new();
        let mut link = Link::new(
            LinkRole::Passive,
            "udpin:127.0.0.1:14552",
            Identity::new(252, 200),
            Box::new(transport.clone()),
        );
        link.set_target(Identity::new(1, 1));

        assert!(link.send(Outbound::Heartbeat).is_err());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_recv_error_marks_link_lost() {
        let transport = ScriptedTransport::new();
        let mut link = active_link(&transport);
        transport.set_recv_error(true);

        let result = link.try_recv();
        assert!(matches!(result, Err(MavvizError::ConnectionLost(_))));
        assert!(!link.is_open());

        // Later polls no-op
        transport.set_recv_error(false);
        transport.push(Inbound::new(
            Identity::new(1, 1),
            Frame::Heartbeat(HeartbeatFrame { is_vehicle: true }),
        ));
        assert!(link.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport = ScriptedTransport::new();
        let mut link = active_link(&transport);
        link.set_target(Identity::new(1, 1));

        link.close().unwrap();
        link.close().unwrap();
        assert_eq!(transport.close_count(), 1);
        assert!(matches!(link.send(Outbound::Heartbeat), Err(MavvizError::ConnectionLost(_))));
    }

    #[test]
    fn test_transport_send_error_is_propagated() {
        let mut transport = MockLinkTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _, _| Err(MavvizError::TransportSend("socket full".to_string())));

        let mut link = Link::new(
            LinkRole::Active,
            "udpout:127.0.0.1:14550",
            Identity::new(252, 191),
            Box::new(transport),
        );
        link.set_target(Identity::new(1, 1));

        match link.send(Outbound::Heartbeat) {
            Err(MavvizError::TransportSend(msg)) => assert!(msg.contains("socket full")),
            other => panic!("Expected TransportSend, got: {:?}", other),
        }
        assert!(link.is_open());
    }
}
