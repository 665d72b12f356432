//! # UDP Transport
//!
//! Non-blocking MAVLink v2 over UDP.
//!
//! A `udpin` link binds the configured address and replies to the first
//! endpoint that sends to it (PX4 and QGroundControl forward to a fixed
//! port). A `udpout` link binds an ephemeral port and sends to the
//! configured remote. One datagram may carry several frames; each is
//! decoded in turn and frames the client does not consume are skipped.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::net::{SocketAddr, UdpSocket};

use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use tracing::{debug, info, trace};

use super::address::LinkAddress;
use super::LinkTransport;
use crate::error::{MavvizError, Result};
use crate::protocol::codec::{decode_message, encode_outbound};
use crate::protocol::{Identity, Inbound, Outbound};

/// Largest UDP payload accepted
const RECV_BUFFER_SIZE: usize = 2048;

/// MAVLink transport over a non-blocking UDP socket
pub struct UdpLink {
    socket: Option<UdpSocket>,
    address: LinkAddress,
    peer: Option<SocketAddr>,
    sequence: u8,
    pending: VecDeque<Inbound>,
    recv_buf: Vec<u8>,
}

impl std::fmt::Debug for UdpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpLink")
            .field("address", &self.address)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl UdpLink {
    /// Opens a socket for `address` in non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the socket cannot be bound.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mavviz::link::udp::UdpLink;
    ///
    /// let link = UdpLink::open(&"udpin:127.0.0.1:14551".parse()?)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(address: &LinkAddress) -> Result<Self> {
        let (socket, peer) = match *address {
            LinkAddress::Listen(addr) => (UdpSocket::bind(addr)?, None),
            LinkAddress::Connect(addr) => {
                let local: SocketAddr = if addr.is_ipv6() {
                    "[::]:0".parse().map_err(|e| MavvizError::InvalidAddress(format!("{}", e)))?
                } else {
                    "0.0.0.0:0".parse().map_err(|e| MavvizError::InvalidAddress(format!("{}", e)))?
                };
                (UdpSocket::bind(local)?, Some(addr))
            }
        };
        socket.set_nonblocking(true)?;
        debug!("Opened UDP socket {} for {}", socket.local_addr()?, address);

        Ok(Self {
            socket: Some(socket),
            address: *address,
            peer,
            sequence: 0,
            pending: VecDeque::new(),
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Local socket address, if still open.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Remote endpoint frames are sent to.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn queue_datagram(&mut self, len: usize) {
        for (header, msg) in parse_datagram(&self.recv_buf[..len]) {
            match decode_message(&msg) {
                Some(frame) => self.pending.push_back(Inbound::new(
                    Identity::new(header.system_id, header.component_id),
                    frame,
                )),
                None => trace!(
                    "Skipping unconsumed message id {}",
                    mavlink::Message::message_id(&msg)
                ),
            }
        }
    }
}

/// Decodes every MAVLink v2 frame in one datagram.
///
/// Frames that fail CRC or cannot be parsed are dropped.
pub fn parse_datagram(data: &[u8]) -> Vec<(MavHeader, MavMessage)> {
    let mut reader = PeekReader::new(Cursor::new(data));
    let mut messages = Vec::new();

    // Each failed read consumes at least one byte, so this bounds the loop
    for _ in 0..data.len() {
        match mavlink::read_v2_msg::<MavMessage, _>(&mut reader) {
            Ok(message) => messages.push(message),
            Err(MessageReadError::Io(_)) => break,
            Err(e) => trace!("Dropping frame: {:?}", e),
        }
    }
    messages
}

/// Encodes one MAVLink v2 frame.
pub fn encode_frame(header: MavHeader, msg: &MavMessage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::with_capacity(280));
    mavlink::write_v2_msg(&mut buf, header, msg)
        .map_err(|e| MavvizError::TransportSend(format!("Failed to encode frame: {:?}", e)))?;
    Ok(buf.into_inner())
}

impl LinkTransport for UdpLink {
    fn try_recv(&mut self) -> Result<Option<Inbound>> {
        loop {
            if let Some(inbound) = self.pending.pop_front() {
                return Ok(Some(inbound));
            }

            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| MavvizError::ConnectionLost(format!("{} is closed", self.address)))?;

            match socket.recv_from(&mut self.recv_buf) {
                Ok((len, from)) => {
                    if self.peer.is_none() {
                        info!("Learned peer {} on {}", from, self.address);
                        self.peer = Some(from);
                    }
                    self.queue_datagram(len);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from a previous send surfaces here
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!("Peer on {} not reachable yet: {}", self.address, e);
                    return Ok(None);
                }
                Err(e) => {
                    return Err(MavvizError::ConnectionLost(format!(
                        "receive on {} failed: {}",
                        self.address, e
                    )))
                }
            }
        }
    }

    fn send(&mut self, local: Identity, target: Identity, outbound: Outbound) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| MavvizError::ConnectionLost(format!("{} is closed", self.address)))?;
        let peer = self.peer.ok_or_else(|| {
            MavvizError::TransportSend(format!("no peer has contacted {} yet", self.address))
        })?;

        let header = MavHeader {
            system_id: local.system_id,
            component_id: local.component_id,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let bytes = encode_frame(header, &encode_outbound(outbound, target))?;
        socket
            .send_to(&bytes, peer)
            .map_err(|e| MavvizError::TransportSend(format!("send to {} failed: {}", peer, e)))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("Closed UDP socket for {}", self.address);
        }
        self.pending.clear();
        Ok(())
    }
}
