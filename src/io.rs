//! UDP datagram I/O: wire (de)serialization, peer tracking and the
//! simulated-loss injection point used for testing (§4.2).

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use rand::Rng;

use crate::packet::{Packet, MAX_PACKET_LEN};
use crate::trace::{TraceEvent, Tracer};
use crate::Error;

/// Outcome of a single ingress poll.
pub enum Ingress {
    /// A packet was decoded, along with the datagram's source address
    /// (the peer may be reachable at a different address than the one
    /// currently recorded, e.g. a freshly accepted connection's SYN-ACK
    /// reply; callers decide whether to adopt it).
    Packet(Packet, SocketAddr),
    /// Nothing arrived within the timeout, or a data packet was dropped by
    /// the loss simulator — both look like "no packet yet" to callers.
    Nothing,
}

#[derive(Debug)]
pub struct DatagramIo {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    loss_rate: f64,
    valid: bool,
}

impl DatagramIo {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr)?;
        Ok(DatagramIo {
            socket,
            peer: None,
            loss_rate: 0.0,
            valid: true,
        })
    }

    /// Binds to an ephemeral local port and pins the given peer address,
    /// the per-peer socket every accepted connection gets (§9 design
    /// decision 1).
    pub fn connected_to(peer: SocketAddr) -> Result<Self, Error> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        Ok(DatagramIo {
            socket,
            peer: Some(peer),
            loss_rate: 0.0,
            valid: true,
        })
    }

    pub fn set_loss_rate(&mut self, loss_rate: f64) {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    pub fn send(&self, packet: &Packet) -> Result<(), Error> {
        let peer = self
            .peer
            .ok_or(Error::MalformedDatagram("no peer address set"))?;
        let buf = packet.encode();
        self.socket.send_to(&buf, peer)?;
        Ok(())
    }

    /// Polls for one inbound datagram with the given readiness timeout.
    /// Rolls loss only for data-bearing packets, per §4.2 item 2.
    pub fn recv(&mut self, timeout: Duration, tracer: &mut dyn Tracer) -> Result<Ingress, Error> {
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        let mut buf = [0u8; MAX_PACKET_LEN];
        let (n, from) = match self.socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(Ingress::Nothing);
            }
            Err(e) => {
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotConnected | std::io::ErrorKind::Other
                ) {
                    self.valid = false;
                    log::warn!("socket invalidated: {e}");
                }
                return Err(Error::SocketFailure(e));
            }
        };

        if n < crate::packet::HEADER_LEN {
            return Err(Error::MalformedDatagram("datagram shorter than header"));
        }

        let packet = Packet::decode(&buf[..n])?;

        if packet.is_data_bearing() && self.roll_loss() {
            log::trace!("simulated loss: dropping data seq={}", packet.seq_num);
            tracer.record(TraceEvent::DropData { seq: packet.seq_num });
            return Ok(Ingress::Nothing);
        }

        if self.peer.is_none() {
            self.peer = Some(from);
        }

        Ok(Ingress::Packet(packet, from))
    }

    fn roll_loss(&self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..1.0) < self.loss_rate
    }
}
