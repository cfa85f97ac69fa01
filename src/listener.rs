//! Passive open (§4.3): bind and accept, one handshake at a time.
//!
//! Each accepted connection gets its own per-peer `UdpSocket` bound to an
//! ephemeral port (§9 design decision 1) rather than sharing the listening
//! socket across every accepted connection — the legacy convenience the
//! design notes flag as a concurrent-accept hazard.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::conn::Connection;
use crate::io::{DatagramIo, Ingress};
use crate::seq;
use crate::state::State;
use crate::timing::RTO;
use crate::trace::{NullTracer, TraceEvent, Tracer};
use crate::Error;

/// Readiness timeout used while idling in [`Listener::accept`] between
/// SYNs; distinct from the handshake RTO used once a SYN has arrived.
const ACCEPT_POLL: Duration = Duration::from_millis(500);

pub struct Listener {
    io: DatagramIo,
    loss_rate: f64,
}

impl Listener {
    pub fn bind(port: u16) -> Result<Self, Error> {
        let io = DatagramIo::bind(("0.0.0.0", port))?;
        Ok(Listener { io, loss_rate: 0.0 })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        self.io.local_addr()
    }

    /// Loss rate applied to every connection this listener accepts from now
    /// on (the accepted connection owns its own socket, so this is just a
    /// default copied forward at accept time).
    pub fn set_loss_rate(&mut self, rate: f64) {
        self.loss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn accept(&mut self) -> Result<Connection, Error> {
        self.accept_with_tracer(Box::new(NullTracer))
    }

    pub fn accept_with_tracer(&mut self, mut tracer: Box<dyn Tracer>) -> Result<Connection, Error> {
        loop {
            let (syn, from) = match self.io.recv(ACCEPT_POLL, tracer.as_mut())? {
                Ingress::Nothing => continue,
                Ingress::Packet(p, from) => (p, from),
            };

            if !syn.has_syn() || syn.has_ack() {
                continue;
            }
            tracer.record(TraceEvent::RcvSyn { seq: syn.seq_num });
            log::debug!("accept: SYN from {from}, seq={}", syn.seq_num);

            let mut io = DatagramIo::connected_to(from)?;
            io.set_loss_rate(self.loss_rate);

            let peer_isn = syn.seq_num;
            let recv_seq = seq::advance(peer_isn, 1);
            let our_isn: u32 = rand::thread_rng().gen();

            let mut conn = Connection::from_parts(io, tracer);
            conn.recv_seq = recv_seq;
            conn.peer_window_size = syn.window_size;
            conn.state = State::SynReceived;

            let synack = crate::packet::Packet::syn_ack(our_isn, recv_seq, conn.advertised_window());
            if conn.io.send(&synack).is_err() {
                tracer = conn.tracer;
                continue;
            }
            conn.tracer.record(TraceEvent::SndSynAck {
                seq: our_isn,
                ack: recv_seq,
            });

            let deadline = Instant::now() + RTO;
            let mut established = false;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let ingress = conn.io.recv(remaining, conn.tracer.as_mut())?;
                let (packet, _) = match ingress {
                    Ingress::Nothing => continue,
                    Ingress::Packet(p, from) => (p, from),
                };

                if packet.has_ack() && !packet.has_syn() && packet.ack_num == our_isn.wrapping_add(1) {
                    conn.send_seq = our_isn.wrapping_add(1);
                    conn.send_base = conn.send_seq;
                    conn.last_byte_sent = conn.send_seq;
                    conn.last_byte_acked = conn.send_seq;
                    conn.peer_window_size = packet.window_size;
                    conn.state = State::Established;
                    established = true;
                    break;
                }
            }

            if established {
                log::info!("accept: established connection from {from}");
                return Ok(conn);
            }

            // Timeout or mismatch on the final ACK: discard this pending
            // connection and keep listening for the next SYN.
            log::debug!("accept: handshake with {from} did not complete within one RTO, discarding");
            tracer = conn.tracer;
        }
    }
}
