//! The per-connection protocol engine: handshake, reliable send/receive
//! pipelines, flow control and shutdown (§4 of the design doc).

use std::collections::VecDeque;
use std::net::ToSocketAddrs;
use std::thread;
use std::time::Instant;

use rand::Rng;

use crate::io::{DatagramIo, Ingress};
use crate::ooo::OooBuffer;
use crate::packet::Packet;
use crate::seq;
use crate::state::State;
use crate::timing::{
    DEFAULT_RECV_BUFFER_SIZE, FLOW_CONTROL_BACKOFF, MAX_RETRIES, MSS, RTO, WINDOW_FULL_BACKOFF,
};
use crate::trace::{NullTracer, TraceEvent, Tracer};
use crate::window::SendWindow;
use crate::Error;

/// One end of a reliable byte-stream connection. See the crate-level docs
/// for the state machine and §4 for the per-pipeline algorithms.
pub struct Connection {
    pub(crate) io: DatagramIo,
    pub(crate) state: State,

    pub(crate) send_seq: u32,
    pub(crate) send_base: u32,
    pub(crate) recv_seq: u32,
    pub(crate) last_byte_sent: u32,
    pub(crate) last_byte_acked: u32,

    pub(crate) peer_window_size: u16,
    pub(crate) recv_buffer_size: usize,
    pub(crate) recv_buffer_used: usize,

    pub(crate) window: SendWindow,
    pub(crate) ooo: OooBuffer,
    pub(crate) peer_closed: bool,

    /// Bytes already advanced past in the sequence space (and charged
    /// against `recv_buffer_used`) but not yet handed to a caller's `recv`
    /// buffer — the overflow of a drain deeper than the buffer it landed
    /// in. Served before polling the network on the next `recv` call.
    pub(crate) pending: VecDeque<u8>,

    pub(crate) tracer: Box<dyn Tracer>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("send_seq", &self.send_seq)
            .field("recv_seq", &self.recv_seq)
            .finish()
    }
}

impl Connection {
    /// A fresh connection in CLOSED, bound to an ephemeral local port.
    pub fn new() -> Result<Self, Error> {
        Self::with_tracer(Box::new(NullTracer))
    }

    pub fn with_tracer(tracer: Box<dyn Tracer>) -> Result<Self, Error> {
        let io = DatagramIo::bind(("0.0.0.0", 0))?;
        Ok(Self::from_parts(io, tracer))
    }

    pub(crate) fn from_parts(io: DatagramIo, tracer: Box<dyn Tracer>) -> Self {
        Connection {
            io,
            state: State::Closed,
            send_seq: 0,
            send_base: 0,
            recv_seq: 0,
            last_byte_sent: 0,
            last_byte_acked: 0,
            peer_window_size: 0,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE as usize,
            recv_buffer_used: 0,
            window: SendWindow::new(),
            ooo: OooBuffer::new(),
            peer_closed: false,
            pending: VecDeque::new(),
            tracer,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_loss_rate(&mut self, rate: f64) {
        self.io.set_loss_rate(rate);
    }

    /// Overrides the advertised-window budget (default 16 KiB). Mainly
    /// useful for exercising the flow-control throttle (§4.5, §8 scenario 5)
    /// without waiting to fill the default buffer.
    pub fn set_recv_buffer_size(&mut self, bytes: usize) {
        self.recv_buffer_size = bytes;
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        self.io.local_addr()
    }

    /// Currently advertised receive window, per §4.5: free buffer space
    /// clamped to at least one MSS so the sender is never fully starved.
    pub(crate) fn advertised_window(&self) -> u16 {
        let free = self.recv_buffer_size.saturating_sub(self.recv_buffer_used);
        free.max(MSS).min(u16::MAX as usize) as u16
    }

    /// §4.5 can-send predicate.
    fn can_send(&self, len: usize) -> bool {
        let in_flight = if seq::ge(self.last_byte_sent, self.last_byte_acked) {
            self.last_byte_sent.wrapping_sub(self.last_byte_acked)
        } else {
            0
        };
        let available = (self.peer_window_size as u32).saturating_sub(in_flight);
        len as u32 <= available
    }

    // ---- active open (§4.3) ----------------------------------------

    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if self.state != State::Closed {
            return Err(Error::InvalidState);
        }

        let peer = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or(Error::HandshakeFailed("unresolvable host"))?;
        self.io.set_peer(peer);

        let isn: u32 = rand::thread_rng().gen();
        let syn = Packet::syn(isn, self.advertised_window());
        self.io.send(&syn)?;
        self.tracer.record(TraceEvent::SndSyn { seq: isn });
        self.state = State::SynSent;

        let deadline = Instant::now() + RTO;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.state = State::Closed;
                return Err(Error::HandshakeFailed("no SYN-ACK within one RTO"));
            }

            let ingress = self.io.recv(remaining, self.tracer.as_mut())?;
            let (packet, from) = match ingress {
                Ingress::Nothing => continue,
                Ingress::Packet(p, from) => (p, from),
            };

            if packet.has_syn() && packet.has_ack() && packet.ack_num == isn.wrapping_add(1) {
                self.io.set_peer(from);
                log::debug!("connect: SYN-ACK matched isn={isn}, peer now {from}");
                self.tracer.record(TraceEvent::RcvSynAck {
                    seq: packet.seq_num,
                    ack: packet.ack_num,
                });

                self.recv_seq = seq::advance(packet.seq_num, 1);
                self.peer_window_size = packet.window_size;
                self.send_seq = isn.wrapping_add(1);
                self.send_base = self.send_seq;
                self.last_byte_sent = self.send_seq;
                self.last_byte_acked = self.send_seq;

                let ack = Packet::ack(self.send_seq, self.recv_seq, self.advertised_window());
                self.io.send(&ack)?;
                self.tracer.record(TraceEvent::SndAck { ack: self.recv_seq });

                self.state = State::Established;
                log::info!("connect: established, send_seq={}, recv_seq={}", self.send_seq, self.recv_seq);
                return Ok(());
            }
            // Mismatched packet: keep waiting out the same RTO window.
        }
    }

    // ---- reliable send pipeline (§4.4) -------------------------------

    pub fn send(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        if !self.state.can_send_or_recv() {
            return Err(Error::InvalidState);
        }

        let mut bytes_sent = 0usize;
        while bytes_sent < bytes.len() {
            self.drain_acks()?;
            self.sweep_timeouts()?;

            if self.window.is_full() {
                thread::sleep(WINDOW_FULL_BACKOFF);
                continue;
            }

            let remaining = bytes.len() - bytes_sent;
            let chunk = remaining.min(MSS);

            if !self.can_send(chunk) {
                thread::sleep(FLOW_CONTROL_BACKOFF);
                continue;
            }

            let payload = &bytes[bytes_sent..bytes_sent + chunk];
            let packet = Packet::data(self.send_seq, self.recv_seq, self.advertised_window(), payload);
            self.io.send(&packet)?;
            self.tracer.record(TraceEvent::SndData {
                seq: self.send_seq,
                len: chunk,
            });

            self.window.push(packet, Instant::now());
            self.send_seq = seq::advance(self.send_seq, chunk);
            self.last_byte_sent = seq::advance(self.last_byte_sent, chunk);
            bytes_sent += chunk;
        }

        while !self.window.is_empty() {
            self.drain_acks()?;
            self.sweep_timeouts()?;
        }

        Ok(bytes_sent)
    }

    /// Drains one inbound datagram without blocking (§4.4 step 1). Only
    /// ACK-carrying packets update connection state here; the data
    /// pipeline proper lives in [`Connection::recv`].
    fn drain_acks(&mut self) -> Result<(), Error> {
        match self.io.recv(std::time::Duration::from_millis(0), self.tracer.as_mut())? {
            Ingress::Nothing => Ok(()),
            Ingress::Packet(packet, _) => {
                if packet.has_ack() {
                    self.process_ack(packet.ack_num, packet.window_size);
                }
                Ok(())
            }
        }
    }

    fn process_ack(&mut self, ack: u32, peer_window: u16) {
        self.peer_window_size = peer_window;
        if seq::gt(ack, self.last_byte_acked) {
            self.last_byte_acked = ack;
        }
        if let Some(new_base) = self.window.ack_through(ack) {
            self.send_base = new_base;
        }
    }

    /// §4.4.2: retransmit any entry aged past RTO, oldest first.
    fn sweep_timeouts(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        for entry in self.window.iter_mut() {
            if now.duration_since(entry.send_time) >= RTO {
                self.tracer.record(TraceEvent::TimeoutSeq {
                    seq: entry.packet.seq_num,
                });
                entry.retries += 1;
                if entry.retries > MAX_RETRIES {
                    log::warn!(
                        "seq={} exceeded {MAX_RETRIES} retries, declaring peer unreachable",
                        entry.packet.seq_num
                    );
                    return Err(Error::PeerUnreachable(entry.retries));
                }
                log::debug!("retransmitting seq={} (retry {})", entry.packet.seq_num, entry.retries);
                self.io.send(&entry.packet)?;
                self.tracer.record(TraceEvent::RetxData {
                    seq: entry.packet.seq_num,
                    len: entry.packet.payload.len(),
                });
                entry.send_time = now;
            }
        }
        Ok(())
    }

    // ---- reliable receive pipeline (§4.5) ----------------------------

    /// Blocks until at least one byte has been delivered in order, or an
    /// orderly peer FIN is observed (`Ok(0)`). A bare RTO tick with
    /// nothing inbound is an internal suspension-point detail, never
    /// surfaced to the caller (§9 design decision 3).
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if !self.state.can_send_or_recv() {
            return Err(Error::InvalidState);
        }

        if !self.pending.is_empty() {
            let copied = self.drain_pending_into(buf);
            if copied > 0 {
                return Ok(copied);
            }
        }

        if self.peer_closed {
            return Ok(0);
        }

        loop {
            let ingress = self.io.recv(RTO, self.tracer.as_mut())?;
            let (packet, _from) = match ingress {
                Ingress::Nothing => continue,
                Ingress::Packet(p, from) => (p, from),
            };

            if packet.has_fin() {
                self.handle_peer_fin(&packet);
                return Ok(0);
            }

            if !packet.is_data_bearing() {
                // A bare ACK arriving while we're trying to recv: fold it
                // into sender state and keep waiting for data.
                if packet.has_ack() {
                    self.process_ack(packet.ack_num, packet.window_size);
                }
                continue;
            }

            let copied = self.handle_data_packet(&packet, buf);
            if copied > 0 {
                return Ok(copied);
            }
            // Duplicate/out-of-order/full-OOO cases copy nothing; keep
            // polling for the segment that actually advances recv_seq.
        }
    }

    /// Copies as much of `self.pending` as fits into `buf`, crediting the
    /// copied bytes back against `recv_buffer_used`. Any remainder that
    /// doesn't fit stays queued for the next call instead of being dropped.
    fn drain_pending_into(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        for (i, byte) in self.pending.drain(..n).enumerate() {
            buf[i] = byte;
        }
        self.recv_buffer_used = self.recv_buffer_used.saturating_sub(n);
        n
    }

    fn handle_data_packet(&mut self, packet: &Packet, buf: &mut [u8]) -> usize {
        let len = packet.payload.len();

        if packet.seq_num == self.recv_seq {
            self.tracer.record(TraceEvent::RcvData {
                seq: packet.seq_num,
                len,
            });

            // Accepting the segment advances recv_seq (and is charged
            // against the advertised-window budget) independent of how
            // much of it fits in this call's buffer; anything that
            // doesn't fit is queued in `pending` rather than discarded.
            self.pending.extend(packet.payload.iter().copied());
            self.recv_seq = seq::advance(self.recv_seq, len);
            self.recv_buffer_used = self.recv_buffer_used.saturating_add(len);

            while let Some(next) = self.ooo.take(self.recv_seq) {
                let next_len = next.payload.len();
                self.pending.extend(next.payload.iter().copied());
                self.recv_seq = seq::advance(self.recv_seq, next_len);
                self.recv_buffer_used = self.recv_buffer_used.saturating_add(next_len);
            }

            self.ooo.drop_stale(self.recv_seq);
            self.send_ack();
            self.drain_pending_into(buf)
        } else if seq::gt(packet.seq_num, self.recv_seq) {
            if let Err(e) = self.ooo.insert(packet.clone()) {
                log::debug!("seq={} arrived with the out-of-order buffer full, dropping: {e}", packet.seq_num);
            }
            self.send_ack();
            0
        } else {
            // Already delivered; drop the payload but still ack so the
            // peer's RTO timer doesn't needlessly fire.
            self.send_ack();
            0
        }
    }

    fn send_ack(&mut self) {
        let window = self.advertised_window();
        let ack = Packet::ack(self.send_seq, self.recv_seq, window);
        if self.io.send(&ack).is_ok() {
            self.tracer.record(TraceEvent::SndAck { ack: self.recv_seq });
            self.tracer.record(TraceEvent::FlowWinUpdate { window });
        }
    }

    fn handle_peer_fin(&mut self, packet: &Packet) {
        self.tracer.record(TraceEvent::RcvFin { seq: packet.seq_num });
        if packet.seq_num == self.recv_seq {
            self.recv_seq = seq::advance(self.recv_seq, 1);
        }
        self.peer_closed = true;

        let window = self.advertised_window();
        let ack = Packet::ack(self.send_seq, self.recv_seq, window);
        if self.io.send(&ack).is_ok() {
            self.tracer.record(TraceEvent::SndAckForFin { ack: self.recv_seq });
        }
    }

    // ---- shutdown (§4.6) ----------------------------------------------

    pub fn close(&mut self) -> Result<(), Error> {
        if self.state != State::Established {
            return Err(Error::InvalidState);
        }

        let our_fin_seq = self.send_seq;
        let fin = Packet::fin(self.send_seq, self.recv_seq, self.advertised_window());
        self.io.send(&fin)?;
        self.tracer.record(TraceEvent::SndFin { seq: our_fin_seq });
        self.send_seq = seq::advance(self.send_seq, 1);
        self.state = State::FinWait1;

        log::debug!("close: sent FIN seq={our_fin_seq}, entering FIN_WAIT_1");

        let mut ack_seen = false;
        let mut fin_seen = self.peer_closed;

        while !(ack_seen && fin_seen) {
            let ingress = self.io.recv(RTO, self.tracer.as_mut())?;
            let packet = match ingress {
                Ingress::Nothing => continue,
                Ingress::Packet(p, _) => p,
            };

            if packet.has_ack() && !ack_seen && packet.ack_num == self.send_seq {
                ack_seen = true;
                self.state = State::FinWait2;
            }
            if packet.has_fin() && !fin_seen {
                self.handle_peer_fin(&packet);
                fin_seen = true;
            }
        }

        self.state = State::Closed;
        log::info!("close: both halves observed, connection CLOSED");
        Ok(())
    }
}
