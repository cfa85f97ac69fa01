//! Wire packet: fixed 12-byte header + up to `timing::MSS` payload bytes.
//!
//! Header fields are kept in host order inside [`Packet`]; the big-endian
//! conversion happens exactly once, at [`Packet::encode`] / [`Packet::decode`].
//! Retransmission re-sends the bytes [`Packet::encode`] already produced
//! rather than re-deriving them, so there is never a second byte-swap to get
//! wrong.

use crate::timing::MSS;
use crate::Error;

pub const HEADER_LEN: usize = 12;
pub const MAX_PACKET_LEN: usize = HEADER_LEN + MSS;

pub const SYN: u16 = 0x1;
pub const ACK: u16 = 0x2;
pub const FIN: u16 = 0x4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq_num: u32,
    pub ack_num: u32,
    pub flags: u16,
    pub window_size: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq_num: u32, ack_num: u32, flags: u16, window_size: u16, payload: &[u8]) -> Self {
        Packet {
            seq_num,
            ack_num,
            flags,
            window_size,
            payload: payload.to_vec(),
        }
    }

    pub fn syn(seq_num: u32, window_size: u16) -> Self {
        Packet::new(seq_num, 0, SYN, window_size, &[])
    }

    pub fn syn_ack(seq_num: u32, ack_num: u32, window_size: u16) -> Self {
        Packet::new(seq_num, ack_num, SYN | ACK, window_size, &[])
    }

    pub fn ack(seq_num: u32, ack_num: u32, window_size: u16) -> Self {
        Packet::new(seq_num, ack_num, ACK, window_size, &[])
    }

    pub fn fin(seq_num: u32, ack_num: u32, window_size: u16) -> Self {
        Packet::new(seq_num, ack_num, FIN, window_size, &[])
    }

    pub fn data(seq_num: u32, ack_num: u32, window_size: u16, payload: &[u8]) -> Self {
        Packet::new(seq_num, ack_num, 0, window_size, payload)
    }

    pub fn has_syn(&self) -> bool {
        self.flags & SYN != 0
    }

    pub fn has_ack(&self) -> bool {
        self.flags & ACK != 0
    }

    pub fn has_fin(&self) -> bool {
        self.flags & FIN != 0
    }

    pub fn is_data_bearing(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Sequence space occupied by this packet: SYN and FIN each consume one
    /// notional sequence number in addition to any payload bytes.
    pub fn seq_len(&self) -> usize {
        let control = usize::from(self.has_syn()) + usize::from(self.has_fin());
        self.payload.len() + control
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq_num.to_be_bytes());
        buf.extend_from_slice(&self.ack_num.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.window_size.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::MalformedDatagram("datagram shorter than header"));
        }
        let payload_len = buf.len() - HEADER_LEN;
        if payload_len > MSS {
            return Err(Error::MalformedDatagram("payload exceeds MSS"));
        }

        let seq_num = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let ack_num = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let flags = u16::from_be_bytes(buf[8..10].try_into().unwrap());
        let window_size = u16::from_be_bytes(buf[10..12].try_into().unwrap());

        Ok(Packet {
            seq_num,
            ack_num,
            flags,
            window_size,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_data_packet() {
        let p = Packet::data(42, 7, 16384, b"hello");
        let encoded = p.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn round_trips_control_flags() {
        for p in [
            Packet::syn(1000, 16384),
            Packet::syn_ack(5000, 1001, 16384),
            Packet::ack(1001, 5001, 16384),
            Packet::fin(2024, 6000, 16384),
        ] {
            assert_eq!(p, Packet::decode(&p.encode()).unwrap());
        }
    }

    #[test]
    fn rejects_short_datagram() {
        let buf = [0u8; HEADER_LEN - 1];
        assert!(matches!(
            Packet::decode(&buf),
            Err(Error::MalformedDatagram(_))
        ));
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut buf = vec![0u8; HEADER_LEN + MSS + 1];
        buf[8..10].copy_from_slice(&0u16.to_be_bytes());
        assert!(matches!(
            Packet::decode(&buf),
            Err(Error::MalformedDatagram(_))
        ));
    }

    #[test]
    fn seq_len_accounts_for_control_bits() {
        assert_eq!(Packet::syn(0, 0).seq_len(), 1);
        assert_eq!(Packet::fin(0, 0, 0).seq_len(), 1);
        assert_eq!(Packet::data(0, 0, 0, b"abc").seq_len(), 3);
        assert_eq!(Packet::ack(0, 0, 0).seq_len(), 0);
    }
}
