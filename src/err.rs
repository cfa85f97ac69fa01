use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("operation invalid in current connection state")]
    InvalidState,

    #[error("malformed datagram: {0}")]
    MalformedDatagram(&'static str),

    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    #[error("peer unreachable after {0} retransmits")]
    PeerUnreachable(u32),

    #[error("socket failure: {0}")]
    SocketFailure(#[from] io::Error),

    #[error("out-of-order buffer has no free slot")]
    BufferFull,
}
