//! A reliable, connection-oriented byte-stream transport layered on top
//! of UDP — a TCP-shaped protocol engine, not an implementation of TCP
//! itself. A three-way handshake establishes a connection, a sliding
//! window sender with cumulative ACKs and RTO-driven retransmission
//! delivers a lossless ordered byte stream, out-of-order datagrams are
//! reassembled on the receive side, a byte-granular advertised window
//! bounds in-flight data, and a collapsed four-way close tears the
//! connection down.
//!
//! This crate covers the core protocol engine only: state machine,
//! packet format, sequence arithmetic, the reliability/retransmission
//! algorithm, the out-of-order reassembly buffer, flow control, and the
//! simulated-loss injection point used for testing. It is not
//! interoperable with TCP, and it has no congestion control: the window
//! enforced is the receiver-advertised one, with a fixed RTO and no RTT
//! estimation or slow start.

mod err;
pub use err::*;

mod seq;
mod timing;
pub use timing::{MAX_RETRIES, MSS, RTO, WINDOW_SIZE};

mod packet;
pub use packet::Packet;

mod trace;
pub use trace::{NullTracer, TextFileTracer, TraceEvent, Tracer};

mod io;

mod window;
mod ooo;

mod state;
pub use state::State;

mod conn;
pub use conn::Connection;

mod listener;
pub use listener::Listener;

mod framing;
pub use framing::{recv_framed, send_framed};
