//! Protocol-wide time constants and the timeout predicate.

use std::time::{Duration, Instant};

/// Maximum Segment Size: payload bytes carried by one data packet.
pub const MSS: usize = 1024;

/// Sender window capacity, in segments.
pub const WINDOW_SIZE: usize = 10;

/// Fixed retransmission timeout. No RTT estimation, no backoff.
pub const RTO: Duration = Duration::from_millis(500);

/// Maximum number of retransmits for a single window entry before the
/// connection is declared unreachable.
pub const MAX_RETRIES: u32 = 5;

/// Default advertised-window budget for freshly created connections.
pub const DEFAULT_RECV_BUFFER_SIZE: u16 = 16 * 1024;

/// Sleep used while the send window is saturated.
pub const WINDOW_FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Sleep used while flow control forbids sending the next chunk.
pub const FLOW_CONTROL_BACKOFF: Duration = Duration::from_millis(10);

/// Has `since` aged past `RTO`?
pub fn is_timed_out(since: Instant) -> bool {
    since.elapsed() >= RTO
}
