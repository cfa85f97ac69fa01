//! Connection state machine (§3, §4.3, §4.6):
//!
//! ```text
//!                          active OPEN, snd SYN
//!   CLOSED ------------------------------------------> SYN_SENT
//!                                                          |
//!                        passive OPEN                      | rcv SYN+ACK
//!   CLOSED -----> LISTEN --- rcv SYN, snd SYN+ACK -->       | snd ACK
//!                                                 \         V
//!                                          SYN_RECEIVED -> ESTABLISHED
//!                                          rcv ACK of SYN      |
//!                                                               | CLOSE
//!                                                               | snd FIN
//!                                                               V
//!                                                          FIN_WAIT_1
//!                                                          rcv ACK of FIN -> FIN_WAIT_2
//!                                                          rcv FIN, snd ACK -> CLOSED
//! ```
//!
//! Additional TCP-style closing states (CLOSE_WAIT, CLOSING, LAST_ACK,
//! TIME_WAIT) are reserved by the design doc but not required for
//! conforming behavior; this crate collapses straight to CLOSED once both
//! halves of the close handshake are observed (§4.6).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
}

impl State {
    pub fn can_send_or_recv(self) -> bool {
        matches!(self, State::Established)
    }
}
