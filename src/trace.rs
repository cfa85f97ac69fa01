//! Structural protocol trace.
//!
//! Every externally observable protocol event (§6 of the design doc) is
//! handed to a caller-supplied [`Tracer`] as a typed [`TraceEvent`] rather
//! than being formatted inline. This keeps the core agnostic to file
//! naming, role strings, and timestamp formatting — all driver concerns —
//! while still letting a driver reproduce the original line-oriented log
//! verbatim via [`TextFileTracer`].

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    SndSyn { seq: u32 },
    RcvSyn { seq: u32 },
    SndSynAck { seq: u32, ack: u32 },
    RcvSynAck { seq: u32, ack: u32 },
    SndAck { ack: u32 },
    SndData { seq: u32, len: usize },
    RcvData { seq: u32, len: usize },
    RetxData { seq: u32, len: usize },
    TimeoutSeq { seq: u32 },
    DropData { seq: u32 },
    FlowWinUpdate { window: u16 },
    SndFin { seq: u32 },
    RcvFin { seq: u32 },
    SndAckForFin { ack: u32 },
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEvent::SndSyn { seq } => write!(f, "SND SYN SEQ={seq}"),
            TraceEvent::RcvSyn { seq } => write!(f, "RCV SYN SEQ={seq}"),
            TraceEvent::SndSynAck { seq, ack } => write!(f, "SND SYN-ACK SEQ={seq} ACK={ack}"),
            TraceEvent::RcvSynAck { seq, ack } => write!(f, "RCV SYN-ACK SEQ={seq} ACK={ack}"),
            TraceEvent::SndAck { ack } => write!(f, "SND ACK ACK={ack}"),
            TraceEvent::SndData { seq, len } => write!(f, "SND DATA SEQ={seq} LEN={len}"),
            TraceEvent::RcvData { seq, len } => write!(f, "RCV DATA SEQ={seq} LEN={len}"),
            TraceEvent::RetxData { seq, len } => write!(f, "RETX DATA SEQ={seq} LEN={len}"),
            TraceEvent::TimeoutSeq { seq } => write!(f, "TIMEOUT SEQ={seq}"),
            TraceEvent::DropData { seq } => write!(f, "DROP DATA SEQ={seq}"),
            TraceEvent::FlowWinUpdate { window } => write!(f, "FLOW WIN UPDATE={window}"),
            TraceEvent::SndFin { seq } => write!(f, "SND FIN SEQ={seq}"),
            TraceEvent::RcvFin { seq } => write!(f, "RCV FIN SEQ={seq}"),
            TraceEvent::SndAckForFin { ack } => write!(f, "SND ACK FOR FIN ACK={ack}"),
        }
    }
}

/// A sink for [`TraceEvent`]s. The default, [`NullTracer`], discards
/// everything; a driver that wants the original's verbose log wires up
/// [`TextFileTracer`] (or its own) instead.
pub trait Tracer: std::fmt::Debug + Send {
    fn record(&mut self, event: TraceEvent);
}

#[derive(Debug, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn record(&mut self, _event: TraceEvent) {}
}

/// Reproduces the original C implementation's verbose log line shape:
/// a leading timestamp followed by the event text.
#[derive(Debug)]
pub struct TextFileTracer {
    file: File,
}

impl TextFileTracer {
    pub fn create(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(TextFileTracer { file })
    }
}

impl Tracer for TextFileTracer {
    fn record(&mut self, event: TraceEvent) {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        // Best-effort: a tracer write failing is not a protocol error.
        let _ = writeln!(self.file, "[{millis}] {event}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_events_like_the_original_log() {
        assert_eq!(TraceEvent::SndSyn { seq: 1000 }.to_string(), "SND SYN SEQ=1000");
        assert_eq!(
            TraceEvent::SndData { seq: 1001, len: 5 }.to_string(),
            "SND DATA SEQ=1001 LEN=5"
        );
        assert_eq!(
            TraceEvent::DropData { seq: 2048 }.to_string(),
            "DROP DATA SEQ=2048"
        );
    }
}
