//! Session counters and the end-of-session report.
//!
//! Counters are lock-free and shared by every stage through the supervisor.
//! When a session ends its counters are frozen into a [`SessionReport`],
//! which the binaries print to stdout as a single JSON line.
//!
//! # Important
//!
//! - **stdout**: the report only (one JSON object per line)
//! - **stderr**: logs
//! - **Never use `println!`** for the report; it may add `\r\n` on Windows

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::session::Role;

/// Live counters for one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    frames_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SessionStats {
    /// Count a frame reassembled by the InboundPump.
    pub fn record_received_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one inbound wire message carrying `body_len` bytes.
    pub fn record_received_message(&self, body_len: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(body_len as u64, Ordering::Relaxed);
    }

    /// Count a frame that made it through processing or rendering.
    pub fn record_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped frame. Returns the new total.
    pub fn record_dropped(&self) -> u64 {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a frame fully written by the OutboundPump.
    pub fn record_sent_frame(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `count` outbound wire messages carrying `body_len` bytes total.
    pub fn record_sent_messages(&self, count: usize, body_len: usize) {
        self.messages_sent
            .fetch_add(count as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(body_len as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frames_sent: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Summary of a session that ended without a fatal error.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub role: Role,
    pub elapsed_ms: u64,
    /// Frames delivered per second over the whole session.
    pub fps: f64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

impl SessionReport {
    pub fn new(role: Role, elapsed: Duration, stats: StatsSnapshot) -> Self {
        let delivered = match role {
            Role::Initiator => stats.frames_processed,
            Role::Responder => stats.frames_sent,
        };
        let secs = elapsed.as_secs_f64();
        let fps = if secs > 0.0 {
            delivered as f64 / secs
        } else {
            0.0
        };

        Self {
            role,
            elapsed_ms: elapsed.as_millis() as u64,
            fps,
            stats,
        }
    }
}

/// Write a line to stdout followed by a single `\n`, and flush.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()
}

/// Serialize `value` and write it to stdout as one line.
pub fn write_stdout_json<T: Serialize>(value: &T) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)?;
    write_stdout_line(&json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = SessionStats::default();
        stats.record_received_message(1024);
        stats.record_received_message(9);
        stats.record_received_frame();
        stats.record_sent_messages(3, 2048);
        stats.record_sent_frame();
        assert_eq!(stats.record_dropped(), 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.bytes_received, 1033);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.messages_sent, 3);
        assert_eq!(snapshot.bytes_sent, 2048);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.frames_dropped, 1);
    }

    #[test]
    fn test_report_json_is_flat() {
        let stats = StatsSnapshot {
            frames_processed: 30,
            ..Default::default()
        };
        let report = SessionReport::new(Role::Initiator, Duration::from_secs(2), stats);
        assert!((report.fps - 15.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["role"], "initiator");
        assert_eq!(json["elapsed_ms"], 2000);
        assert_eq!(json["frames_processed"], 30);
    }

    #[test]
    fn test_zero_elapsed_has_zero_fps() {
        let report = SessionReport::new(Role::Responder, Duration::ZERO, StatsSnapshot::default());
        assert_eq!(report.fps, 0.0);
    }

    #[test]
    fn test_write_stdout_json() {
        let report = SessionReport::new(Role::Responder, Duration::from_millis(5), StatsSnapshot::default());
        assert!(write_stdout_json(&report).is_ok());
    }
}
