//! Messages reported to the benchmark harness, and how a run ended.
//!
//! The wire form is one tagged line per message: `ready`, `fps:<value>` and
//! `stopped_by_user:<bool>`.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::mpsc;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BenchMessage {
    /// Setup finished, the first frame is about to run.
    Ready,
    Fps(f32),
    /// Sent once when the loop ends. `true` when the window was closed.
    StoppedByUser(bool),
}

impl fmt::Display for BenchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchMessage::Ready => write!(f, "ready"),
            BenchMessage::Fps(value) => write!(f, "fps:{value}"),
            BenchMessage::StoppedByUser(value) => write!(f, "stopped_by_user:{value}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unrecognised benchmark message '{0}'")]
pub struct ParseMessageError(pub String);

impl FromStr for BenchMessage {
    type Err = ParseMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let err = || ParseMessageError(line.to_string());
        if line == "ready" {
            return Ok(BenchMessage::Ready);
        }
        match line.split_once(':') {
            Some(("fps", value)) => value.parse().map(BenchMessage::Fps).map_err(|_| err()),
            Some(("stopped_by_user", value)) => value.parse().map(BenchMessage::StoppedByUser).map_err(|_| err()),
            _ => Err(err()),
        }
    }
}

/// Receives the message stream of a run.
pub trait MessageSink {
    fn send(&mut self, message: BenchMessage);
}

impl MessageSink for mpsc::Sender<BenchMessage> {
    fn send(&mut self, message: BenchMessage) {
        if mpsc::Sender::send(self, message).is_err() {
            log::debug!("benchmark message receiver dropped, discarding {message}");
        }
    }
}

/// Writes each message as a line on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn send(&mut self, message: BenchMessage) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{message}").and_then(|_| out.flush()) {
            log::warn!("Failed to write benchmark message: {}", e);
        }
    }
}

/// Drops every message.
#[derive(Debug, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn send(&mut self, _message: BenchMessage) {}
}

/// Why the frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The configured duration elapsed or the frame limit was reached.
    Completed,
    /// The window was closed.
    StoppedByUser,
    /// The external stop flag was raised.
    Cancelled,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub frames: u64,
    pub elapsed: f32,
    pub fps_samples: Vec<f32>,
}

impl RunReport {
    pub fn average_fps(&self) -> f32 {
        if self.fps_samples.is_empty() {
            return 0.0;
        }
        self.fps_samples.iter().sum::<f32>() / self.fps_samples.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip_through_text() {
        for message in [BenchMessage::Ready, BenchMessage::Fps(59.5), BenchMessage::StoppedByUser(true)] {
            assert_eq!(message.to_string().parse::<BenchMessage>(), Ok(message));
        }
        assert_eq!(BenchMessage::Fps(60.0).to_string(), "fps:60");
        assert_eq!(BenchMessage::StoppedByUser(false).to_string(), "stopped_by_user:false");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!("fps:fast".parse::<BenchMessage>().is_err());
        assert!("hello".parse::<BenchMessage>().is_err());
        assert!("stopped_by_user:maybe".parse::<BenchMessage>().is_err());
    }

    #[test]
    fn sender_sink_delivers_messages() {
        let (mut tx, rx) = mpsc::channel();
        MessageSink::send(&mut tx, BenchMessage::Ready);
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![BenchMessage::Ready]);
    }

    #[test]
    fn average_fps_of_empty_report_is_zero() {
        let report = RunReport {
            outcome: RunOutcome::Completed,
            frames: 0,
            elapsed: 0.0,
            fps_samples: Vec::new(),
        };
        assert_eq!(report.average_fps(), 0.0);
    }
}
