// crates/recode-core/src/job.rs
//
// Job lifecycle types that flow across the channel between the transcode
// engine and whatever front end drives it. No ffmpeg — just plain data.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier used in all progress / success / failure events.
pub type JobId = Uuid;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Coarse failure category surfaced to listeners alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Input file could not be opened (missing, unreadable).
    OpenIo,
    /// Input opened but the container could not be parsed.
    OpenFormat,
    /// The requested codec is not present in the codec library build.
    CodecUnavailable,
    /// Decoder/encoder construction failed.
    CodecInit,
    /// Demuxer read error mid-stream.
    ReadIo,
    Decoder,
    Encoder,
    Writer,
    Cancelled,
    /// JobConfig rejected by the resolver.
    ConfigInvalid,
    /// A keep-source value resolved to something the chosen codec cannot take.
    UnsupportedCombination,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::OpenIo                 => "open i/o",
            ErrorKind::OpenFormat             => "open format",
            ErrorKind::CodecUnavailable       => "codec unavailable",
            ErrorKind::CodecInit              => "codec init",
            ErrorKind::ReadIo                 => "read i/o",
            ErrorKind::Decoder                => "decoder",
            ErrorKind::Encoder                => "encoder",
            ErrorKind::Writer                 => "writer",
            ErrorKind::Cancelled              => "cancelled",
            ErrorKind::ConfigInvalid          => "config invalid",
            ErrorKind::UnsupportedCombination => "unsupported combination",
        };
        f.write_str(name)
    }
}

/// One `Fail(kind, message)` per job; the kind is annotated but never
/// transformed as it bubbles pipeline → scheduler → runner → listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind:    ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

// ── Job state ─────────────────────────────────────────────────────────────────

/// One-shot, monotone lifecycle — the only backward edge is Failed→Prepared
/// on an explicit retry, performed by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Prepared,
    Running,
    Succeeded,
    Failed(JobError),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed(_) | JobState::Cancelled)
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Messages sent from job workers to the presentation layer.
///
/// At most one `Progress` per scheduler burst; `Succeeded` carries the final
/// 1.0 implicitly. `Cancelled` is its own terminal event, not a `Failed`.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress  { job_id: JobId, value: f64 },
    Succeeded { job_id: JobId, output: PathBuf },
    Failed    { job_id: JobId, error: JobError },
    Cancelled { job_id: JobId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Prepared.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed(JobError::cancelled()).is_terminal());
    }

    #[test]
    fn error_display_carries_kind_and_message() {
        let e = JobError::new(ErrorKind::Decoder, "bad NAL unit");
        assert_eq!(e.to_string(), "decoder: bad NAL unit");
    }
}
