// crates/recode-media/src/lib.rs
//
// FFmpeg-backed transcode engine: codec adapter wrappers, per-stream
// pipelines, the interleave scheduler, the job runner, and the bounded
// transcode queue. Plain policy types live in recode-core.

use std::sync::Once;

pub mod cancel;
pub mod convert;
pub mod params;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod resample;
pub mod runner;
pub mod scheduler;
pub mod timestamp;
pub mod writer;

pub use cancel::CancelFlag;
pub use queue::TranscodeQueue;
pub use reader::{Reader, StreamDescriptor};
pub use runner::run_job;
pub use writer::Writer;

pub use recode_core::{
    AudioCodec, AudioConfig, ChannelLayout, Container, ErrorKind, JobConfig, JobError, JobEvent,
    JobId, JobState, Keep, PixelFormat, SampleFormat, VideoCodec, VideoConfig,
};

static FFMPEG_INIT: Once = Once::new();

/// Idempotent codec-library initialisation; every adapter entry point calls
/// this so embedders don't have to.
pub(crate) fn ensure_init() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_the_third::init() {
            log::warn!("ffmpeg init: {e}");
        }
    });
}
