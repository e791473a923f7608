// crates/recode-core/src/config.rs
//
// JobConfig: the immutable policy for one transcoding job, plus the concrete
// `ResolvedJobConfig` the resolver produces from it. Serde-derived so a batch
// front end can persist job lists as JSON.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── Keep-source sentinel ──────────────────────────────────────────────────────

/// "Keep source" sentinel: either take the value from the input stream or use
/// an explicit one. Legal in `JobConfig`; the resolver replaces every
/// `Keep::Source` with a concrete value before a pipeline is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep<T> {
    Source,
    Value(T),
}

impl<T: Copy> Keep<T> {
    /// Concrete value, substituting `source` for the sentinel.
    pub fn or_source(self, source: Option<T>) -> Option<T> {
        match self {
            Keep::Value(v) => Some(v),
            Keep::Source   => source,
        }
    }
}

// ── Format enums ──────────────────────────────────────────────────────────────

/// Output container selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Mp4,
    Mov,
    Mkv,
    WebM,
    Avi,
    Mp3,
    Flac,
    Wav,
}

impl Container {
    /// Raw audio containers cannot carry a video stream.
    pub fn is_audio_only(self) -> bool {
        matches!(self, Container::Mp3 | Container::Flac | Container::Wav)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4  => "mp4",
            Container::Mov  => "mov",
            Container::Mkv  => "mkv",
            Container::WebM => "webm",
            Container::Avi  => "avi",
            Container::Mp3  => "mp3",
            Container::Flac => "flac",
            Container::Wav  => "wav",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
    Vp8,
    Vp9,
    Mjpeg,
    Png,
    ProRes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Opus,
    Mp3,
    Flac,
    PcmS16le,
    PcmS32le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Yuv420p,
    /// Full-range 4:2:0 — the only format the MJPEG encoder takes.
    Yuvj420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    Rgb24,
    Rgba,
    Yuv422p10le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    S16,
    S32,
    Flt,
    S16Planar,
    S32Planar,
    FltPlanar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(self) -> u32 {
        match self {
            ChannelLayout::Mono   => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

// ── Job configuration ─────────────────────────────────────────────────────────

/// Everything needed to describe one transcoding job.
///
/// `video: None` / `audio: None` drops that stream kind from the output
/// entirely. The output path arrives fully resolved — template expansion and
/// collision handling are the presentation layer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Source media file.
    pub input:          PathBuf,
    pub container:      Container,
    pub video:          Option<VideoConfig>,
    pub audio:          Option<AudioConfig>,
    /// Decoder thread hint; 0 lets the codec pick.
    pub decode_threads: usize,
    /// Encoder thread hint; 0 lets the codec pick.
    pub encode_threads: usize,
    pub output:         PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub codec:        VideoCodec,
    /// Target (width, height); `Keep::Source` keeps input dimensions.
    pub size:         Keep<(u32, u32)>,
    pub pixel_format: Keep<PixelFormat>,
    /// Constant-rate-factor quality, 0..=51 (lower = higher quality).
    /// Ignored by codecs that have no rate control knob here (MJPEG, PNG…).
    pub crf:          u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub codec:          AudioCodec,
    pub channel_layout: Keep<ChannelLayout>,
    pub sample_format:  SampleFormat,
    pub sample_rate:    Keep<u32>,
}

// ── Input stream facts used by the resolver ───────────────────────────────────

/// What the resolver needs to know about the input video stream.
/// `None` fields mean the source value has no equivalent in the core enums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamInfo {
    pub width:        u32,
    pub height:       u32,
    pub pixel_format: Option<PixelFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioStreamInfo {
    pub sample_rate:    u32,
    pub channel_layout: Option<ChannelLayout>,
    pub sample_format:  Option<SampleFormat>,
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// Sentinel-free, capability-checked job description. Only the resolver
/// constructs these; pipelines are built from them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedJobConfig {
    pub input:          PathBuf,
    pub container:      Container,
    pub video:          Option<ResolvedVideo>,
    pub audio:          Option<ResolvedAudio>,
    pub decode_threads: usize,
    pub encode_threads: usize,
    pub output:         PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVideo {
    pub codec:        VideoCodec,
    pub width:        u32,
    pub height:       u32,
    pub pixel_format: PixelFormat,
    pub crf:          u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAudio {
    pub codec:          AudioCodec,
    pub channel_layout: ChannelLayout,
    pub sample_format:  SampleFormat,
    pub sample_rate:    u32,
}

impl From<&ResolvedJobConfig> for JobConfig {
    /// Sentinel-free round trip, used to state resolver idempotence:
    /// `resolve(resolve(cfg).into()) == resolve(cfg)`.
    fn from(r: &ResolvedJobConfig) -> Self {
        JobConfig {
            input:          r.input.clone(),
            container:      r.container,
            video:          r.video.map(|v| VideoConfig {
                codec:        v.codec,
                size:         Keep::Value((v.width, v.height)),
                pixel_format: Keep::Value(v.pixel_format),
                crf:          v.crf,
            }),
            audio:          r.audio.map(|a| AudioConfig {
                codec:          a.codec,
                channel_layout: Keep::Value(a.channel_layout),
                sample_format:  a.sample_format,
                sample_rate:    Keep::Value(a.sample_rate),
            }),
            decode_threads: r.decode_threads,
            encode_threads: r.encode_threads,
            output:         r.output.clone(),
        }
    }
}
