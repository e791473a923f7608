// crates/recode-media/src/reader.rs
//
// Input side of the codec adapter: one demuxer per job, shared by every
// stream pipeline. Packets are fanned out by stream index — the scheduler
// dispatches them — instead of opening the container once per stream, which
// halves the I/O and removes a class of seek-alignment bugs.
//
// PTS/DTS of returned packets are normalised so each stream's first packet
// presents at zero whenever the container declares a start time; pipelines
// and the frame-index grid rely on that.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::media::Type as MediaType;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use recode_core::{AudioStreamInfo, ErrorKind, JobError, VideoStreamInfo};

use crate::convert;

// ── Stream descriptors ────────────────────────────────────────────────────────

/// Facts about one input stream, gathered once at open.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub index:            usize,
    pub kind:             MediaType,
    pub codec_id:         codec::Id,
    pub time_base:        Rational,
    pub duration_seconds: f64,
    pub video:            Option<VideoDetail>,
    pub audio:            Option<AudioDetail>,
}

#[derive(Debug, Clone, Copy)]
pub struct VideoDetail {
    /// Display dimensions from the container — not the coded (macroblock
    /// padded) dimensions the decoder reports.
    pub width:        u32,
    pub height:       u32,
    pub pixel_format: Pixel,
    pub frame_rate:   Rational,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioDetail {
    pub sample_rate:   u32,
    pub channels:      u32,
    pub sample_format: Sample,
}

impl StreamDescriptor {
    /// Plain-data view for the resolver.
    pub fn video_info(&self) -> Option<VideoStreamInfo> {
        self.video.map(|v| VideoStreamInfo {
            width:        v.width,
            height:       v.height,
            pixel_format: convert::pixel_format(v.pixel_format),
        })
    }

    pub fn audio_info(&self) -> Option<AudioStreamInfo> {
        self.audio.map(|a| AudioStreamInfo {
            sample_rate:    a.sample_rate,
            channel_layout: convert::layout_for_channels(a.channels),
            sample_format:  convert::sample_format(a.sample_format),
        })
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

pub struct Reader {
    ictx:          format::context::Input,
    path:          PathBuf,
    descriptors:   Vec<StreamDescriptor>,
    /// Per-stream PTS offset (the stream's declared start time, 0 if absent).
    start_offsets: Vec<i64>,
}

impl Reader {
    pub fn open(path: &Path) -> Result<Self, JobError> {
        crate::ensure_init();

        let ictx = format::input(&path).map_err(|e| {
            let kind = match e {
                ffmpeg::Error::InvalidData => ErrorKind::OpenFormat,
                _                          => ErrorKind::OpenIo,
            };
            JobError::new(kind, format!("open '{}': {e}", path.display()))
        })?;

        // Container duration is the fallback when a stream has none of its own.
        let container_duration = {
            let d = ictx.duration();
            if d > 0 { d as f64 / ffmpeg::ffi::AV_TIME_BASE as f64 } else { 0.0 }
        };

        let mut descriptors   = Vec::new();
        let mut start_offsets = Vec::new();
        for stream in ictx.streams() {
            descriptors.push(describe(&stream, container_duration));
            let start = stream.start_time();
            start_offsets.push(if start == ffmpeg::ffi::AV_NOPTS_VALUE { 0 } else { start });
        }

        Ok(Self { ictx, path: path.to_path_buf(), descriptors, start_offsets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, index: usize) -> Option<&StreamDescriptor> {
        self.descriptors.get(index)
    }

    /// Index of the container's preferred stream of `kind`, if any.
    pub fn best_stream(&self, kind: MediaType) -> Option<usize> {
        self.ictx.streams().best(kind).map(|s| s.index())
    }

    /// Next packet with normalised timestamps, `None` at end of stream.
    pub fn read_packet(&mut self) -> Result<Option<(usize, Packet)>, JobError> {
        match self.ictx.packets().next() {
            None => Ok(None),
            Some(Err(e)) => Err(JobError::new(ErrorKind::ReadIo, format!("read packet: {e}"))),
            Some(Ok((stream, mut packet))) => {
                let index  = stream.index();
                let offset = self.start_offsets.get(index).copied().unwrap_or(0);
                if offset != 0 {
                    if let Some(pts) = packet.pts() {
                        packet.set_pts(Some(pts - offset));
                    }
                    if let Some(dts) = packet.dts() {
                        packet.set_dts(Some(dts - offset));
                    }
                }
                Ok(Some((index, packet)))
            }
        }
    }

    /// Seek backward to the keyframe at or before `seconds`. Decoders fed
    /// from this reader should be fresh or flushed afterwards.
    pub fn seek(&mut self, seconds: f64) -> Result<(), JobError> {
        let ts = (seconds * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
        self.ictx.seek(ts, ..=ts).map_err(|e| {
            JobError::new(ErrorKind::ReadIo, format!("seek to {seconds}s: {e}"))
        })
    }

    /// Open a video decoder for stream `index`.
    pub fn video_decoder(
        &self,
        index:   usize,
        threads: usize,
    ) -> Result<ffmpeg::decoder::video::Video, JobError> {
        let mut ctx = self.decoder_context(index)?;
        set_thread_hint(&mut ctx, threads);
        ctx.decoder().video().map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("open video decoder: {e}"))
        })
    }

    pub fn audio_decoder(
        &self,
        index:   usize,
        threads: usize,
    ) -> Result<ffmpeg::decoder::audio::Audio, JobError> {
        let mut ctx = self.decoder_context(index)?;
        set_thread_hint(&mut ctx, threads);
        ctx.decoder().audio().map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("open audio decoder: {e}"))
        })
    }

    fn decoder_context(&self, index: usize) -> Result<codec::context::Context, JobError> {
        let stream = self.ictx.stream(index).ok_or_else(|| {
            JobError::new(ErrorKind::OpenFormat, format!("no stream at index {index}"))
        })?;
        codec::context::Context::from_parameters(stream.parameters()).map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("decoder context: {e}"))
        })
    }
}

fn set_thread_hint(ctx: &mut codec::context::Context, threads: usize) {
    if threads > 0 {
        // No safe setter for thread_count in this version of the bindings.
        unsafe {
            (*ctx.as_mut_ptr()).thread_count = threads as i32;
        }
    }
}

fn describe(stream: &format::stream::Stream, container_duration: f64) -> StreamDescriptor {
    let time_base = stream.time_base();
    let duration_seconds = {
        let d = stream.duration();
        if d > 0 { d as f64 * f64::from(time_base) } else { container_duration }
    };

    let params = stream.parameters();
    let (kind, codec_id, width, height) = unsafe {
        let p = params.as_ptr();
        (
            MediaType::from((*p).codec_type),
            codec::Id::from((*p).codec_id),
            (*p).width.max(0) as u32,
            (*p).height.max(0) as u32,
        )
    };

    // Formats come from a throwaway decoder context — the container-level
    // `format` field is just an integer and the decoder knows better anyway.
    let mut video = None;
    let mut audio = None;
    match kind {
        MediaType::Video => {
            if let Ok(dec) = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|c| c.decoder().video())
            {
                let frame_rate = pick_frame_rate(stream);
                // Display dimensions from the container when present; decoder
                // dimensions include macroblock padding (1920×1088 for 1080p).
                let (w, h) = if width > 0 && height > 0 {
                    (width, height)
                } else {
                    (dec.width(), dec.height())
                };
                video = Some(VideoDetail {
                    width:        w,
                    height:       h,
                    pixel_format: dec.format(),
                    frame_rate,
                });
            }
        }
        MediaType::Audio => {
            if let Ok(dec) = codec::context::Context::from_parameters(stream.parameters())
                .and_then(|c| c.decoder().audio())
            {
                audio = Some(AudioDetail {
                    sample_rate:   dec.rate(),
                    channels:      dec.ch_layout().channels() as u32,
                    sample_format: dec.format(),
                });
            }
        }
        _ => {}
    }

    StreamDescriptor {
        index: stream.index(),
        kind,
        codec_id,
        time_base,
        duration_seconds,
        video,
        audio,
    }
}

fn pick_frame_rate(stream: &format::stream::Stream) -> Rational {
    let avg = stream.avg_frame_rate();
    if avg.numerator() > 0 {
        return avg;
    }
    let real = stream.rate();
    if real.numerator() > 0 {
        return real;
    }
    Rational::new(30, 1)
}
