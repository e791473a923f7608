// crates/recode-media/src/pipeline.rs
//
// Per-stream pipelines: input packet → decoder → (scaler | resampler) →
// encoder → TimestampMapper → muxer-ready packets. One pipeline per kept
// stream; the scheduler owns the read loop and feeds packets in.
//
// PTS strategy:
//   Video: monotonically increasing frame counter mapped onto the encoder
//   time base (`timestamp::video_pts`). The grid has
//   `round(duration × fps)` slots; frames decoded past the last slot are
//   dropped.
//   Audio: monotonically increasing sample counter in 1/sample_rate. The
//   counter advances by each full encoder frame; the short remainder frame at
//   end of stream keeps the current counter value and does not advance it.
//
// End-of-stream protocol (`flush`): null to the decoder and drain, null to
// the resampler and drain (audio), null to the encoder and drain. The
// `FlushPhase` marker enforces that no input packet is accepted once the
// pipeline has left `Active`.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{Context as ScaleContext, Flags as ScaleFlags};
use ffmpeg::util::error::EAGAIN;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::{decoder, encoder, Error as FfmpegError, Packet};

use recode_core::{ErrorKind, JobError};

use crate::resample::Resampler;
use crate::timestamp::{video_pts, TimestampMapper};

// ── Shared bits ───────────────────────────────────────────────────────────────

/// What a pipeline did with an input packet.
pub enum PushResult {
    /// Not this pipeline's stream — caller discards.
    Absorbed,
    /// Packet consumed; zero or more muxer-ready packets came out.
    Drained(Vec<Packet>),
    /// The pipeline has left its Active phase and takes no more input.
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    Active,
    DecoderDrained,
    ResamplerDrained,
    EncoderDrained,
    Done,
}

fn decoder_err(e: FfmpegError) -> JobError {
    JobError::new(ErrorKind::Decoder, e.to_string())
}

fn encoder_err(e: FfmpegError) -> JobError {
    JobError::new(ErrorKind::Encoder, e.to_string())
}

/// `true` to keep receiving, `false` on EAGAIN/EOF, error otherwise.
fn recv_more(result: Result<(), FfmpegError>, err: fn(FfmpegError) -> JobError) -> Result<bool, JobError> {
    match result {
        Ok(()) => Ok(true),
        Err(FfmpegError::Other { errno: EAGAIN }) | Err(FfmpegError::Eof) => Ok(false),
        Err(e) => Err(err(e)),
    }
}

/// EAGAIN and EOF on a null send just mean the codec is already flushing.
fn eof_sent(result: Result<(), FfmpegError>, err: fn(FfmpegError) -> JobError) -> Result<(), JobError> {
    match result {
        Ok(()) | Err(FfmpegError::Other { errno: EAGAIN }) | Err(FfmpegError::Eof) => Ok(()),
        Err(e) => Err(err(e)),
    }
}

// ── Video pipeline ────────────────────────────────────────────────────────────

pub struct VideoPipeline {
    input_index:  usize,
    decoder:      decoder::video::Video,
    /// Created on the first decoded frame — only then is the real input pixel
    /// format known. Runs on every frame, even identity conversions: the
    /// scaler also normalises stride alignment.
    scaler:       Option<ScaleContext>,
    encoder:      encoder::video::Video,
    mapper:       TimestampMapper,
    /// Display dimensions — not the decoder's macroblock-padded ones.
    src_width:    u32,
    src_height:   u32,
    dst_width:    u32,
    dst_height:   u32,
    dst_format:   Pixel,
    fps:          Rational,
    enc_tb:       Rational,
    frame_offset: i64,
    total_frames: i64,
    phase:        FlushPhase,
}

impl VideoPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_index:  usize,
        decoder:      decoder::video::Video,
        encoder:      encoder::video::Video,
        mapper:       TimestampMapper,
        src_size:     (u32, u32),
        dst_size:     (u32, u32),
        dst_format:   Pixel,
        fps:          Rational,
        enc_tb:       Rational,
        total_frames: i64,
    ) -> Self {
        Self {
            input_index,
            decoder,
            scaler: None,
            encoder,
            mapper,
            src_width: src_size.0,
            src_height: src_size.1,
            dst_width: dst_size.0,
            dst_height: dst_size.1,
            dst_format,
            fps,
            enc_tb,
            frame_offset: 0,
            total_frames: total_frames.max(1),
            phase: FlushPhase::Active,
        }
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// Media time of the next output frame, in seconds.
    pub fn media_time(&self) -> f64 {
        self.frame_offset as f64 / f64::from(self.fps)
    }

    pub fn grid_complete(&self) -> bool {
        self.frame_offset >= self.total_frames
    }

    pub fn frames_encoded(&self) -> i64 {
        self.frame_offset
    }

    pub fn progress(&self) -> f64 {
        self.frame_offset as f64 / self.total_frames as f64
    }

    pub fn push_packet(&mut self, packet: &Packet) -> Result<PushResult, JobError> {
        if packet.stream() != self.input_index {
            return Ok(PushResult::Absorbed);
        }
        if self.phase != FlushPhase::Active {
            return Ok(PushResult::Ended);
        }
        self.decoder.send_packet(packet).map_err(decoder_err)?;
        let mut out = Vec::new();
        self.drain_decoded(&mut out)?;
        Ok(PushResult::Drained(out))
    }

    /// End-of-stream drain; leaves the pipeline in `Done`.
    pub fn flush(&mut self) -> Result<Vec<Packet>, JobError> {
        let mut out = Vec::new();
        if self.phase == FlushPhase::Active {
            // Codecs with frame reordering hold pictures back; EOF flushes them.
            let _ = self.decoder.send_eof();
            self.drain_decoded(&mut out)?;
            self.phase = FlushPhase::DecoderDrained;
        }
        if self.phase == FlushPhase::DecoderDrained {
            self.phase = FlushPhase::ResamplerDrained; // no resampler on video
        }
        if self.phase == FlushPhase::ResamplerDrained {
            eof_sent(self.encoder.send_eof(), encoder_err)?;
            self.drain_encoder(&mut out)?;
            self.phase = FlushPhase::EncoderDrained;
        }
        self.phase = FlushPhase::Done;
        Ok(out)
    }

    fn drain_decoded(&mut self, out: &mut Vec<Packet>) -> Result<(), JobError> {
        let mut decoded = VideoFrame::empty();
        while recv_more(self.decoder.receive_frame(&mut decoded), decoder_err)? {
            if self.grid_complete() {
                continue; // grid full — drop the excess tail
            }

            if self.scaler.is_none() {
                let s = ScaleContext::get(
                    decoded.format(),
                    self.src_width,
                    self.src_height,
                    self.dst_format,
                    self.dst_width,
                    self.dst_height,
                    ScaleFlags::BILINEAR,
                )
                .map_err(|e| {
                    JobError::new(ErrorKind::CodecInit, format!("create scaler: {e}"))
                })?;
                self.scaler = Some(s);
            }

            let mut scaled = VideoFrame::empty();
            if let Some(scaler) = self.scaler.as_mut() {
                scaler
                    .run(&decoded, &mut scaled)
                    .map_err(|e| JobError::new(ErrorKind::Decoder, format!("scale frame: {e}")))?;
            }

            scaled.set_pts(Some(video_pts(self.frame_offset, self.fps, self.enc_tb)));
            scaled.set_kind(decoded.kind());
            // swscale inherits the source SAR; force square pixels so players
            // don't letterbox. No safe setter in this version of the bindings.
            unsafe {
                (*scaled.as_mut_ptr()).sample_aspect_ratio =
                    ffmpeg::ffi::AVRational { num: 1, den: 1 };
            }
            self.frame_offset += 1;

            self.encoder.send_frame(&scaled).map_err(encoder_err)?;
            self.drain_encoder(out)?;
        }
        Ok(())
    }

    fn drain_encoder(&mut self, out: &mut Vec<Packet>) -> Result<(), JobError> {
        let mut packet = Packet::empty();
        while recv_more(self.encoder.receive_packet(&mut packet), encoder_err)? {
            self.mapper.finalise(&mut packet);
            out.push(std::mem::replace(&mut packet, Packet::empty()));
        }
        Ok(())
    }
}

// ── Audio pipeline ────────────────────────────────────────────────────────────

pub struct AudioPipeline {
    input_index:      usize,
    decoder:          decoder::audio::Audio,
    /// Created on the first decoded frame, like the video scaler.
    resampler:        Option<Resampler>,
    encoder:          encoder::Audio,
    mapper:           TimestampMapper,
    dst_format:       ffmpeg::format::Sample,
    dst_layout:       recode_core::ChannelLayout,
    dst_rate:         u32,
    /// Fixed encoder frame size, or the FIFO chunk for variable encoders.
    frame_samples:    usize,
    /// Sum of all full frame sizes submitted to the encoder so far; also the
    /// PTS of the next frame in 1/dst_rate.
    sample_offset:    i64,
    expected_samples: i64,
    phase:            FlushPhase,
}

impl AudioPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input_index:      usize,
        decoder:          decoder::audio::Audio,
        encoder:          encoder::Audio,
        mapper:           TimestampMapper,
        dst_format:       ffmpeg::format::Sample,
        dst_layout:       recode_core::ChannelLayout,
        dst_rate:         u32,
        frame_samples:    usize,
        expected_samples: i64,
    ) -> Self {
        Self {
            input_index,
            decoder,
            resampler: None,
            encoder,
            mapper,
            dst_format,
            dst_layout,
            dst_rate,
            frame_samples: frame_samples.max(1),
            sample_offset: 0,
            expected_samples: expected_samples.max(1),
            phase: FlushPhase::Active,
        }
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// Media time of the last encoded sample, in seconds.
    pub fn media_time(&self) -> f64 {
        self.sample_offset as f64 / self.dst_rate as f64
    }

    pub fn samples_encoded(&self) -> i64 {
        self.sample_offset
    }

    pub fn progress(&self) -> f64 {
        self.sample_offset as f64 / self.expected_samples as f64
    }

    pub fn push_packet(&mut self, packet: &Packet) -> Result<PushResult, JobError> {
        if packet.stream() != self.input_index {
            return Ok(PushResult::Absorbed);
        }
        if self.phase != FlushPhase::Active {
            return Ok(PushResult::Ended);
        }
        self.decoder.send_packet(packet).map_err(decoder_err)?;
        let mut out = Vec::new();
        self.drain_decoded(&mut out)?;
        Ok(PushResult::Drained(out))
    }

    pub fn flush(&mut self) -> Result<Vec<Packet>, JobError> {
        let mut out = Vec::new();
        if self.phase == FlushPhase::Active {
            let _ = self.decoder.send_eof();
            self.drain_decoded(&mut out)?;
            self.phase = FlushPhase::DecoderDrained;
        }
        if self.phase == FlushPhase::DecoderDrained {
            if let Some(rs) = self.resampler.as_mut() {
                rs.push_null()?;
            }
            self.encode_full_frames(&mut out)?;

            // The tail is shorter than a full frame: it keeps the current
            // sample counter as PTS and the counter does NOT advance.
            let remainder = match self.resampler.as_mut() {
                Some(rs) => rs.pull_remainder(),
                None     => None,
            };
            if let Some(mut frame) = remainder {
                frame.set_pts(Some(self.sample_offset));
                self.encoder.send_frame(&frame).map_err(encoder_err)?;
                self.drain_encoder(&mut out)?;
            }
            self.phase = FlushPhase::ResamplerDrained;
        }
        if self.phase == FlushPhase::ResamplerDrained {
            eof_sent(self.encoder.send_eof(), encoder_err)?;
            self.drain_encoder(&mut out)?;
            self.phase = FlushPhase::EncoderDrained;
        }
        self.phase = FlushPhase::Done;
        Ok(out)
    }

    fn drain_decoded(&mut self, out: &mut Vec<Packet>) -> Result<(), JobError> {
        let mut decoded = AudioFrame::empty();
        while recv_more(self.decoder.receive_frame(&mut decoded), decoder_err)? {
            if self.resampler.is_none() {
                self.resampler = Some(Resampler::for_input(
                    &decoded,
                    self.dst_format,
                    self.dst_layout,
                    self.dst_rate,
                )?);
            }
            if let Some(rs) = self.resampler.as_mut() {
                rs.push(&decoded)?;
            }
            self.encode_full_frames(out)?;
        }
        Ok(())
    }

    /// Pop every complete encoder frame off the FIFO and encode it.
    fn encode_full_frames(&mut self, out: &mut Vec<Packet>) -> Result<(), JobError> {
        loop {
            let frame = match self.resampler.as_mut() {
                Some(rs) => rs.pull_exact(self.frame_samples),
                None     => None,
            };
            let Some(mut frame) = frame else { return Ok(()) };

            frame.set_pts(Some(self.sample_offset));
            self.sample_offset += frame.samples() as i64;

            self.encoder.send_frame(&frame).map_err(encoder_err)?;
            self.drain_encoder(out)?;
        }
    }

    fn drain_encoder(&mut self, out: &mut Vec<Packet>) -> Result<(), JobError> {
        let mut packet = Packet::empty();
        while recv_more(self.encoder.receive_packet(&mut packet), encoder_err)? {
            self.mapper.finalise(&mut packet);
            out.push(std::mem::replace(&mut packet, Packet::empty()));
        }
        Ok(())
    }
}
