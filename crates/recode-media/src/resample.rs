// crates/recode-media/src/resample.rs
//
// Audio conversion stage: an optional swresample context in front of a
// planar byte FIFO. Decoded audio arrives in arbitrary chunk sizes; fixed
// frame-size encoders (AAC's 1024 and friends) pop exact frames off the
// front, and the final short remainder is popped separately at flush time.
//
// Identity conversions (same format, rate, and channel count) skip swr
// entirely and feed the FIFO directly.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Sample;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;

use recode_core::{ErrorKind, JobError};

use crate::convert;

/// Capacity of each frame handed to the swr drain at end of stream.
const FLUSH_CHUNK: usize = 1024;

// ── Sample FIFO ───────────────────────────────────────────────────────────────

/// Byte ring buffer with one lane per plane. For packed formats there is a
/// single lane whose per-sample stride covers all channels.
struct SampleFifo {
    format: Sample,
    mask:   ChannelLayoutMask,
    rate:   u32,
    stride: usize,
    bufs:   Vec<Vec<u8>>,
    len:    usize,
}

impl SampleFifo {
    fn new(format: Sample, layout: recode_core::ChannelLayout, rate: u32) -> Self {
        let channels = layout.channels() as usize;
        let planes   = if format.is_planar() { channels } else { 1 };
        let stride   = format.bytes() * if format.is_planar() { 1 } else { channels };
        Self {
            format,
            mask: convert::channel_layout_mask(layout),
            rate,
            stride,
            bufs: vec![Vec::new(); planes],
            len: 0,
        }
    }

    /// Samples currently buffered (per channel).
    fn len(&self) -> usize {
        self.len
    }

    fn push(&mut self, frame: &AudioFrame) {
        let n = frame.samples();
        if n == 0 {
            return;
        }
        let bytes = n * self.stride;
        for (plane, buf) in self.bufs.iter_mut().enumerate() {
            buf.extend_from_slice(&frame.data(plane)[..bytes]);
        }
        self.len += n;
    }

    /// Pop `n` samples off the front; the caller guarantees `n <= len`.
    fn pop(&mut self, n: usize) -> AudioFrame {
        let mut out = AudioFrame::new(self.format, n, self.mask);
        out.set_rate(self.rate);
        let bytes = n * self.stride;
        for (plane, buf) in self.bufs.iter_mut().enumerate() {
            out.data_mut(plane)[..bytes].copy_from_slice(&buf[..bytes]);
            buf.drain(..bytes);
        }
        self.len -= n;
        out
    }
}

// ── Resampler ─────────────────────────────────────────────────────────────────

pub struct Resampler {
    swr:        Option<resampling::Context>,
    fifo:       SampleFifo,
    dst_format: Sample,
    dst_mask:   ChannelLayoutMask,
    dst_rate:   u32,
}

impl Resampler {
    /// Build the conversion stage for a stream whose first decoded frame is
    /// `frame` — the real input format is only reliable once a frame exists.
    pub fn for_input(
        frame:      &AudioFrame,
        dst_format: Sample,
        dst_layout: recode_core::ChannelLayout,
        dst_rate:   u32,
    ) -> Result<Self, JobError> {
        let src_channels = frame.ch_layout().channels();
        let needs_swr = frame.format() != dst_format
            || frame.rate() != dst_rate
            || src_channels as u32 != dst_layout.channels();

        let swr = if needs_swr {
            // Mono sources must be declared as MONO or swr misreads the layout.
            let src_layout = if src_channels >= 2 {
                frame.ch_layout()
            } else {
                ChannelLayout::MONO
            };
            let ctx = resampling::Context::get2(
                frame.format(),
                src_layout,
                frame.rate(),
                dst_format,
                convert::channel_layout(dst_layout),
                dst_rate,
            )
            .map_err(|e| {
                JobError::new(ErrorKind::CodecInit, format!("create audio resampler: {e}"))
            })?;
            Some(ctx)
        } else {
            None
        };

        Ok(Self {
            swr,
            fifo: SampleFifo::new(dst_format, dst_layout, dst_rate),
            dst_format,
            dst_mask: convert::channel_layout_mask(dst_layout),
            dst_rate,
        })
    }

    /// Convert one decoded frame into the FIFO.
    pub fn push(&mut self, frame: &AudioFrame) -> Result<(), JobError> {
        match self.swr.as_mut() {
            None => self.fifo.push(frame),
            Some(swr) => {
                let mut out = AudioFrame::empty();
                swr.run(frame, &mut out).map_err(|e| {
                    JobError::new(ErrorKind::Decoder, format!("resample audio: {e}"))
                })?;
                if out.samples() > 0 {
                    self.fifo.push(&out);
                }
            }
        }
        Ok(())
    }

    /// End-of-stream: drain the samples swr holds back for rate conversion.
    pub fn push_null(&mut self) -> Result<(), JobError> {
        let Some(swr) = self.swr.as_mut() else { return Ok(()) };
        loop {
            let mut out = AudioFrame::new(self.dst_format, FLUSH_CHUNK, self.dst_mask);
            out.set_rate(self.dst_rate);
            swr.flush(&mut out).map_err(|e| {
                JobError::new(ErrorKind::Decoder, format!("flush audio resampler: {e}"))
            })?;
            let produced = out.samples();
            if produced == 0 {
                break;
            }
            self.fifo.push(&out);
            if produced < FLUSH_CHUNK {
                break; // short fill — the delay buffer is dry
            }
        }
        Ok(())
    }

    /// A full `n`-sample frame, or `None` until enough input accumulates.
    pub fn pull_exact(&mut self, n: usize) -> Option<AudioFrame> {
        (self.fifo.len() >= n).then(|| self.fifo.pop(n))
    }

    /// The short tail left after the last `pull_exact`; at most one per stream.
    pub fn pull_remainder(&mut self) -> Option<AudioFrame> {
        let left = self.fifo.len();
        (left > 0).then(|| self.fifo.pop(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg::format::sample::Type as SampleType;
    use recode_core::ChannelLayout as CoreLayout;

    fn fltp_frame(samples: usize, start: f32) -> AudioFrame {
        let mut f = AudioFrame::new(
            Sample::F32(SampleType::Planar),
            samples,
            ChannelLayoutMask::STEREO,
        );
        f.set_rate(48_000);
        for plane in 0..2 {
            let data = f.data_mut(plane);
            for i in 0..samples {
                let v = start + i as f32 + plane as f32 * 0.5;
                data[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
            }
        }
        f
    }

    fn plane_values(frame: &AudioFrame, plane: usize) -> Vec<f32> {
        frame.data(plane)[..frame.samples() * 4]
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn fifo_pops_exact_frames_in_order() {
        let mut fifo = SampleFifo::new(Sample::F32(SampleType::Planar), CoreLayout::Stereo, 48_000);
        fifo.push(&fltp_frame(300, 0.0));
        fifo.push(&fltp_frame(300, 300.0));

        let a = fifo.pop(256);
        assert_eq!(a.samples(), 256);
        assert_eq!(plane_values(&a, 0)[0], 0.0);
        assert_eq!(plane_values(&a, 0)[255], 255.0);

        let b = fifo.pop(256);
        assert_eq!(plane_values(&b, 0)[0], 256.0);
        assert_eq!(fifo.len(), 600 - 512);
    }

    #[test]
    fn identity_input_skips_swr() {
        let first = fltp_frame(512, 0.0);
        let mut rs = Resampler::for_input(
            &first,
            Sample::F32(SampleType::Planar),
            CoreLayout::Stereo,
            48_000,
        )
        .unwrap();
        assert!(rs.swr.is_none());

        rs.push(&first).unwrap();
        assert!(rs.pull_exact(1024).is_none());
        rs.push(&fltp_frame(600, 512.0)).unwrap();

        let full = rs.pull_exact(1024).unwrap();
        assert_eq!(full.samples(), 1024);
        let rem = rs.pull_remainder().unwrap();
        assert_eq!(rem.samples(), 512 + 600 - 1024);
        assert!(rs.pull_remainder().is_none());
    }
}
