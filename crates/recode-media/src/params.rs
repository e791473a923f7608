// crates/recode-media/src/params.rs
//
// Encoder parameter sets and the one place that maps them onto encoder-open
// calls. Per-codec defaults (CRF dictionaries, the H.265 quality/codec-tag
// quirks, audio bit rates) live in the `open` match arms and nowhere else —
// pipelines and the runner never branch on codec identity.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{Pixel, Sample};
use ffmpeg::util::rational::Rational;
use ffmpeg::{encoder, Codec, Dictionary};

use recode_core::{AudioCodec, ErrorKind, JobError, VideoCodec};

use crate::convert;

/// Everything the video encoder open call sets.
#[derive(Debug, Clone, Copy)]
pub struct VideoParams {
    pub codec:        VideoCodec,
    pub width:        u32,
    pub height:       u32,
    pub pixel_format: Pixel,
    pub time_base:    Rational,
    pub frame_rate:   Rational,
    pub threads:      usize,
    pub crf:          u8,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioParams {
    pub codec:          AudioCodec,
    pub sample_rate:    u32,
    pub sample_format:  Sample,
    pub channel_layout: recode_core::ChannelLayout,
    pub threads:        usize,
}

const fn mktag(tag: &[u8; 4]) -> u32 {
    (tag[0] as u32) | (tag[1] as u32) << 8 | (tag[2] as u32) << 16 | (tag[3] as u32) << 24
}

impl VideoParams {
    pub fn open(&self) -> Result<(encoder::video::Video, Codec), JobError> {
        let id = convert::video_codec_id(self.codec);
        let codec = encoder::find(id).ok_or_else(|| {
            JobError::new(
                ErrorKind::CodecUnavailable,
                format!("no encoder for {:?} in this codec library build", self.codec),
            )
        })?;

        let ctx = codec::context::Context::new_with_codec(codec);
        let mut enc = ctx.encoder().video().map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("create video encoder context: {e}"))
        })?;

        enc.set_width(self.width);
        enc.set_height(self.height);
        enc.set_format(self.pixel_format);
        enc.set_time_base(self.time_base);
        enc.set_frame_rate(Some(self.frame_rate));

        if self.threads > 0 {
            // No safe setter for thread_count in this version of the bindings.
            unsafe {
                (*enc.as_mut_ptr()).thread_count = self.threads as i32;
            }
        }

        let mut opts = Dictionary::new();
        match self.codec {
            VideoCodec::H264 => {
                enc.set_bit_rate(0); // quality comes from CRF; 0 signals VBR
                opts.set("crf", &self.crf.to_string());
                opts.set("preset", "fast");
            }
            VideoCodec::H265 => {
                enc.set_bit_rate(0);
                opts.set("crf", &self.crf.to_string());
                opts.set("preset", "fast");
                // QuickTime players want the hvc1 sample entry, and the
                // encoder only honours global_quality with the qscale flag.
                unsafe {
                    let p = enc.as_mut_ptr();
                    (*p).global_quality = 75 * ffmpeg::ffi::FF_QP2LAMBDA as i32;
                    (*p).flags |= ffmpeg::ffi::AV_CODEC_FLAG_QSCALE as i32;
                    (*p).codec_tag = mktag(b"hvc1");
                }
            }
            VideoCodec::Mjpeg => {
                // Fixed-quantiser mode; without it the mpegvideo rate control
                // demands a target bit rate.
                unsafe {
                    let p = enc.as_mut_ptr();
                    (*p).global_quality = 3 * ffmpeg::ffi::FF_QP2LAMBDA as i32;
                    (*p).flags |= ffmpeg::ffi::AV_CODEC_FLAG_QSCALE as i32;
                }
            }
            VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Png | VideoCodec::ProRes => {}
        }

        let mut opened = enc.open_as_with(codec, opts).map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("open {:?} encoder: {e}", self.codec))
        })?;

        // libavcodec resets sample_aspect_ratio during open; force square
        // pixels afterwards so it survives into the muxer codecpar.
        opened.set_aspect_ratio(Rational::new(1, 1));

        Ok((opened, codec))
    }
}

impl AudioParams {
    pub fn open(&self) -> Result<(encoder::Audio, Codec), JobError> {
        let id = convert::audio_codec_id(self.codec);
        let codec = encoder::find(id).ok_or_else(|| {
            JobError::new(
                ErrorKind::CodecUnavailable,
                format!("no encoder for {:?} in this codec library build", self.codec),
            )
        })?;

        let ctx = codec::context::Context::new_with_codec(codec);
        let mut enc = ctx.encoder().audio().map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("create audio encoder context: {e}"))
        })?;

        enc.set_rate(self.sample_rate as i32);
        enc.set_ch_layout(convert::channel_layout(self.channel_layout));
        enc.set_format(self.sample_format);
        enc.set_time_base(Rational::new(1, self.sample_rate as i32));
        enc.set_bit_rate(match self.codec {
            AudioCodec::Aac  => 128_000,
            AudioCodec::Opus => 96_000,
            AudioCodec::Mp3  => 192_000,
            AudioCodec::Flac | AudioCodec::PcmS16le | AudioCodec::PcmS32le => 0,
        });

        if self.threads > 0 {
            unsafe {
                (*enc.as_mut_ptr()).thread_count = self.threads as i32;
            }
        }

        let opened = enc.open_as_with(codec, Dictionary::new()).map_err(|e| {
            JobError::new(ErrorKind::CodecInit, format!("open {:?} encoder: {e}", self.codec))
        })?;

        Ok((opened, codec))
    }

    /// Fixed frame size the opened encoder demands, or the FIFO chunk size for
    /// encoders that take any number of samples.
    pub fn frame_samples(encoder: &encoder::Audio) -> usize {
        let n = encoder.frame_size() as usize;
        if n > 0 { n } else { 1024 }
    }
}
