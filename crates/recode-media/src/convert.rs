// crates/recode-media/src/convert.rs
//
// Mappings between the plain recode-core enums and their FFmpeg equivalents.
// recode-core stays FFmpeg-free; everything that needs a Pixel, Sample,
// ChannelLayout or codec Id goes through here.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::{Pixel, Sample};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};

use recode_core::{AudioCodec, Container, PixelFormat, SampleFormat, VideoCodec};

/// Short name handed to the muxer (`avformat_alloc_output_context2`).
pub fn muxer_name(container: Container) -> &'static str {
    match container {
        Container::Mp4  => "mp4",
        Container::Mov  => "mov",
        Container::Mkv  => "matroska",
        Container::WebM => "webm",
        Container::Avi  => "avi",
        Container::Mp3  => "mp3",
        Container::Flac => "flac",
        Container::Wav  => "wav",
    }
}

pub fn video_codec_id(codec: VideoCodec) -> CodecId {
    match codec {
        VideoCodec::H264   => CodecId::H264,
        VideoCodec::H265   => CodecId::HEVC,
        VideoCodec::Vp8    => CodecId::VP8,
        VideoCodec::Vp9    => CodecId::VP9,
        VideoCodec::Mjpeg  => CodecId::MJPEG,
        VideoCodec::Png    => CodecId::PNG,
        VideoCodec::ProRes => CodecId::PRORES,
    }
}

pub fn audio_codec_id(codec: AudioCodec) -> CodecId {
    match codec {
        AudioCodec::Aac      => CodecId::AAC,
        AudioCodec::Opus     => CodecId::OPUS,
        AudioCodec::Mp3      => CodecId::MP3,
        AudioCodec::Flac     => CodecId::FLAC,
        AudioCodec::PcmS16le => CodecId::PCM_S16LE,
        AudioCodec::PcmS32le => CodecId::PCM_S32LE,
    }
}

pub fn pixel(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p     => Pixel::YUV420P,
        PixelFormat::Yuvj420p    => Pixel::YUVJ420P,
        PixelFormat::Yuv422p     => Pixel::YUV422P,
        PixelFormat::Yuv444p     => Pixel::YUV444P,
        PixelFormat::Nv12        => Pixel::NV12,
        PixelFormat::Rgb24       => Pixel::RGB24,
        PixelFormat::Rgba        => Pixel::RGBA,
        PixelFormat::Yuv422p10le => Pixel::YUV422P10LE,
    }
}

/// Reverse map; `None` for source formats without a core equivalent.
pub fn pixel_format(pixel: Pixel) -> Option<PixelFormat> {
    match pixel {
        Pixel::YUV420P     => Some(PixelFormat::Yuv420p),
        Pixel::YUVJ420P    => Some(PixelFormat::Yuvj420p),
        Pixel::YUV422P     => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P     => Some(PixelFormat::Yuv444p),
        Pixel::NV12        => Some(PixelFormat::Nv12),
        Pixel::RGB24       => Some(PixelFormat::Rgb24),
        Pixel::RGBA        => Some(PixelFormat::Rgba),
        Pixel::YUV422P10LE => Some(PixelFormat::Yuv422p10le),
        _                  => None,
    }
}

pub fn sample(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::S16       => Sample::I16(SampleType::Packed),
        SampleFormat::S32       => Sample::I32(SampleType::Packed),
        SampleFormat::Flt       => Sample::F32(SampleType::Packed),
        SampleFormat::S16Planar => Sample::I16(SampleType::Planar),
        SampleFormat::S32Planar => Sample::I32(SampleType::Planar),
        SampleFormat::FltPlanar => Sample::F32(SampleType::Planar),
    }
}

pub fn sample_format(sample: Sample) -> Option<SampleFormat> {
    match sample {
        Sample::I16(SampleType::Packed) => Some(SampleFormat::S16),
        Sample::I32(SampleType::Packed) => Some(SampleFormat::S32),
        Sample::F32(SampleType::Packed) => Some(SampleFormat::Flt),
        Sample::I16(SampleType::Planar) => Some(SampleFormat::S16Planar),
        Sample::I32(SampleType::Planar) => Some(SampleFormat::S32Planar),
        Sample::F32(SampleType::Planar) => Some(SampleFormat::FltPlanar),
        _                               => None,
    }
}

pub fn channel_layout(layout: recode_core::ChannelLayout) -> ChannelLayout {
    match layout {
        recode_core::ChannelLayout::Mono   => ChannelLayout::MONO,
        recode_core::ChannelLayout::Stereo => ChannelLayout::STEREO,
    }
}

pub fn channel_layout_mask(layout: recode_core::ChannelLayout) -> ChannelLayoutMask {
    match layout {
        recode_core::ChannelLayout::Mono   => ChannelLayoutMask::MONO,
        recode_core::ChannelLayout::Stereo => ChannelLayoutMask::STEREO,
    }
}

/// Core layout for a source channel count; surround sources have no core
/// equivalent and resolve to `UnsupportedCombination` when kept.
pub fn layout_for_channels(channels: u32) -> Option<recode_core::ChannelLayout> {
    match channels {
        1 => Some(recode_core::ChannelLayout::Mono),
        2 => Some(recode_core::ChannelLayout::Stereo),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_mapping_round_trips() {
        for pf in [
            PixelFormat::Yuv420p,
            PixelFormat::Yuvj420p,
            PixelFormat::Yuv422p,
            PixelFormat::Yuv444p,
            PixelFormat::Nv12,
            PixelFormat::Rgb24,
            PixelFormat::Rgba,
            PixelFormat::Yuv422p10le,
        ] {
            assert_eq!(pixel_format(pixel(pf)), Some(pf));
        }
    }

    #[test]
    fn sample_mapping_round_trips() {
        for sf in [
            SampleFormat::S16,
            SampleFormat::S32,
            SampleFormat::Flt,
            SampleFormat::S16Planar,
            SampleFormat::S32Planar,
            SampleFormat::FltPlanar,
        ] {
            assert_eq!(sample_format(sample(sf)), Some(sf));
        }
    }
}
