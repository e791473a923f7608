// crates/recode-core/src/caps.rs
//
// Static capability table: which codecs each container carries and which
// pixel formats / sample rates / sample formats / channel layouts each codec
// accepts. Pure data, shared freely across job workers; the resolver is its
// only consumer inside this workspace but front ends may query it to build
// codec pickers.

use crate::config::{AudioCodec, ChannelLayout, Container, PixelFormat, SampleFormat, VideoCodec};

pub fn supported_containers() -> &'static [Container] {
    &[
        Container::Mp4,
        Container::Mov,
        Container::Mkv,
        Container::WebM,
        Container::Avi,
        Container::Mp3,
        Container::Flac,
        Container::Wav,
    ]
}

pub fn supported_video_codecs(container: Container) -> &'static [VideoCodec] {
    match container {
        Container::Mp4  => &[VideoCodec::H264, VideoCodec::H265, VideoCodec::Mjpeg],
        Container::Mov  => &[
            VideoCodec::H264,
            VideoCodec::H265,
            VideoCodec::Mjpeg,
            VideoCodec::ProRes,
            VideoCodec::Png,
        ],
        Container::Mkv  => &[
            VideoCodec::H264,
            VideoCodec::H265,
            VideoCodec::Vp8,
            VideoCodec::Vp9,
            VideoCodec::Mjpeg,
        ],
        Container::WebM => &[VideoCodec::Vp8, VideoCodec::Vp9],
        Container::Avi  => &[VideoCodec::Mjpeg, VideoCodec::H264],
        Container::Mp3 | Container::Flac | Container::Wav => &[],
    }
}

pub fn supported_audio_codecs(container: Container) -> &'static [AudioCodec] {
    match container {
        Container::Mp4  => &[AudioCodec::Aac, AudioCodec::Mp3],
        Container::Mov  => &[
            AudioCodec::Aac,
            AudioCodec::Mp3,
            AudioCodec::PcmS16le,
            AudioCodec::PcmS32le,
        ],
        Container::Mkv  => &[
            AudioCodec::Aac,
            AudioCodec::Opus,
            AudioCodec::Mp3,
            AudioCodec::Flac,
            AudioCodec::PcmS16le,
            AudioCodec::PcmS32le,
        ],
        Container::WebM => &[AudioCodec::Opus],
        Container::Avi  => &[AudioCodec::Mp3, AudioCodec::PcmS16le],
        Container::Mp3  => &[AudioCodec::Mp3],
        Container::Flac => &[AudioCodec::Flac],
        Container::Wav  => &[AudioCodec::PcmS16le, AudioCodec::PcmS32le],
    }
}

pub fn supported_pixel_formats(codec: VideoCodec) -> &'static [PixelFormat] {
    match codec {
        VideoCodec::H264   => &[
            PixelFormat::Yuv420p,
            PixelFormat::Yuv422p,
            PixelFormat::Yuv444p,
            PixelFormat::Nv12,
        ],
        VideoCodec::H265   => &[PixelFormat::Yuv420p, PixelFormat::Yuv422p, PixelFormat::Yuv444p],
        VideoCodec::Vp8    => &[PixelFormat::Yuv420p],
        VideoCodec::Vp9    => &[PixelFormat::Yuv420p, PixelFormat::Yuv422p, PixelFormat::Yuv444p],
        VideoCodec::Mjpeg  => &[PixelFormat::Yuvj420p],
        VideoCodec::Png    => &[PixelFormat::Rgb24, PixelFormat::Rgba],
        VideoCodec::ProRes => &[PixelFormat::Yuv422p10le],
    }
}

/// Empty slice means the codec takes any sample rate.
pub fn supported_sample_rates(codec: AudioCodec) -> &'static [u32] {
    match codec {
        AudioCodec::Aac  => &[
            96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000,
            11_025, 8_000,
        ],
        AudioCodec::Opus => &[48_000, 24_000, 16_000, 12_000, 8_000],
        AudioCodec::Mp3  => &[
            48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
        ],
        AudioCodec::Flac | AudioCodec::PcmS16le | AudioCodec::PcmS32le => &[],
    }
}

pub fn supported_sample_formats(codec: AudioCodec) -> &'static [SampleFormat] {
    match codec {
        AudioCodec::Aac      => &[SampleFormat::FltPlanar],
        AudioCodec::Opus     => &[SampleFormat::S16, SampleFormat::Flt],
        AudioCodec::Mp3      => &[SampleFormat::S16Planar, SampleFormat::S32Planar, SampleFormat::FltPlanar],
        AudioCodec::Flac     => &[SampleFormat::S16, SampleFormat::S32],
        AudioCodec::PcmS16le => &[SampleFormat::S16],
        AudioCodec::PcmS32le => &[SampleFormat::S32],
    }
}

pub fn supported_channel_layouts(_codec: AudioCodec) -> &'static [ChannelLayout] {
    // Every encoder in the table takes mono and stereo; surround layouts are
    // not part of the v1 capability surface.
    &[ChannelLayout::Mono, ChannelLayout::Stereo]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_container_codec_has_formats() {
        for &container in supported_containers() {
            for &vc in supported_video_codecs(container) {
                assert!(
                    !supported_pixel_formats(vc).is_empty(),
                    "{vc:?} has no pixel formats"
                );
            }
            for &ac in supported_audio_codecs(container) {
                assert!(
                    !supported_sample_formats(ac).is_empty(),
                    "{ac:?} has no sample formats"
                );
                assert!(!supported_channel_layouts(ac).is_empty());
            }
        }
    }

    #[test]
    fn audio_only_containers_carry_no_video() {
        for &c in supported_containers() {
            if c.is_audio_only() {
                assert!(supported_video_codecs(c).is_empty());
            }
        }
    }

    #[test]
    fn flac_not_allowed_in_mp4() {
        assert!(!supported_audio_codecs(Container::Mp4).contains(&AudioCodec::Flac));
    }

    #[test]
    fn mjpeg_is_full_range_only() {
        assert_eq!(
            supported_pixel_formats(VideoCodec::Mjpeg),
            &[PixelFormat::Yuvj420p][..]
        );
    }
}
