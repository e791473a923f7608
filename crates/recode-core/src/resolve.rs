// crates/recode-core/src/resolve.rs
//
// JobConfigResolver: replaces every `Keep::Source` sentinel with a concrete
// value taken from the input streams, then validates the result against the
// capability table. Pipelines are only ever built from the `ResolvedJobConfig`
// this returns.
//
// Resolution is idempotent: feeding a resolved config back through (via
// `JobConfig::from(&resolved)`) is a fixpoint. That holds because every
// substitution lands on a value that re-validates unchanged — including the
// MJPEG pixel-format override and the even-dimension rounding.

use crate::caps;
use crate::config::{
    AudioCodec, AudioConfig, AudioStreamInfo, ChannelLayout, JobConfig, Keep, PixelFormat,
    ResolvedAudio, ResolvedJobConfig, ResolvedVideo, VideoCodec, VideoConfig, VideoStreamInfo,
};
use crate::job::{ErrorKind, JobError};

/// Validate `config` against the capability table and the input streams,
/// substituting every keep-source sentinel.
pub fn resolve(
    config: &JobConfig,
    video_in: Option<&VideoStreamInfo>,
    audio_in: Option<&AudioStreamInfo>,
) -> Result<ResolvedJobConfig, JobError> {
    if config.video.is_none() && config.audio.is_none() {
        return Err(JobError::config("job keeps no streams"));
    }
    if config.video.is_some() && config.container.is_audio_only() {
        return Err(JobError::config(format!(
            "container {:?} cannot carry a video stream",
            config.container
        )));
    }
    if config.output.as_os_str().is_empty() {
        return Err(JobError::config("output path is empty"));
    }

    let video = match &config.video {
        None    => None,
        Some(v) => Some(resolve_video(config, v, video_in)?),
    };
    let audio = match &config.audio {
        None    => None,
        Some(a) => Some(resolve_audio(config, a, audio_in)?),
    };

    Ok(ResolvedJobConfig {
        input:          config.input.clone(),
        container:      config.container,
        video,
        audio,
        decode_threads: config.decode_threads,
        encode_threads: config.encode_threads,
        output:         config.output.clone(),
    })
}

fn resolve_video(
    config: &JobConfig,
    v: &VideoConfig,
    input: Option<&VideoStreamInfo>,
) -> Result<ResolvedVideo, JobError> {
    if !caps::supported_video_codecs(config.container).contains(&v.codec) {
        return Err(JobError::config(format!(
            "{:?} does not accept video codec {:?}",
            config.container, v.codec
        )));
    }
    if v.crf > 51 {
        return Err(JobError::config(format!("crf {} out of range 0..=51", v.crf)));
    }

    let input = input
        .ok_or_else(|| JobError::config("video requested but input has no video stream"))?;

    let (w, h) = match v.size {
        Keep::Value(s) => s,
        Keep::Source   => (input.width, input.height),
    };
    // Subsampled pixel formats need even dimensions; round down like any
    // encoder front end would rather than rejecting a 1-pixel mismatch.
    let (w, h) = (w & !1, h & !1);
    if w < 2 || h < 2 {
        return Err(JobError::config(format!("target dimensions {w}x{h} too small")));
    }

    // MJPEG only takes full-range 4:2:0, whatever the config asked for.
    let pixel_format = if v.codec == VideoCodec::Mjpeg {
        PixelFormat::Yuvj420p
    } else {
        v.pixel_format.or_source(input.pixel_format).ok_or_else(|| {
            JobError::config("source pixel format has no supported equivalent")
        })?
    };
    if !caps::supported_pixel_formats(v.codec).contains(&pixel_format) {
        return Err(JobError::config(format!(
            "{:?} does not accept pixel format {pixel_format:?}",
            v.codec
        )));
    }

    Ok(ResolvedVideo { codec: v.codec, width: w, height: h, pixel_format, crf: v.crf })
}

fn resolve_audio(
    config: &JobConfig,
    a: &AudioConfig,
    input: Option<&AudioStreamInfo>,
) -> Result<ResolvedAudio, JobError> {
    if !caps::supported_audio_codecs(config.container).contains(&a.codec) {
        return Err(JobError::config(format!(
            "{:?} does not accept audio codec {:?}",
            config.container, a.codec
        )));
    }

    let input = input
        .ok_or_else(|| JobError::config("audio requested but input has no audio stream"))?;

    let sample_rate = match a.sample_rate {
        Keep::Value(r) => r,
        Keep::Source   => input.sample_rate,
    };
    let rates = caps::supported_sample_rates(a.codec);
    if !rates.is_empty() && !rates.contains(&sample_rate) {
        return Err(JobError::config(format!(
            "{:?} does not accept sample rate {sample_rate}",
            a.codec
        )));
    }

    let channel_layout = match a.channel_layout {
        Keep::Value(l) => {
            if !caps::supported_channel_layouts(a.codec).contains(&l) {
                return Err(JobError::config(format!(
                    "{:?} does not accept channel layout {l:?}",
                    a.codec
                )));
            }
            l
        }
        Keep::Source => {
            // Keep-source resolving to a layout the encoder cannot take is the
            // one combination that gets its own error kind — the user asked
            // for "same as input" and the input cannot be honored.
            let l = input.channel_layout.ok_or_else(|| unsupported_layout(a.codec, None))?;
            if !caps::supported_channel_layouts(a.codec).contains(&l) {
                return Err(unsupported_layout(a.codec, Some(l)));
            }
            l
        }
    };

    if !caps::supported_sample_formats(a.codec).contains(&a.sample_format) {
        return Err(JobError::config(format!(
            "{:?} does not accept sample format {:?}",
            a.codec, a.sample_format
        )));
    }

    Ok(ResolvedAudio {
        codec:          a.codec,
        channel_layout,
        sample_format:  a.sample_format,
        sample_rate,
    })
}

fn unsupported_layout(codec: AudioCodec, layout: Option<ChannelLayout>) -> JobError {
    let described = match layout {
        Some(l) => format!("{l:?}"),
        None    => "source layout".to_string(),
    };
    JobError::new(
        ErrorKind::UnsupportedCombination,
        format!("{codec:?} cannot encode {described}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Container, SampleFormat};
    use std::path::PathBuf;

    fn stereo_48k() -> AudioStreamInfo {
        AudioStreamInfo {
            sample_rate:    48_000,
            channel_layout: Some(ChannelLayout::Stereo),
            sample_format:  Some(SampleFormat::FltPlanar),
        }
    }

    fn hd_yuv420() -> VideoStreamInfo {
        VideoStreamInfo {
            width:        1920,
            height:       1080,
            pixel_format: Some(PixelFormat::Yuv420p),
        }
    }

    fn base_config() -> JobConfig {
        JobConfig {
            input:          PathBuf::from("/media/in.mp4"),
            container:      Container::Mp4,
            video:          Some(VideoConfig {
                codec:        VideoCodec::H264,
                size:         Keep::Source,
                pixel_format: Keep::Source,
                crf:          23,
            }),
            audio:          Some(AudioConfig {
                codec:          AudioCodec::Aac,
                channel_layout: Keep::Source,
                sample_format:  SampleFormat::FltPlanar,
                sample_rate:    Keep::Source,
            }),
            decode_threads: 0,
            encode_threads: 0,
            output:         PathBuf::from("/tmp/out.mp4"),
        }
    }

    #[test]
    fn keep_source_substitution() {
        let r = resolve(&base_config(), Some(&hd_yuv420()), Some(&stereo_48k())).unwrap();
        let v = r.video.unwrap();
        assert_eq!((v.width, v.height), (1920, 1080));
        assert_eq!(v.pixel_format, PixelFormat::Yuv420p);
        let a = r.audio.unwrap();
        assert_eq!(a.sample_rate, 48_000);
        assert_eq!(a.channel_layout, ChannelLayout::Stereo);
    }

    #[test]
    fn resolution_is_idempotent() {
        let first  = resolve(&base_config(), Some(&hd_yuv420()), Some(&stereo_48k())).unwrap();
        let again  = resolve(&JobConfig::from(&first), Some(&hd_yuv420()), Some(&stereo_48k()))
            .unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn flac_in_mp4_rejected() {
        let mut cfg = base_config();
        cfg.audio.as_mut().unwrap().codec = AudioCodec::Flac;
        let err = resolve(&cfg, Some(&hd_yuv420()), Some(&stereo_48k())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigInvalid);
    }

    #[test]
    fn unmappable_source_layout_is_unsupported_combination() {
        let mut input = stereo_48k();
        input.channel_layout = None; // e.g. a 5.1 source
        let err = resolve(&base_config(), Some(&hd_yuv420()), Some(&input)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedCombination);
    }

    #[test]
    fn explicit_odd_dimensions_round_down() {
        let mut cfg = base_config();
        cfg.video.as_mut().unwrap().size = Keep::Value((1281, 721));
        let r = resolve(&cfg, Some(&hd_yuv420()), Some(&stereo_48k())).unwrap();
        let v = r.video.unwrap();
        assert_eq!((v.width, v.height), (1280, 720));
    }

    #[test]
    fn mjpeg_pixel_format_forced() {
        let mut cfg = base_config();
        cfg.container = Container::Mkv;
        let v = cfg.video.as_mut().unwrap();
        v.codec = VideoCodec::Mjpeg;
        v.pixel_format = Keep::Value(PixelFormat::Yuv420p); // overridden
        let r = resolve(&cfg, Some(&hd_yuv420()), Some(&stereo_48k())).unwrap();
        assert_eq!(r.video.unwrap().pixel_format, PixelFormat::Yuvj420p);

        // And the override keeps resolution a fixpoint.
        let again = resolve(&JobConfig::from(&r), Some(&hd_yuv420()), Some(&stereo_48k()));
        assert_eq!(again.unwrap(), r);
    }

    #[test]
    fn crf_out_of_range_rejected() {
        let mut cfg = base_config();
        cfg.video.as_mut().unwrap().crf = 52;
        assert!(resolve(&cfg, Some(&hd_yuv420()), Some(&stereo_48k())).is_err());
    }

    #[test]
    fn video_in_audio_only_container_rejected() {
        let mut cfg = base_config();
        cfg.container = Container::Mp3;
        let err = resolve(&cfg, Some(&hd_yuv420()), Some(&stereo_48k())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigInvalid);
    }

    #[test]
    fn empty_job_rejected() {
        let mut cfg = base_config();
        cfg.video = None;
        cfg.audio = None;
        assert!(resolve(&cfg, None, None).is_err());
    }

    #[test]
    fn audio_only_job() {
        let mut cfg = base_config();
        cfg.container = Container::Flac;
        cfg.video = None;
        let a = cfg.audio.as_mut().unwrap();
        a.codec = AudioCodec::Flac;
        a.sample_format = SampleFormat::S16;
        a.sample_rate = Keep::Value(44_100);
        let r = resolve(&cfg, None, Some(&stereo_48k())).unwrap();
        assert!(r.video.is_none());
        assert_eq!(r.audio.unwrap().sample_rate, 44_100);
    }
}
