// crates/recode-media/src/runner.rs
//
// JobRunner: the blocking, single-threaded driver for one transcoding job.
// Probe → resolve → open writer/encoders → write header → run the
// interleave scheduler → write trailer. Meant to run on a dedicated worker
// thread; emits JobEvents over the channel and returns the terminal state.
//
// The trailer is written best-effort on every exit path once the header went
// out — a failed or cancelled job still leaves a syntactically closed file.

use std::path::PathBuf;

use crossbeam_channel::Sender;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::media::Type as MediaType;

use recode_core::{resolve, JobConfig, JobError, JobEvent, JobId, JobState};

use crate::cancel::CancelFlag;
use crate::params::{AudioParams, VideoParams};
use crate::pipeline::{AudioPipeline, VideoPipeline};
use crate::reader::Reader;
use crate::scheduler::InterleaveScheduler;
use crate::timestamp::{video_time_base, TimestampMapper};
use crate::writer::Writer;
use crate::convert;

/// Run one job to a terminal state, emitting events along the way.
pub fn run_job(
    job_id: JobId,
    config: &JobConfig,
    cancel: &CancelFlag,
    events: &Sender<JobEvent>,
) -> JobState {
    log::debug!("job {job_id}: start '{}'", config.input.display());
    match execute(job_id, config, cancel, events) {
        Ok(output) => {
            log::debug!("job {job_id}: succeeded");
            let _ = events.send(JobEvent::Succeeded { job_id, output });
            JobState::Succeeded
        }
        Err(e) if e.is_cancelled() => {
            log::debug!("job {job_id}: cancelled");
            let _ = events.send(JobEvent::Cancelled { job_id });
            JobState::Cancelled
        }
        Err(e) => {
            log::debug!("job {job_id}: failed: {e}");
            let _ = events.send(JobEvent::Failed { job_id, error: e.clone() });
            JobState::Failed(e)
        }
    }
}

fn execute(
    job_id: JobId,
    config: &JobConfig,
    cancel: &CancelFlag,
    events: &Sender<JobEvent>,
) -> Result<PathBuf, JobError> {
    // ── Probe ─────────────────────────────────────────────────────────────────
    let mut reader = Reader::open(&config.input)?;

    let video_index = config
        .video
        .as_ref()
        .and_then(|_| reader.best_stream(MediaType::Video));
    let audio_index = config
        .audio
        .as_ref()
        .and_then(|_| reader.best_stream(MediaType::Audio));

    let video_desc = video_index.and_then(|i| reader.descriptor(i)).cloned();
    let audio_desc = audio_index.and_then(|i| reader.descriptor(i)).cloned();

    // ── Resolve ───────────────────────────────────────────────────────────────
    // Must fail before the writer opens so an invalid config creates no file.
    let video_info = video_desc.as_ref().and_then(|d| d.video_info());
    let audio_info = audio_desc.as_ref().and_then(|d| d.audio_info());
    let resolved = resolve(config, video_info.as_ref(), audio_info.as_ref())?;

    // ── Writer and encoders ───────────────────────────────────────────────────
    let mut writer = Writer::create(&resolved.output, resolved.container)?;

    let mut video_build = None;
    if let (Some(v), Some(desc)) = (&resolved.video, &video_desc) {
        let detail = desc.video.as_ref().ok_or_else(|| {
            JobError::config("selected video stream has no decodable parameters")
        })?;
        let fps    = detail.frame_rate;
        let enc_tb = video_time_base(fps);
        let params = VideoParams {
            codec:        v.codec,
            width:        v.width,
            height:       v.height,
            pixel_format: convert::pixel(v.pixel_format),
            time_base:    enc_tb,
            frame_rate:   fps,
            threads:      resolved.encode_threads,
            crf:          v.crf,
        };
        let (encoder, codec) = params.open()?;
        let out_index = writer.add_stream(
            codec,
            encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            enc_tb,
        )?;
        let total_frames =
            (desc.duration_seconds * f64::from(fps)).round().max(1.0) as i64;
        video_build = Some((encoder, out_index, enc_tb, fps, total_frames, detail.width, detail.height));
    }

    let mut audio_build = None;
    if let (Some(a), Some(desc)) = (&resolved.audio, &audio_desc) {
        let enc_tb = ffmpeg::Rational::new(1, a.sample_rate as i32);
        let params = AudioParams {
            codec:          a.codec,
            sample_rate:    a.sample_rate,
            sample_format:  convert::sample(a.sample_format),
            channel_layout: a.channel_layout,
            threads:        resolved.encode_threads,
        };
        let (encoder, codec) = params.open()?;
        let out_index = writer.add_stream(
            codec,
            encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            enc_tb,
        )?;
        let frame_samples = AudioParams::frame_samples(&encoder);
        let expected_samples =
            (desc.duration_seconds * a.sample_rate as f64).round().max(1.0) as i64;
        audio_build = Some((encoder, out_index, enc_tb, frame_samples, expected_samples));
    }

    writer.write_header()?;
    log::debug!("job {job_id}: header written to '{}'", resolved.output.display());

    // ── Pipelines ─────────────────────────────────────────────────────────────
    // Muxer time bases are only authoritative after write_header.
    let mut video_pipeline = None;
    if let (Some((encoder, out_index, enc_tb, fps, total_frames, src_w, src_h)), Some(v), Some(index)) =
        (video_build, &resolved.video, video_index)
    {
        let decoder = reader.video_decoder(index, resolved.decode_threads)?;
        let mapper  = TimestampMapper::new(out_index, enc_tb, writer.stream_time_base(out_index));
        video_pipeline = Some(VideoPipeline::new(
            index,
            decoder,
            encoder,
            mapper,
            (src_w, src_h),
            (v.width, v.height),
            convert::pixel(v.pixel_format),
            fps,
            enc_tb,
            total_frames,
        ));
    }

    let mut audio_pipeline = None;
    if let (Some((encoder, out_index, enc_tb, frame_samples, expected_samples)), Some(a), Some(index)) =
        (audio_build, &resolved.audio, audio_index)
    {
        let decoder = reader.audio_decoder(index, resolved.decode_threads)?;
        let mapper  = TimestampMapper::new(out_index, enc_tb, writer.stream_time_base(out_index));
        audio_pipeline = Some(AudioPipeline::new(
            index,
            decoder,
            encoder,
            mapper,
            convert::sample(a.sample_format),
            a.channel_layout,
            a.sample_rate,
            frame_samples,
            expected_samples,
        ));
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut scheduler = InterleaveScheduler::new(
        &mut reader,
        &mut writer,
        video_pipeline.as_mut(),
        audio_pipeline.as_mut(),
        cancel,
    );
    let result = scheduler.run(|progress| {
        // try_send: a slow listener coalesces progress instead of stalling
        // the pipeline.
        let _ = events.try_send(JobEvent::Progress { job_id, value: progress });
    });

    // Trailer regardless of outcome, so partial files stay readable.
    if writer.header_written() {
        if let Err(e) = writer.write_trailer() {
            log::warn!("job {job_id}: trailer after {:?}: {e}", result.as_ref().err());
        }
    }

    result?;
    let _ = events.send(JobEvent::Progress { job_id, value: 1.0 });
    Ok(resolved.output)
}
