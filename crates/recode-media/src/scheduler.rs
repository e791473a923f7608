// crates/recode-media/src/scheduler.rs
//
// Interleave scheduler: advances every pipeline of one job in half-second
// media-time bursts so neither decoder nor resampler buffers unboundedly,
// then runs the end-of-stream flush protocol. Single-threaded and
// cooperative — every codec call of the job happens here, on the job worker.
//
// The container is opened once and packets are fanned out by stream index.
// A burst pumps shared reader packets until the stream whose turn it is
// passes the limit; the companion stream advances along the way by at most
// the container's interleave skew, which is the same bound a per-stream
// reader would have given per file position.

use std::thread;
use std::time::Duration;

use recode_core::JobError;

use crate::cancel::CancelFlag;
use crate::pipeline::{AudioPipeline, PushResult, VideoPipeline};
use crate::reader::Reader;
use crate::writer::Writer;

/// Media time one burst advances the job by.
pub const BURST_SECONDS: f64 = 0.5;

/// Breather between bursts to smooth CPU use across parallel jobs.
const INTER_BURST_SLEEP: Duration = Duration::from_millis(5);

pub struct InterleaveScheduler<'a> {
    reader:    &'a mut Reader,
    writer:    &'a mut Writer,
    video:     Option<&'a mut VideoPipeline>,
    audio:     Option<&'a mut AudioPipeline>,
    cancel:    &'a CancelFlag,
    input_eof: bool,
}

impl<'a> InterleaveScheduler<'a> {
    pub fn new(
        reader: &'a mut Reader,
        writer: &'a mut Writer,
        video:  Option<&'a mut VideoPipeline>,
        audio:  Option<&'a mut AudioPipeline>,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self { reader, writer, video, audio, cancel, input_eof: false }
    }

    /// Drive the job to completion. `on_burst` receives the job's progress
    /// in `[0, 1)` once per burst.
    pub fn run(&mut self, mut on_burst: impl FnMut(f64)) -> Result<(), JobError> {
        let mut limit = 0.0_f64;
        loop {
            limit += BURST_SECONDS;
            let video_done = self.run_video_burst(limit)?;
            let audio_done = self.run_audio_burst(limit)?;
            on_burst(self.progress());
            if video_done && audio_done {
                break;
            }
            thread::sleep(INTER_BURST_SLEEP);
        }
        self.flush_all()?;
        Ok(())
    }

    /// Weighted completion across streams, strictly below 1.0 — the terminal
    /// Succeeded event owns the final 1.0.
    pub fn progress(&self) -> f64 {
        let video = self.video.as_deref().map(VideoPipeline::progress).unwrap_or(0.0);
        let audio = self.audio.as_deref().map(AudioPipeline::progress).unwrap_or(0.0);
        video.max(audio).clamp(0.0, 0.999)
    }

    /// Advance video to `limit` seconds of output. Returns true once this
    /// stream has no more input-driven work (grid full or input at EOF —
    /// the reordering tail comes out in `flush_all`).
    fn run_video_burst(&mut self, limit: f64) -> Result<bool, JobError> {
        loop {
            let Some(vp) = self.video.as_deref() else { return Ok(true) };
            if vp.grid_complete() || self.input_eof {
                return Ok(true);
            }
            if vp.media_time() > limit {
                return Ok(false);
            }
            self.pump()?;
        }
    }

    /// Advance audio until the last encoded frame passes `limit`.
    fn run_audio_burst(&mut self, limit: f64) -> Result<bool, JobError> {
        loop {
            let Some(ap) = self.audio.as_deref() else { return Ok(true) };
            if self.input_eof {
                return Ok(true);
            }
            if ap.media_time() > limit {
                return Ok(false);
            }
            self.pump()?;
        }
    }

    /// Read one packet and hand it to its pipeline; write whatever comes out.
    /// The read is a suspension point, so cancellation is checked here.
    fn pump(&mut self) -> Result<(), JobError> {
        if self.cancel.is_set() {
            return Err(JobError::cancelled());
        }
        let Some((index, packet)) = self.reader.read_packet()? else {
            self.input_eof = true;
            return Ok(());
        };

        if let Some(vp) = self.video.as_deref_mut() {
            if vp.input_index() == index {
                if let PushResult::Drained(packets) = vp.push_packet(&packet)? {
                    for p in packets {
                        self.writer.write_packet(p)?;
                    }
                }
                return Ok(());
            }
        }
        if let Some(ap) = self.audio.as_deref_mut() {
            if ap.input_index() == index {
                if let PushResult::Drained(packets) = ap.push_packet(&packet)? {
                    for p in packets {
                        self.writer.write_packet(p)?;
                    }
                }
            }
        }
        // Packets of unmapped streams (subtitles, data) fall through.
        Ok(())
    }

    /// End-of-stream protocol across decoder → resampler → encoder → muxer,
    /// per pipeline. Cancellation is honoured between flush steps.
    fn flush_all(&mut self) -> Result<(), JobError> {
        if self.cancel.is_set() {
            return Err(JobError::cancelled());
        }
        if let Some(vp) = self.video.as_deref_mut() {
            for p in vp.flush()? {
                self.writer.write_packet(p)?;
            }
        }
        if self.cancel.is_set() {
            return Err(JobError::cancelled());
        }
        if let Some(ap) = self.audio.as_deref_mut() {
            for p in ap.flush()? {
                self.writer.write_packet(p)?;
            }
        }
        Ok(())
    }
}
