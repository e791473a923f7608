// crates/recode-media/src/writer.rs
//
// Output side of the codec adapter: one muxer per job. Streams are added
// from opened encoder contexts (the codecpar copy has no safe API in this
// version of the bindings, so it goes through avcodec_parameters_from_context
// directly). The muxer may replace a requested stream time base during
// write_header — callers must read `stream_time_base` back *after* the header
// and rescale against that, never against the request.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format;
use ffmpeg::util::rational::Rational;
use ffmpeg::{Codec, Packet};

use recode_core::{Container, ErrorKind, JobError};

use crate::convert;

pub struct Writer {
    octx:           format::context::Output,
    path:           PathBuf,
    header_written: bool,
}

impl Writer {
    pub fn create(path: &Path, container: Container) -> Result<Self, JobError> {
        crate::ensure_init();
        let octx = format::output_as(&path, convert::muxer_name(container)).map_err(|e| {
            JobError::new(
                ErrorKind::Writer,
                format!("open output '{}' as {}: {e}", path.display(), convert::muxer_name(container)),
            )
        })?;
        Ok(Self { octx, path: path.to_path_buf(), header_written: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an output stream for an opened encoder, requesting `time_base`.
    /// Returns the new stream index.
    pub fn add_stream(
        &mut self,
        codec:     Codec,
        enc_ctx:   *mut ffmpeg::ffi::AVCodecContext,
        time_base: Rational,
    ) -> Result<usize, JobError> {
        let index = {
            let mut ost = self.octx.add_stream(codec).map_err(|e| {
                JobError::new(ErrorKind::Writer, format!("add stream: {e}"))
            })?;
            ost.set_time_base(time_base);
            ost.index()
        };

        // Copy encoder params into the stream's codecpar so the muxer has
        // resolution, format, and codec-private data.
        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*self.octx.as_mut_ptr()).streams.add(index)).codecpar,
                enc_ctx,
            );
            if ret < 0 {
                return Err(JobError::new(
                    ErrorKind::Writer,
                    format!("avcodec_parameters_from_context failed: {ret}"),
                ));
            }
        }

        Ok(index)
    }

    pub fn write_header(&mut self) -> Result<(), JobError> {
        self.octx
            .write_header()
            .map_err(|e| JobError::new(ErrorKind::Writer, format!("write header: {e}")))?;
        self.header_written = true;
        Ok(())
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// The muxer-assigned time base for `index`. Only meaningful after
    /// `write_header`.
    pub fn stream_time_base(&self, index: usize) -> Rational {
        self.octx
            .stream(index)
            .map(|s| s.time_base())
            .unwrap_or_else(|| Rational::new(1, 1000))
    }

    pub fn write_packet(&mut self, packet: Packet) -> Result<(), JobError> {
        packet
            .write_interleaved(&mut self.octx)
            .map_err(|e| JobError::new(ErrorKind::Writer, format!("write packet: {e}")))
    }

    pub fn write_trailer(&mut self) -> Result<(), JobError> {
        self.octx
            .write_trailer()
            .map_err(|e| JobError::new(ErrorKind::Writer, format!("write trailer: {e}")))
    }
}
