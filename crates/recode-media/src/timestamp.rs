// crates/recode-media/src/timestamp.rs
//
// Timestamp rebasing for muxer-bound packets. Three time bases are in play:
// the input stream's (left behind at decode), the encoder's (where pipelines
// stamp frames), and the muxer-assigned per-stream base (which the muxer may
// have substituted for the request during write_header). This is the only
// code that touches packet timestamps after encode.
//
// PTS strategy mirrors the frame grids upstream:
//   Video: frame counter on a 1/1000 tick (or one tick per frame when the
//   frame rate doesn't divide into milliseconds).
//   Audio: sample counter in 1/sample_rate.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

// ── Encoder time-base selection ───────────────────────────────────────────────

/// Time base requested from a video encoder: millisecond ticks when the frame
/// rate lands on them exactly, otherwise the inverted frame rate so one tick
/// is one frame.
pub fn video_time_base(fps: Rational) -> Rational {
    if fps.numerator() > 0 && (1000 * fps.numerator()) % fps.denominator() == 0 {
        Rational::new(1, 1000)
    } else {
        Rational::new(fps.denominator(), fps.numerator())
    }
}

/// PTS of output frame `index` (logical time `index / fps`) in `tb` units.
pub fn video_pts(index: i64, fps: Rational, tb: Rational) -> i64 {
    let num = index as i128 * fps.denominator() as i128 * tb.denominator() as i128;
    let den = fps.numerator() as i128 * tb.numerator() as i128;
    ((num + den / 2) / den) as i64
}

// ── Per-pipeline mapper ───────────────────────────────────────────────────────

/// Finalises every encoded packet before muxing: output stream index, rescale
/// into the muxer's stream time base, monotonic DTS, and PTS ≥ DTS.
pub struct TimestampMapper {
    out_index: usize,
    enc_tb:    Rational,
    mux_tb:    Rational,
    last_dts:  Option<i64>,
    warned:    bool,
}

impl TimestampMapper {
    pub fn new(out_index: usize, enc_tb: Rational, mux_tb: Rational) -> Self {
        Self { out_index, enc_tb, mux_tb, last_dts: None, warned: false }
    }

    pub fn finalise(&mut self, packet: &mut Packet) {
        packet.set_stream(self.out_index);
        packet.rescale_ts(self.enc_tb, self.mux_tb);

        if let Some(mut dts) = packet.dts() {
            if let Some(last) = self.last_dts {
                if dts <= last {
                    if !self.warned {
                        log::warn!(
                            "stream {}: non-monotonic dts {dts} after {last}, bumping",
                            self.out_index
                        );
                        self.warned = true;
                    }
                    dts = last + 1;
                    packet.set_dts(Some(dts));
                }
            }
            self.last_dts = Some(dts);

            // Rescale rounding can land the first B-frame group's PTS one tick
            // under its DTS; muxers reject that.
            if let Some(pts) = packet.pts() {
                if pts < dts {
                    packet.set_pts(Some(dts));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millisecond_tick_for_integral_rates() {
        assert_eq!(video_time_base(Rational::new(30, 1)), Rational::new(1, 1000));
        assert_eq!(video_time_base(Rational::new(25, 1)), Rational::new(1, 1000));
    }

    #[test]
    fn frame_tick_for_ntsc_rates() {
        let fps = Rational::new(30_000, 1_001);
        assert_eq!(video_time_base(fps), Rational::new(1_001, 30_000));
        // One tick per frame: the grid is exact.
        for i in 0..100 {
            assert_eq!(video_pts(i, fps, video_time_base(fps)), i);
        }
    }

    #[test]
    fn millisecond_grid_is_monotonic() {
        let fps = Rational::new(30, 1);
        let tb  = video_time_base(fps);
        let mut last = -1;
        for i in 0..300 {
            let pts = video_pts(i, fps, tb);
            assert!(pts > last, "pts {pts} not after {last} at frame {i}");
            last = pts;
        }
        // Frame 30 is exactly one second in.
        assert_eq!(video_pts(30, fps, tb), 1000);
    }

    #[test]
    fn mapper_bumps_non_monotonic_dts() {
        let tb = Rational::new(1, 1000);
        let mut mapper = TimestampMapper::new(3, tb, tb);

        let mut a = Packet::empty();
        a.set_pts(Some(100));
        a.set_dts(Some(100));
        mapper.finalise(&mut a);
        assert_eq!(a.stream(), 3);
        assert_eq!(a.dts(), Some(100));

        let mut b = Packet::empty();
        b.set_pts(Some(100));
        b.set_dts(Some(100)); // repeat — must be bumped
        mapper.finalise(&mut b);
        assert_eq!(b.dts(), Some(101));
        assert_eq!(b.pts(), Some(101)); // clamped up to dts
    }

    #[test]
    fn mapper_rescales_between_bases() {
        // 1/30 → 1/15360: one frame becomes 512 ticks.
        let mut mapper =
            TimestampMapper::new(0, Rational::new(1, 30), Rational::new(1, 15_360));
        let mut p = Packet::empty();
        p.set_pts(Some(2));
        p.set_dts(Some(2));
        mapper.finalise(&mut p);
        assert_eq!(p.dts(), Some(1024));
    }
}
