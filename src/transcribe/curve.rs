//! Denoised continuous pitch curve for display.
use crate::detector::frequency_to_midi;
use crate::transcribe::frames::FrameTrack;
use crate::transcribe::PitchCurvePoint;
use crate::utils::filters::{median_in_place, voiced_median_filter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveOptions {
    /// Frames below this confidence are dropped.
    pub min_confidence: f32,
    /// Frames further than this from the median pitch of the take are dropped.
    pub outlier_semitones: f32,
    pub median_width: usize,
    /// A jump counts as an octave jump from this many semitones short of one octave up to
    /// two octaves plus `glue_tolerance`.
    pub octave_tolerance: f32,
    /// An octave jump is folded when that lands within this many semitones of the last point.
    pub glue_tolerance: f32,
    /// Silence longer than this, in seconds, starts a fresh reference for gluing.
    pub glue_reset_gap: f32,
}

impl Default for CurveOptions {
    fn default() -> Self {
        CurveOptions {
            min_confidence: 0.4,
            outlier_semitones: 36.0,
            median_width: 5,
            octave_tolerance: 2.5,
            glue_tolerance: 4.0,
            glue_reset_gap: 0.26,
        }
    }
}

pub(crate) fn pitch_curve(
    track: &FrameTrack,
    options: &CurveOptions,
    reference_pitch: f32,
    latency: f32,
) -> Vec<PitchCurvePoint> {
    let mut gated: Vec<f32> = track
        .frequency
        .iter()
        .zip(&track.confidence)
        .map(|(&f, &c)| if f > 0.0 && c >= options.min_confidence { f } else { 0.0 })
        .collect();

    let mut voiced: Vec<f32> = gated
        .iter()
        .filter(|&&f| f > 0.0)
        .map(|&f| frequency_to_midi(f, reference_pitch))
        .collect();
    let center = match median_in_place(&mut voiced) {
        Some(center) => center,
        None => return Vec::new(),
    };
    for f in gated.iter_mut().filter(|f| **f > 0.0) {
        if (frequency_to_midi(*f, reference_pitch) - center).abs() > options.outlier_semitones {
            *f = 0.0;
        }
    }

    let filtered = voiced_median_filter(&gated, options.median_width);
    let reset_frames = (options.glue_reset_gap / track.hop_seconds()).ceil() as usize;

    let mut points = Vec::new();
    let mut last: Option<(usize, f32)> = None;
    for (frame, &raw) in filtered.iter().enumerate() {
        if raw <= 0.0 {
            continue;
        }
        let mut frequency = raw;
        let midi = frequency_to_midi(raw, reference_pitch);
        if let Some((_, last_midi)) = last.filter(|&(at, _)| frame - at <= reset_frames) {
            let jump = midi - last_midi;
            let octaves = (jump / 12.0).round().clamp(-2.0, 2.0);
            let residual = (jump - 12.0 * octaves).abs();
            let octave_jump = jump.abs() >= 12.0 - options.octave_tolerance
                && jump.abs() <= 24.0 + options.glue_tolerance;
            if octave_jump && octaves != 0.0 && residual <= options.glue_tolerance {
                frequency = raw * 2f32.powf(-octaves);
            }
        }
        last = Some((frame, frequency_to_midi(frequency, reference_pitch)));
        points.push(PitchCurvePoint {
            time: (track.time(frame) - latency).max(0.0),
            frequency,
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::segment::tests::{notes, track};

    fn curve(frequencies: &[f32]) -> Vec<PitchCurvePoint> {
        pitch_curve(&track(frequencies), &CurveOptions::default(), 440.0, 0.045)
    }

    #[test]
    fn silence_has_no_curve() {
        assert!(curve(&[0.0; 30]).is_empty());
    }

    #[test]
    fn low_confidence_frames_are_dropped() {
        let mut track = track(&[220.0; 10]);
        track.confidence[3] = 0.2;
        let points = pitch_curve(&track, &CurveOptions::default(), 440.0, 0.045);
        assert_eq!(points.len(), 9);
        assert!(points.iter().all(|p| p.frequency == 220.0));
    }

    #[test]
    fn single_frame_spike_is_filtered() {
        let mut frequencies = vec![220.0; 21];
        frequencies[10] = 300.0;
        let points = curve(&frequencies);
        assert_eq!(points.len(), 21);
        assert!(points.iter().all(|p| p.frequency == 220.0));
    }

    #[test]
    fn octave_jump_is_glued() {
        let points = curve(&notes(&[(57.0, 10), (69.0, 10)]));
        assert_eq!(points.len(), 20);
        assert!(points.iter().all(|p| (p.frequency - 220.0).abs() < 0.01));
    }

    #[test]
    fn wide_octave_jump_is_glued_within_tolerance() {
        let points = curve(&notes(&[(57.0, 10), (72.0, 10)]));
        assert_eq!(points.len(), 20);
        let c4 = 440.0 * 2f32.powf(-9.0 / 12.0);
        assert!((points[19].frequency - c4).abs() < 0.05, "{:?}", points[19]);
    }

    #[test]
    fn jump_too_far_from_octave_is_kept() {
        let points = curve(&notes(&[(57.0, 10), (74.0, 10)]));
        let d5 = 440.0 * 2f32.powf(5.0 / 12.0);
        assert!((points[19].frequency - d5).abs() < 0.05, "{:?}", points[19]);
    }

    #[test]
    fn fifth_is_not_an_octave_jump() {
        let points = curve(&notes(&[(57.0, 10), (64.0, 10)]));
        let e4 = 440.0 * 2f32.powf(-5.0 / 12.0);
        assert!((points[19].frequency - e4).abs() < 0.05, "{:?}", points[19]);
    }

    #[test]
    fn glue_resets_after_long_silence() {
        let points = curve(&notes(&[(57.0, 10), (0.0, 30), (69.0, 10)]));
        assert_eq!(points.len(), 20);
        assert!((points[19].frequency - 440.0).abs() < 0.01);
    }

    #[test]
    fn far_outliers_are_silenced() {
        let mut frequencies = vec![220.0; 20];
        frequencies.extend([220.0 * 16.0; 3]);
        let points = curve(&frequencies);
        assert_eq!(points.len(), 20);
    }

    #[test]
    fn times_are_shifted_and_clamped() {
        let points = curve(&notes(&[(0.0, 10), (57.0, 5)]));
        assert!((points[0].time - (0.12 - 0.045)).abs() < 1e-4);
        let early = curve(&[220.0; 3]);
        assert_eq!(early[0].time, 0.0);
    }
}
