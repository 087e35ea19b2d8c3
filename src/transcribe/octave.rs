//! Octave correction of segmented notes.
//!
//! Three passes run in order: harmonic voting on each note's audio, the optional strict
//! sequence pass, and the phrase alignment pass.
use log::trace;

use crate::detector::harmonic::OctaveStrengths;
use crate::transcribe::frames::FrameTrack;
use crate::transcribe::segment::Segment;
use crate::utils::filters::median_in_place;

const SHIFTS: [i32; 5] = [-24, -12, 0, 12, 24];
const NO_SHIFT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctaveOptions {
    /// Frames sampled per note for harmonic voting.
    pub vote_points: usize,
    pub max_harmonic: usize,
    /// Factor by which a neighbouring octave must out-score the note to replace it.
    pub dominance: f32,

    /// Strict pass: cost per octave of shifting a note.
    pub shift_penalty: f32,
    /// Strict pass: jumps up to this many semitones are free.
    pub free_interval: f32,
    /// Strict pass: cost per semitone beyond `free_interval`.
    pub jump_weight: f32,
    /// Raw frequency ratios outside `[leap_ratio_low, leap_ratio_high]` support a leap.
    pub leap_ratio_high: f32,
    pub leap_ratio_low: f32,
    /// Jump cost multiplier for a supported leap.
    pub supported_leap_scale: f32,
    pub smooth_interval: f32,
    pub smooth_bonus: f32,

    /// Gap in seconds that separates two phrases.
    pub phrase_gap: f32,
    pub phrase_end_weight: f32,
    pub phrase_median_weight: f32,
    /// A phrase is only moved when that saves more than this.
    pub phrase_margin: f32,
}

impl Default for OctaveOptions {
    fn default() -> Self {
        OctaveOptions {
            vote_points: 24,
            max_harmonic: 8,
            dominance: 1.25,
            shift_penalty: 0.5,
            free_interval: 5.0,
            jump_weight: 0.15,
            leap_ratio_high: 1.8,
            leap_ratio_low: 0.55,
            supported_leap_scale: 0.4,
            smooth_interval: 2.0,
            smooth_bonus: 0.05,
            phrase_gap: 0.26,
            phrase_end_weight: 1.2,
            phrase_median_weight: 1.0,
            phrase_margin: 1.0,
        }
    }
}

/// Move each note to the octave its harmonic series supports best, voting over
/// frames sampled evenly across the note.
pub(crate) fn correct_by_harmonics(segments: &mut [Segment], signal: &[f32], track: &FrameTrack, options: &OctaveOptions) {
    let frame_size = track.frame_size;
    for segment in segments.iter_mut() {
        let frames = segment.last_frame - segment.first_frame + 1;
        let points = frames.min(options.vote_points.max(1));

        let mut total = OctaveStrengths::default();
        let mut measured = 0;
        for p in 0..points {
            let offset = if points > 1 { p * (frames - 1) / (points - 1) } else { 0 };
            let start = track.frame_start(segment.first_frame + offset);
            let stop = (start + frame_size).min(signal.len());
            if stop <= start || stop - start < frame_size / 2 {
                continue;
            }
            let strengths = OctaveStrengths::measure(
                &signal[start..stop],
                track.sample_rate,
                segment.frequency,
                options.max_harmonic,
            );
            total.accumulate(&strengths);
            measured += 1;
        }
        if measured == 0 {
            continue;
        }

        let shift = total.preferred_shift(options.dominance);
        if shift != 0 {
            trace!(
                "harmonics move note {} by {} octave at {:.2}s",
                segment.midi,
                shift,
                segment.start
            );
            segment.shift(12 * shift);
        }
    }
}

fn shift_cost(shift: i32, options: &OctaveOptions) -> f32 {
    options.shift_penalty * (shift.abs() / 12) as f32
}

fn transition_cost(previous: &Segment, previous_shift: i32, current: &Segment, shift: i32, options: &OctaveOptions) -> f32 {
    let jump = ((current.midi + shift as f32) - (previous.midi + previous_shift as f32)).abs();
    let ratio = current.frequency / previous.frequency;

    let mut cost = (jump - options.free_interval).max(0.0) * options.jump_weight;
    if previous_shift == shift && (ratio > options.leap_ratio_high || ratio < options.leap_ratio_low) {
        cost *= options.supported_leap_scale;
    }
    if jump <= options.smooth_interval {
        cost -= options.smooth_bonus;
    }
    cost
}

/// Cheapest octave assignment for the whole note sequence, by Viterbi over
/// five shift states per note.
pub(crate) fn strict_octave(segments: &mut [Segment], options: &OctaveOptions) {
    if segments.len() < 2 {
        return;
    }

    let mut cost = SHIFTS.map(|s| shift_cost(s, options));
    let mut back: Vec<[usize; 5]> = Vec::with_capacity(segments.len());
    back.push([NO_SHIFT; 5]);

    for pair in segments.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let mut next = [f32::INFINITY; 5];
        let mut from = [NO_SHIFT; 5];
        for (s, &shift) in SHIFTS.iter().enumerate() {
            for (p, &previous_shift) in SHIFTS.iter().enumerate() {
                let candidate = cost[p] + transition_cost(previous, previous_shift, current, shift, options);
                if candidate < next[s] {
                    next[s] = candidate;
                    from[s] = p;
                }
            }
            next[s] += shift_cost(shift, options);
        }
        cost = next;
        back.push(from);
    }

    // Ties go to the smallest shift.
    let mut state = (0..SHIFTS.len())
        .min_by(|&a, &b| {
            cost[a]
                .total_cmp(&cost[b])
                .then(SHIFTS[a].abs().cmp(&SHIFTS[b].abs()))
        })
        .unwrap_or(NO_SHIFT);
    for (segment, from) in segments.iter_mut().zip(back.iter()).rev() {
        let shift = SHIFTS[state];
        if shift != 0 {
            trace!("strict pass moves note {} by {} semitones", segment.midi, shift);
            segment.shift(shift);
        }
        state = from[state];
    }
}

/// Index ranges of notes separated by more than `gap` seconds.
fn phrases(segments: &[Segment], gap: f32) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..segments.len() {
        if segments[i - 1].gap_to(&segments[i]) > gap {
            ranges.push(start..i);
            start = i;
        }
    }
    if start < segments.len() {
        ranges.push(start..segments.len());
    }
    ranges
}

fn median_midi(segments: &[Segment]) -> f32 {
    let mut midis: Vec<f32> = segments.iter().map(|s| s.midi).collect();
    median_in_place(&mut midis).unwrap_or(0.0)
}

/// Shift every phrase after the first to the octave that best continues the
/// previous phrase, judged by its last note and its median.
pub(crate) fn align_phrases(segments: &mut [Segment], options: &OctaveOptions) {
    let ranges = phrases(segments, options.phrase_gap);
    for w in 1..ranges.len() {
        let previous = &segments[ranges[w - 1].clone()];
        let (previous_last, previous_median) = match previous.last() {
            Some(last) => (last.midi, median_midi(previous)),
            None => continue,
        };
        let current = &segments[ranges[w].clone()];
        let first = current[0].midi;
        let median = median_midi(current);

        let cost = |shift: i32| {
            let s = shift as f32;
            options.phrase_end_weight * (first + s - previous_last).abs()
                + options.phrase_median_weight * (median + s - previous_median).abs()
        };
        let best = SHIFTS
            .iter()
            .copied()
            .min_by(|&a, &b| cost(a).total_cmp(&cost(b)))
            .unwrap_or(0);
        if best != 0 && cost(0) - cost(best) > options.phrase_margin {
            trace!("phrase at {:.2}s moved by {} semitones", current[0].start, best);
            for segment in &mut segments[ranges[w].clone()] {
                segment.shift(best);
            }
        }
    }
}
