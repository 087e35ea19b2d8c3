//! Turning the frame track into discrete notes.
//!
//! Segmentation walks the track with one open note at a time. Each voiced frame is unwrapped
//! against the note's MIDI anchor so a detector octave flip inside a held note does not read
//! as a pitch change. A different rounded pitch has to hold for `change_frames` consecutive
//! frames before the note is cut, and a short run of unvoiced frames does not end it.
//!
//! The cleanup passes then merge, absorb and drop the short fragments that survive.
use crate::detector::frequency_to_midi;
use crate::transcribe::frames::FrameTrack;
use crate::utils::filters::median_in_place;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    /// Shift applied to every note onset and offset, in seconds.
    pub latency: f32,
    /// Consecutive frames a new pitch must hold before a note is cut.
    pub change_frames: usize,
    /// Unvoiced frames tolerated inside a note.
    pub dropout_frames: usize,
    /// An octave-unwrapped run longer than this is a real leap and starts a new note.
    pub octave_run_frames: usize,
    /// Semitones around a full octave that still count as an octave flip.
    pub octave_tolerance: f32,
    pub min_note_duration: f32,
    /// Same-pitch notes closer than this are merged during cleanup.
    pub merge_gap: f32,
    /// Largest gap across which a short note is absorbed into a neighbour.
    pub absorb_gap: f32,
    /// Largest pitch difference, in semitones, for absorption.
    pub absorb_interval: f32,
    /// Notes up to this long are absorbed when both neighbours share a pitch.
    pub sandwich_max_duration: f32,
    pub sandwich_gap: f32,
    /// Same-pitch notes at most this far apart are merged at the very end.
    pub final_merge_gap: f32,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        SegmentOptions {
            latency: 0.045,
            change_frames: 2,
            dropout_frames: 2,
            octave_run_frames: 8,
            octave_tolerance: 1.0,
            min_note_duration: 0.07,
            merge_gap: 0.02,
            absorb_gap: 0.03,
            absorb_interval: 1.0,
            sandwich_max_duration: 0.12,
            sandwich_gap: 0.03,
            final_merge_gap: 0.03,
        }
    }
}

/// A note while the transcriber is still working on it. Times are latency
/// compensated and may be negative until the final export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    /// Rounded MIDI note number.
    pub midi: f32,
    /// Median frequency of the note's frames, folded into the note's octave.
    pub frequency: f32,
    pub start: f32,
    pub end: f32,
    pub first_frame: usize,
    pub last_frame: usize,
}

impl Segment {
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    /// Silence between the end of `self` and the start of `next`.
    pub fn gap_to(&self, next: &Segment) -> f32 {
        next.start - self.end
    }

    pub fn shift(&mut self, semitones: i32) {
        self.midi += semitones as f32;
        self.frequency *= 2f32.powf(semitones as f32 / 12.0);
    }

    /// Stretch `self` over `other`, keeping its pitch.
    pub fn extend_to(&mut self, other: &Segment) {
        if other.midi == self.midi && other.duration() > self.duration() {
            self.frequency = other.frequency;
        }
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
        self.first_frame = self.first_frame.min(other.first_frame);
        self.last_frame = self.last_frame.max(other.last_frame);
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    midi: f32,
    first: usize,
    count: usize,
    /// Last frame of the open note before the pending run began.
    last_before: usize,
}

#[derive(Debug, Clone, Copy)]
struct OctaveRun {
    first: usize,
    last_before: usize,
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    anchor: f32,
    first: usize,
    last: usize,
    dropout: usize,
    pending: Option<Pending>,
    octave_run: Option<OctaveRun>,
}

impl OpenNote {
    fn new(first: usize, last: usize, anchor: f32) -> Self {
        OpenNote {
            anchor,
            first,
            last,
            dropout: 0,
            pending: None,
            octave_run: None,
        }
    }
}

struct Segmenter<'a> {
    track: &'a FrameTrack,
    options: &'a SegmentOptions,
    reference_pitch: f32,
    open: Option<OpenNote>,
    notes: Vec<Segment>,
}

impl<'a> Segmenter<'a> {
    fn unvoiced(&mut self) {
        let limit = self.options.dropout_frames;
        let expired = match self.open.as_mut() {
            Some(note) => {
                note.dropout += 1;
                note.pending = None;
                note.octave_run = None;
                note.dropout > limit
            }
            None => false,
        };
        if expired {
            self.close();
        }
    }

    fn voiced(&mut self, frame: usize, frequency: f32) {
        let midi = frequency_to_midi(frequency, self.reference_pitch);
        let mut note = match self.open {
            Some(note) => note,
            None => {
                self.open = Some(OpenNote::new(frame, frame, midi.round()));
                return;
            }
        };
        note.dropout = 0;

        let offset = midi - note.anchor;
        let unwrapped = if (offset.abs() - 12.0).abs() <= self.options.octave_tolerance {
            let run = *note.octave_run.get_or_insert(OctaveRun {
                first: frame,
                last_before: note.last,
            });
            if frame + 1 - run.first > self.options.octave_run_frames {
                self.restart(run.first, run.last_before, midi.round(), frame);
                return;
            }
            if offset > 0.0 {
                midi - 12.0
            } else {
                midi + 12.0
            }
        } else {
            note.octave_run = None;
            midi
        };

        let rounded = unwrapped.round();
        if rounded == note.anchor {
            note.pending = None;
            note.last = frame;
            self.open = Some(note);
            return;
        }

        let pending = match note.pending {
            Some(p) if p.midi == rounded => Pending {
                count: p.count + 1,
                ..p
            },
            _ => Pending {
                midi: rounded,
                first: frame,
                count: 1,
                last_before: note.last,
            },
        };
        if pending.count >= self.options.change_frames.max(1) {
            self.restart(pending.first, pending.last_before, rounded, frame);
            return;
        }
        note.pending = Some(pending);
        note.last = frame;
        self.open = Some(note);
    }

    /// Close the open note at `last_before` and open a new one spanning `first..=last`.
    fn restart(&mut self, first: usize, last_before: usize, anchor: f32, last: usize) {
        if let Some(note) = self.open.take() {
            if last_before >= note.first && last_before < first {
                self.emit(note.first, last_before, note.anchor);
            }
        }
        self.open = Some(OpenNote::new(first, last, anchor));
    }

    fn close(&mut self) {
        if let Some(note) = self.open.take() {
            self.emit(note.first, note.last, note.anchor);
        }
    }

    fn emit(&mut self, first: usize, last: usize, anchor: f32) {
        if let Some(segment) = build_segment(self.track, first, last, anchor, self.options, self.reference_pitch) {
            self.notes.push(segment);
        }
    }
}

fn build_segment(
    track: &FrameTrack,
    first: usize,
    last: usize,
    anchor: f32,
    options: &SegmentOptions,
    reference_pitch: f32,
) -> Option<Segment> {
    let mut folded: Vec<f32> = track.frequency[first..=last]
        .iter()
        .filter(|&&f| f > 0.0)
        .map(|&f| {
            let octaves = ((frequency_to_midi(f, reference_pitch) - anchor) / 12.0).round();
            f * 2f32.powf(-octaves)
        })
        .collect();
    let frequency = median_in_place(&mut folded)?;
    Some(Segment {
        midi: frequency_to_midi(frequency, reference_pitch).round(),
        frequency,
        start: track.time(first) - options.latency,
        end: track.time(last) + track.hop_seconds() - options.latency,
        first_frame: first,
        last_frame: last,
    })
}

/// Cut the frame track into raw notes.
pub(crate) fn segment(track: &FrameTrack, options: &SegmentOptions, reference_pitch: f32) -> Vec<Segment> {
    let mut segmenter = Segmenter {
        track,
        options,
        reference_pitch,
        open: None,
        notes: Vec::new(),
    };
    for (frame, &frequency) in track.frequency.iter().enumerate() {
        if frequency > 0.0 {
            segmenter.voiced(frame, frequency);
        } else {
            segmenter.unvoiced();
        }
    }
    segmenter.close();
    segmenter.notes
}

/// Merge neighbouring notes of equal pitch whose gap satisfies `joinable`.
pub(crate) fn merge_same_pitch<F>(segments: Vec<Segment>, joinable: F) -> Vec<Segment>
where
    F: Fn(f32) -> bool,
{
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if last.midi == segment.midi && joinable(last.gap_to(&segment)) => {
                last.extend_to(&segment)
            }
            _ => merged.push(segment),
        }
    }
    merged
}

/// Fold notes shorter than the minimum duration into a close neighbour of the
/// same or an adjacent pitch. The same pitch wins, then the longer neighbour.
pub(crate) fn absorb_short_notes(mut segments: Vec<Segment>, options: &SegmentOptions) -> Vec<Segment> {
    let mut i = 0;
    while i < segments.len() {
        let short = segments[i];
        if short.duration() >= options.min_note_duration {
            i += 1;
            continue;
        }
        let accepts = |neighbor: &Segment, gap: f32| {
            (neighbor.midi - short.midi).abs() <= options.absorb_interval && gap < options.absorb_gap
        };
        let previous = i
            .checked_sub(1)
            .filter(|&p| accepts(&segments[p], segments[p].gap_to(&short)));
        let next = Some(i + 1)
            .filter(|&n| n < segments.len() && accepts(&segments[n], short.gap_to(&segments[n])));

        let target = match (previous, next) {
            (Some(p), Some(n)) => {
                let (a, b) = (&segments[p], &segments[n]);
                if a.midi == short.midi && b.midi != short.midi {
                    Some(p)
                } else if b.midi == short.midi && a.midi != short.midi {
                    Some(n)
                } else if b.duration() > a.duration() {
                    Some(n)
                } else {
                    Some(p)
                }
            }
            (p, n) => p.or(n),
        };

        match target {
            Some(t) => {
                segments.remove(i);
                let t = if t > i { t - 1 } else { t };
                segments[t].extend_to(&short);
            }
            None => i += 1,
        }
    }
    segments
}

/// A short note between two notes of one pitch becomes part of a single note.
pub(crate) fn absorb_sandwiches(mut segments: Vec<Segment>, options: &SegmentOptions) -> Vec<Segment> {
    let mut i = 1;
    while i + 1 < segments.len() {
        let (previous, middle, next) = (segments[i - 1], segments[i], segments[i + 1]);
        if middle.duration() <= options.sandwich_max_duration
            && previous.midi == next.midi
            && middle.midi != previous.midi
            && previous.gap_to(&middle) < options.sandwich_gap
            && middle.gap_to(&next) < options.sandwich_gap
        {
            segments[i - 1].extend_to(&next);
            segments.drain(i..=i + 1);
        } else {
            i += 1;
        }
    }
    segments
}

/// All cleanup passes, ending with the removal of notes still below the minimum duration.
pub(crate) fn clean_up(segments: Vec<Segment>, options: &SegmentOptions) -> Vec<Segment> {
    let merge_gap = options.merge_gap;
    let segments = merge_same_pitch(segments, |gap| gap < merge_gap);
    let segments = absorb_short_notes(segments, options);
    let segments = absorb_sandwiches(segments, options);
    let mut segments = merge_same_pitch(segments, |gap| gap < merge_gap);
    segments.retain(|s| s.duration() >= options.min_note_duration);
    segments
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detector::midi_to_frequency;

    /// 10 ms hop, 20 ms frames at 44.1 kHz.
    pub(crate) fn track(frequencies: &[f32]) -> FrameTrack {
        FrameTrack {
            frequency: frequencies.to_vec(),
            confidence: frequencies.iter().map(|&f| if f > 0.0 { 0.9 } else { 0.0 }).collect(),
            hop: 441,
            frame_size: 882,
            sample_rate: 44100.0,
        }
    }

    pub(crate) fn notes(pattern: &[(f32, usize)]) -> Vec<f32> {
        pattern
            .iter()
            .flat_map(|&(midi, frames)| {
                let f = if midi > 0.0 { midi_to_frequency(midi, 440.0) } else { 0.0 };
                std::iter::repeat(f).take(frames)
            })
            .collect()
    }

    pub(crate) fn seg(midi: f32, start: f32, end: f32) -> Segment {
        Segment {
            midi,
            frequency: midi_to_frequency(midi, 440.0),
            start,
            end,
            first_frame: 0,
            last_frame: 0,
        }
    }

    fn pitches(segments: &[Segment]) -> Vec<f32> {
        segments.iter().map(|s| s.midi).collect()
    }

    fn run(frequencies: &[f32]) -> Vec<Segment> {
        segment(&track(frequencies), &SegmentOptions::default(), 440.0)
    }

    #[test]
    fn single_frame_glitch_stays_in_note() {
        let segments = run(&notes(&[(60.0, 10), (64.0, 1), (60.0, 10)]));
        assert_eq!(pitches(&segments), vec![60.0]);
        assert_eq!(segments[0].last_frame, 20);
    }

    #[test]
    fn persistent_change_cuts_note() {
        let segments = run(&notes(&[(60.0, 10), (64.0, 10)]));
        assert_eq!(pitches(&segments), vec![60.0, 64.0]);
        assert_eq!(segments[0].last_frame, 9);
        assert_eq!(segments[1].first_frame, 10);
    }

    #[test]
    fn brief_octave_flip_is_unwrapped() {
        let segments = run(&notes(&[(60.0, 10), (72.0, 3), (60.0, 10)]));
        assert_eq!(pitches(&segments), vec![60.0]);
        assert!((segments[0].frequency - midi_to_frequency(60.0, 440.0)).abs() < 1e-2);
    }

    #[test]
    fn sustained_octave_is_a_new_note() {
        let segments = run(&notes(&[(60.0, 10), (72.0, 12)]));
        assert_eq!(pitches(&segments), vec![60.0, 72.0]);
        assert_eq!(segments[1].first_frame, 10);
        assert_eq!(segments[1].last_frame, 21);
    }

    #[test]
    fn dropouts_up_to_limit_are_bridged() {
        assert_eq!(run(&notes(&[(60.0, 5), (0.0, 2), (60.0, 5)])).len(), 1);
        assert_eq!(run(&notes(&[(60.0, 5), (0.0, 3), (60.0, 5)])).len(), 2);
    }

    #[test]
    fn times_are_latency_compensated() {
        let segments = run(&notes(&[(0.0, 10), (60.0, 10)]));
        let note = segments[0];
        // Frame 10 is complete at 0.12 s; frame 19 at 0.21 s plus one hop.
        assert!((note.start - (0.12 - 0.045)).abs() < 1e-4);
        assert!((note.end - (0.22 - 0.045)).abs() < 1e-4);
    }

    #[test]
    fn silence_yields_nothing() {
        assert!(run(&[0.0; 50]).is_empty());
    }

    #[test]
    fn close_same_pitch_notes_merge() {
        let merged = merge_same_pitch(vec![seg(60.0, 0.0, 0.5), seg(60.0, 0.51, 1.0), seg(62.0, 1.0, 1.5)], |g| g < 0.02);
        assert_eq!(pitches(&merged), vec![60.0, 62.0]);
        assert_eq!(merged[0].end, 1.0);
    }

    #[test]
    fn short_note_joins_adjacent_pitch() {
        let options = SegmentOptions::default();
        let absorbed = absorb_short_notes(vec![seg(60.0, 0.0, 0.5), seg(61.0, 0.51, 0.55), seg(67.0, 0.56, 1.0)], &options);
        assert_eq!(pitches(&absorbed), vec![60.0, 67.0]);
        assert!((absorbed[0].end - 0.55).abs() < 1e-6);

        let kept = absorb_short_notes(vec![seg(60.0, 0.0, 0.5), seg(64.0, 0.51, 0.55)], &options);
        assert_eq!(pitches(&kept), vec![60.0, 64.0]);
    }

    #[test]
    fn sandwich_is_swallowed() {
        let options = SegmentOptions::default();
        let segments = absorb_sandwiches(vec![seg(60.0, 0.0, 0.5), seg(64.0, 0.5, 0.6), seg(60.0, 0.6, 1.0)], &options);
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0.0, 1.0));
    }

    #[test]
    fn cleanup_drops_isolated_fragments() {
        let options = SegmentOptions::default();
        let segments = clean_up(vec![seg(60.0, 0.0, 0.5), seg(70.0, 0.8, 0.84), seg(64.0, 1.2, 2.0)], &options);
        assert_eq!(pitches(&segments), vec![60.0, 64.0]);
    }
}
