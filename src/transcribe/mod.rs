//! Offline melody transcription.
//!
//! A whole recording goes through pre-emphasis, block downsampling and a frame scan with the
//! real-time detector. The resulting frequency track feeds two independent paths: discrete
//! notes (segmentation, cleanup, octave correction) and a denoised pitch curve for display.
//!
//! ```no_run
//! use intonation::transcribe::{AudioBuffer, MelodyTranscriber, TranscribeOptions};
//!
//! let audio = AudioBuffer::open_wav("take.wav").unwrap();
//! let transcriber = MelodyTranscriber::new(TranscribeOptions::default());
//! let transcription = transcriber
//!     .transcribe(&audio, |percent| println!("{:.0}%", percent))
//!     .unwrap();
//! for note in &transcription.notes {
//!     println!("{} at {:.2}s for {:.2}s", note.midi, note.time, note.duration);
//! }
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::utils::filters::{block_downsample, pre_emphasis};

mod audio;
mod curve;
mod frames;
mod job;
mod octave;
mod segment;

pub use audio::AudioBuffer;
pub use curve::CurveOptions;
pub use job::{spawn_transcription, TranscriptionJob};
pub use octave::OctaveOptions;
pub use segment::SegmentOptions;

use frames::{frame_size_for, hop_for, scan, ScanSettings};
use segment::Segment;

/// A transcribed note. `midi` is rounded to the nearest semitone of the tuning
/// the transcription ran with; `frequency` is the measured median.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    pub midi: u8,
    pub frequency: f32,
    /// Onset in seconds.
    pub time: f32,
    /// Length in seconds.
    pub duration: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchCurvePoint {
    pub time: f32,
    pub frequency: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Transcription {
    pub notes: Vec<Note>,
    /// Voiced points only, in time order.
    pub pitch_curve: Vec<PitchCurvePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscribeOptions {
    /// Desired analysis frames per second, clamped to the frame rate bounds.
    pub analysis_rate: f32,
    /// Frequency of A4.
    pub reference_pitch: f32,
    /// Run the whole-sequence octave pass.
    pub strict_octave: bool,
    pub pre_emphasis: f32,
    /// Input is block-averaged down to about this rate.
    pub working_rate: f32,
    /// Target frame length in seconds, rounded to a power of two in samples.
    pub frame_duration: f32,
    pub min_frame_size: usize,
    pub max_frame_size: usize,
    pub min_frame_rate: f32,
    pub max_frame_rate: f32,
    /// Silence gate for the frame scan.
    pub min_rms: f32,
    /// Frames between cancellation checks and progress reports.
    pub yield_interval: usize,
    pub segment: SegmentOptions,
    pub octave: OctaveOptions,
    pub curve: CurveOptions,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        TranscribeOptions {
            analysis_rate: 40.0,
            reference_pitch: 440.0,
            strict_octave: false,
            pre_emphasis: 0.97,
            working_rate: 44100.0,
            frame_duration: 0.09,
            min_frame_size: 1024,
            max_frame_size: 2048,
            min_frame_rate: 28.0,
            max_frame_rate: 60.0,
            min_rms: 0.002,
            yield_interval: 256,
            segment: SegmentOptions::default(),
            octave: OctaveOptions::default(),
            curve: CurveOptions::default(),
        }
    }
}

/// Shared flag that asks a running transcription to stop. A cancelled
/// transcription returns [Error::Cancelled] and no partial result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Forwards strictly increasing percentages to the caller.
struct Progress<F> {
    report: F,
    last: f32,
}

impl<F: FnMut(f32)> Progress<F> {
    fn new(report: F) -> Self {
        Progress { report, last: 0.0 }
    }

    fn report(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.last {
            self.last = percent;
            (self.report)(percent);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MelodyTranscriber {
    options: TranscribeOptions,
}

impl MelodyTranscriber {
    pub fn new(options: TranscribeOptions) -> Self {
        MelodyTranscriber { options }
    }

    pub fn options(&self) -> &TranscribeOptions {
        &self.options
    }

    /// Transcribe `audio`, reporting progress in percent.
    pub fn transcribe<F>(&self, audio: &AudioBuffer, progress: F) -> Result<Transcription>
    where
        F: FnMut(f32),
    {
        self.transcribe_with_cancel(audio, &CancelToken::new(), progress)
    }

    pub fn transcribe_with_cancel<F>(
        &self,
        audio: &AudioBuffer,
        cancel: &CancelToken,
        progress: F,
    ) -> Result<Transcription>
    where
        F: FnMut(f32),
    {
        let options = &self.options;
        let mut progress = Progress::new(progress);
        if audio.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        cancel.check()?;

        let mut mono = audio.to_mono();
        pre_emphasis(&mut mono, options.pre_emphasis);
        progress.report(10.0);

        let input_rate = audio.sample_rate() as f32;
        let factor = if options.working_rate > 0.0 {
            ((input_rate / options.working_rate).round() as usize).max(1)
        } else {
            1
        };
        let signal = block_downsample(&mono, factor);
        drop(mono);
        let sample_rate = input_rate / factor as f32;
        progress.report(20.0);
        cancel.check()?;

        let settings = ScanSettings {
            frame_size: frame_size_for(
                sample_rate,
                options.frame_duration,
                options.min_frame_size,
                options.max_frame_size,
            ),
            hop: hop_for(
                sample_rate,
                options.analysis_rate,
                options.min_frame_rate,
                options.max_frame_rate,
            ),
            min_rms: options.min_rms,
            yield_interval: options.yield_interval,
        };
        debug!(
            "transcribing {:.2}s at {} Hz: factor {}, frame {}, hop {}",
            audio.duration(),
            audio.sample_rate(),
            factor,
            settings.frame_size,
            settings.hop
        );
        let track = scan(&signal, sample_rate, &settings, cancel, |fraction| {
            progress.report(20.0 + 70.0 * fraction)
        })?;
        progress.report(90.0);
        cancel.check()?;

        let reference_pitch = options.reference_pitch;
        let segments = segment::segment(&track, &options.segment, reference_pitch);
        let raw_count = segments.len();
        let mut segments = segment::clean_up(segments, &options.segment);
        octave::correct_by_harmonics(&mut segments, &signal, &track, &options.octave);
        if options.strict_octave {
            octave::strict_octave(&mut segments, &options.octave);
        }
        octave::align_phrases(&mut segments, &options.octave);
        let final_gap = options.segment.final_merge_gap;
        let segments = segment::merge_same_pitch(segments, |gap| gap <= final_gap);
        progress.report(95.0);
        cancel.check()?;

        let pitch_curve = curve::pitch_curve(&track, &options.curve, reference_pitch, options.segment.latency);
        let notes: Vec<Note> = segments.iter().filter_map(to_note).collect();
        cancel.check()?;

        debug!(
            "transcribed {} notes from {} frames ({} raw segments), {} curve points",
            notes.len(),
            track.len(),
            raw_count,
            pitch_curve.len()
        );
        progress.report(100.0);
        Ok(Transcription { notes, pitch_curve })
    }
}

fn to_note(segment: &Segment) -> Option<Note> {
    let time = segment.start.max(0.0);
    let duration = segment.end - time;
    if duration <= 0.0 {
        return None;
    }
    Some(Note {
        midi: segment.midi.clamp(0.0, 127.0) as u8,
        frequency: segment.frequency,
        time,
        duration,
    })
}
