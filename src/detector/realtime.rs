//! Stateful per-frame detector for live input.
//!
//! Each call runs a silence gate, a core single-frame estimator (McLeod by default),
//! optional guide-relative octave correction, optional sequence-optimal octave
//! selection, and temporal stabilization against the last stable frequency.
//! One instance serves one audio stream; frames must arrive in time order.
use log::trace;

use crate::detector::mcleod::McLeodDetector;
use crate::detector::{semitones_between, PitchDetector, PitchEstimate};
use crate::tracking::sequence::{OctaveSequenceSelector, SequenceConfig};
use crate::utils::buffer::rms;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealtimeConfig {
    /// Frames with a lower RMS count as silence.
    pub min_rms: f32,
    /// Consecutive silent frames after which the last stable frequency is forgotten.
    pub silence_frames_to_clear: usize,
    pub min_clarity: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Semitone tolerance around one octave from the guide.
    pub guide_octave_tolerance: f32,
    /// Guide correction only applies below this confidence.
    pub guide_max_confidence: f32,
    pub guide_confidence_boost: f32,
    /// Estimates within this many semitones of the stable frequency are blended.
    pub continuity_semitones: f32,
    /// Weight of the new estimate when blending.
    pub continuity_blend: f32,
    /// Semitone tolerance around one octave from the stable frequency.
    pub octave_glitch_tolerance: f32,
    /// Octave jumps below this confidence are treated as glitches.
    pub octave_glitch_max_confidence: f32,
    pub sequence: SequenceConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            min_rms: 0.01,
            silence_frames_to_clear: 5,
            min_clarity: 0.5,
            min_frequency: 60.0,
            max_frequency: 4200.0,
            guide_octave_tolerance: 2.0,
            guide_max_confidence: 0.98,
            guide_confidence_boost: 1.2,
            continuity_semitones: 1.0,
            continuity_blend: 0.5,
            octave_glitch_tolerance: 1.0,
            octave_glitch_max_confidence: 0.9,
            sequence: SequenceConfig::default(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectOptions {
    pub use_sequence_selection: bool,
    /// Frequency the guide melody expects right now. `None` or a non-positive
    /// value disables guide correction.
    pub guide_frequency: Option<f32>,
    /// Overrides [RealtimeConfig::min_rms] for this call.
    pub min_rms: Option<f32>,
}

#[derive(Debug, Default, Clone)]
struct DetectorState {
    stable_frequency: Option<f32>,
    silent_frames: usize,
}

pub struct RealtimeDetector<D = McLeodDetector<f32>>
where
    D: PitchDetector<f32>,
{
    core: D,
    config: RealtimeConfig,
    state: DetectorState,
    selector: OctaveSequenceSelector,
}

impl RealtimeDetector<McLeodDetector<f32>> {
    /// A detector for frames of `frame_size` samples with a McLeod core.
    pub fn new(frame_size: usize) -> Self {
        Self::with_core(McLeodDetector::new(frame_size), RealtimeConfig::default())
    }
}

impl<D> RealtimeDetector<D>
where
    D: PitchDetector<f32>,
{
    pub fn with_core(core: D, config: RealtimeConfig) -> Self {
        let selector = OctaveSequenceSelector::new(
            config.sequence,
            config.min_frequency,
            config.max_frequency,
        );
        RealtimeDetector {
            core,
            config,
            state: DetectorState::default(),
            selector,
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn frame_size(&self) -> usize {
        self.core.frame_size()
    }

    /// Last frequency the detector reported as stable, if any.
    pub fn stable_frequency(&self) -> Option<f32> {
        self.state.stable_frequency
    }

    /// Forget all continuity. Call whenever the stream restarts or seeks.
    pub fn reset(&mut self) {
        self.state = DetectorState::default();
        self.selector.reset();
    }

    pub fn analyze(&mut self, frame: &[f32], sample_rate: u32, options: &DetectOptions) -> PitchEstimate {
        if frame.len() < self.core.frame_size() || sample_rate == 0 {
            return PitchEstimate::UNVOICED;
        }
        let frame = &frame[..self.core.frame_size()];

        let min_rms = options.min_rms.unwrap_or(self.config.min_rms);
        if !(rms(frame) >= min_rms) {
            self.state.silent_frames += 1;
            if self.state.silent_frames >= self.config.silence_frames_to_clear {
                self.state.stable_frequency = None;
                self.selector.reset();
            }
            return PitchEstimate::UNVOICED;
        }
        self.state.silent_frames = 0;

        let pitch = match self.core.get_pitch(frame, sample_rate as usize) {
            Some(pitch) => pitch,
            None => return PitchEstimate::UNVOICED,
        };
        if !(pitch.clarity >= self.config.min_clarity)
            || !(pitch.frequency >= self.config.min_frequency)
            || pitch.frequency > self.config.max_frequency
        {
            trace!(
                "rejected core estimate {:.1} Hz at clarity {:.2}",
                pitch.frequency,
                pitch.clarity
            );
            return PitchEstimate::UNVOICED;
        }

        let mut frequency = pitch.frequency;
        let mut confidence = pitch.clarity.min(1.0);

        let guide = options.guide_frequency.filter(|g| *g > 0.0);
        if let Some(guide) = guide {
            let distance = semitones_between(frequency, guide);
            if (distance.abs() - 12.0).abs() <= self.config.guide_octave_tolerance
                && confidence < self.config.guide_max_confidence
            {
                frequency = if distance > 0.0 {
                    frequency / 2.0
                } else {
                    frequency * 2.0
                };
                confidence = (confidence * self.config.guide_confidence_boost).min(1.0);
                trace!("guide {:.1} Hz moved estimate to {:.1} Hz", guide, frequency);
            }
        }

        if options.use_sequence_selection {
            frequency = self.selector.push(frequency, confidence, guide);
        }

        frequency = self.stabilize(frequency, confidence);
        self.state.stable_frequency = Some(frequency);

        PitchEstimate::new(frequency, confidence)
    }

    fn stabilize(&self, frequency: f32, confidence: f32) -> f32 {
        let stable = match self.state.stable_frequency {
            Some(stable) => stable,
            None => return frequency,
        };
        let distance = semitones_between(frequency, stable);
        if distance.abs() <= self.config.continuity_semitones {
            let blend = self.config.continuity_blend;
            blend * frequency + (1.0 - blend) * stable
        } else if (distance.abs() - 12.0).abs() <= self.config.octave_glitch_tolerance
            && confidence < self.config.octave_glitch_max_confidence
        {
            stable
        } else {
            frequency
        }
    }
}
