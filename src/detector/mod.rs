use crate::detector::internals::Pitch;
use crate::float::Float;

pub mod harmonic;
pub mod internals;
pub mod mcleod;
pub mod realtime;
pub mod yin;

/// A single-frame fundamental frequency estimator.
pub trait PitchDetector<T>
where
    T: Float,
{
    /// Estimate the pitch of `signal`, or `None` when no periodicity is found.
    fn get_pitch(&mut self, signal: &[T], sample_rate: usize) -> Option<Pitch<T>>;

    /// Number of samples the detector expects per frame.
    fn frame_size(&self) -> usize;
}

impl<T: Float, D: PitchDetector<T> + ?Sized> PitchDetector<T> for Box<D> {
    fn get_pitch(&mut self, signal: &[T], sample_rate: usize) -> Option<Pitch<T>> {
        (**self).get_pitch(signal, sample_rate)
    }

    fn frame_size(&self) -> usize {
        (**self).frame_size()
    }
}

/// Frequency and confidence of one analysis frame. A frequency of zero marks
/// the frame as unvoiced; the confidence of an unvoiced frame is zero too.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PitchEstimate {
    pub frequency: f32,
    pub confidence: f32,
}

impl PitchEstimate {
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        frequency: 0.0,
        confidence: 0.0,
    };

    pub fn new(frequency: f32, confidence: f32) -> Self {
        PitchEstimate {
            frequency,
            confidence,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Signed distance from `reference` to `frequency` in equal-tempered semitones.
pub fn semitones_between(frequency: f32, reference: f32) -> f32 {
    12.0 * (frequency / reference).log2()
}

/// Fractional MIDI note number of `frequency` for the given A4 tuning.
pub fn frequency_to_midi(frequency: f32, reference_pitch: f32) -> f32 {
    69.0 + semitones_between(frequency, reference_pitch)
}

/// Frequency of a (possibly fractional) MIDI note for the given A4 tuning.
pub fn midi_to_frequency(midi: f32, reference_pitch: f32) -> f32 {
    reference_pitch * 2f32.powf((midi - 69.0) / 12.0)
}
