//! The McLeod pitch method, from *[A Smarter Way to Find Pitch](http://miracle.otago.ac.nz/tartini/papers/A_Smarter_Way_to_Find_Pitch.pdf)*.
//!
//! The *normalized square difference function* (NSDF) of a frame is computed with an FFT.
//! Its key maxima are the highest points between each positive and negative zero crossing.
//! The first key maximum that reaches `cutoff` times the highest one is the period, refined by
//! quadratic interpolation. The interpolated NSDF height at that lag is the clarity, a value
//! close to 1 for clean periodic signals.
use crate::detector::internals::normalized_square_difference;
use crate::detector::internals::pitch_from_peaks;
use crate::detector::internals::DetectorInternals;
use crate::detector::internals::Pitch;
use crate::detector::PitchDetector;
use crate::float::Float;
use crate::utils::buffer::square_sum;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McLeodConfig {
    /// Frames with a total power (sum of squares) below this are rejected.
    pub power_threshold: f64,
    /// Key maxima at or below this NSDF height are never chosen.
    pub clarity_threshold: f64,
    /// Fraction of the highest key maximum the chosen one must reach.
    pub cutoff: f64,
}

impl Default for McLeodConfig {
    fn default() -> Self {
        McLeodConfig {
            power_threshold: 0.0,
            clarity_threshold: 0.0,
            cutoff: 0.9,
        }
    }
}

pub struct McLeodDetector<T>
where
    T: Float,
{
    internals: DetectorInternals<T>,
    config: McLeodConfig,
}

impl<T> McLeodDetector<T>
where
    T: Float,
{
    pub fn new(size: usize) -> Self {
        Self::with_config(size, McLeodConfig::default())
    }

    pub fn with_config(size: usize, config: McLeodConfig) -> Self {
        let internals = DetectorInternals::new(size, size);
        McLeodDetector { internals, config }
    }

    pub fn config(&self) -> &McLeodConfig {
        &self.config
    }
}

impl<T> PitchDetector<T> for McLeodDetector<T>
where
    T: Float,
{
    fn get_pitch(&mut self, signal: &[T], sample_rate: usize) -> Option<Pitch<T>> {
        if signal.len() < self.internals.size || sample_rate == 0 {
            return None;
        }
        let signal = &signal[..self.internals.size];

        if square_sum(signal) <= T::cast(self.config.power_threshold) {
            return None;
        }

        let mut nsdf_ref = self.internals.buffers.get_real_buffer();
        let nsdf = &mut nsdf_ref[..self.internals.size];

        normalized_square_difference(signal, &self.internals, nsdf);

        pitch_from_peaks(
            nsdf,
            sample_rate,
            T::cast(self.config.clarity_threshold),
            T::cast(self.config.cutoff),
        )
        .filter(|pitch| pitch.frequency.is_finite())
    }

    fn frame_size(&self) -> usize {
        self.internals.size
    }
}
