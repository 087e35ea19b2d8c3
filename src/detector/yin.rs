//! The YIN pitch detection algorithm is based on the algorithm from the paper
//! *[YIN, a fundamental frequency estimator for speech and music](http://recherche.ircam.fr/equipes/pcm/cheveign/ps/2002_JASA_YIN_proof.pdf)*.
//!
//! Let $S=(s_0,s_1,\ldots,s_{N-1})$ be a discrete frame. The *square difference function* at lag $t$
//! is defined by
//! $$ d(t) = \sum_{i=0}^{N-t-1} (s_i-s_{i+t})^2. $$
//! This function is close to zero when the signal "lines up" with itself. Its value depends on
//! volume, so YIN works with the *cumulative mean normalized difference function*,
//! $$ d\'(t) = \begin{cases}1&\text{if }t=0\\\\ d(t) / \left[ \tfrac{1}{t}\sum_{i=1}^t d(i) \right] & \text{otherwise}\end{cases}. $$
//!
//! ## Implementation
//! Each frame has its DC offset removed and is shaped by a Hann window computed once per
//! detector. The difference function is evaluated through an FFT autocorrelation. The lag
//! search is limited to the band given by `min_frequency` and `max_frequency`: the first lag whose
//! normalized difference falls below `threshold` wins (followed down to the bottom of its dip),
//! then the first local minimum, then the global minimum. The lag is refined by parabolic
//! interpolation unless the vertex would move by more than one sample.
//!
//! Confidence is `1 - d'(lag)`, reduced by `edge_penalty` when the lag sits in the outer
//! `edge_fraction` of the search band.

use crate::detector::internals::{square_difference, yin_normalize_square_error};
use crate::detector::internals::{DetectorInternals, Pitch};
use crate::detector::PitchDetector;
use crate::float::Float;
use crate::utils::buffer::{hann_window, remove_dc, square_sum};
use crate::utils::peak::parabolic_offset;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YINConfig {
    pub sample_rate: usize,
    pub frame_size: usize,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub threshold: f64,
    pub edge_fraction: f64,
    pub edge_penalty: f64,
}

impl Default for YINConfig {
    fn default() -> Self {
        YINConfig {
            sample_rate: 44100,
            frame_size: 2048,
            min_frequency: 50.0,
            max_frequency: 2000.0,
            threshold: 0.15,
            edge_fraction: 0.03,
            edge_penalty: 0.15,
        }
    }
}

/// Output of [YINDetector::process]. All fields are zero when the frame is unvoiced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YINEstimate<T> {
    pub frequency: T,
    pub confidence: T,
    /// Refined lag in samples.
    pub lag: T,
}

impl<T: Float> YINEstimate<T> {
    fn unvoiced() -> Self {
        YINEstimate {
            frequency: T::zero(),
            confidence: T::zero(),
            lag: T::zero(),
        }
    }
}

pub struct YINDetector<T>
where
    T: Float,
{
    internals: DetectorInternals<T>,
    window: Vec<T>,
    config: YINConfig,
}

impl<T> YINDetector<T>
where
    T: Float,
{
    pub fn new(config: YINConfig) -> Self {
        let internals = DetectorInternals::<T>::new(config.frame_size, config.frame_size);
        let window = hann_window(config.frame_size);
        YINDetector {
            internals,
            window,
            config,
        }
    }

    pub fn config(&self) -> &YINConfig {
        &self.config
    }

    /// Estimate the pitch of `signal` at the configured sample rate.
    pub fn process(&mut self, signal: &[T]) -> YINEstimate<T> {
        self.estimate(signal, self.config.sample_rate)
    }

    pub fn estimate(&mut self, signal: &[T], sample_rate: usize) -> YINEstimate<T> {
        let size = self.config.frame_size;
        if signal.len() < size || size < 4 || sample_rate == 0 {
            return YINEstimate::unvoiced();
        }

        let mut frame_ref = self.internals.buffers.get_real_buffer();
        let frame = &mut frame_ref[..size];
        frame.copy_from_slice(&signal[..size]);
        remove_dc(frame);
        if square_sum(frame) <= T::zero() {
            return YINEstimate::unvoiced();
        }
        frame
            .iter_mut()
            .zip(self.window.iter())
            .for_each(|(s, &w)| *s = *s * w);

        let mut diff_ref = self.internals.buffers.get_real_buffer();
        let diff = &mut diff_ref[..size];
        square_difference(frame, &self.internals, diff);
        yin_normalize_square_error(diff);

        let rate = sample_rate as f64;
        let tau_min = ((rate / self.config.max_frequency).floor() as usize).max(2);
        let tau_max = ((rate / self.config.min_frequency).ceil() as usize).min(size - 2);
        if tau_min >= tau_max {
            return YINEstimate::unvoiced();
        }

        let threshold = T::cast(self.config.threshold);
        let mut global = tau_min;
        let mut local = None;
        let mut crossing = None;
        for tau in tau_min..=tau_max {
            if diff[tau] < diff[global] {
                global = tau;
            }
            if local.is_none() && diff[tau] <= diff[tau - 1] && diff[tau] <= diff[tau + 1] {
                local = Some(tau);
            }
            if diff[tau] < threshold {
                let mut bottom = tau;
                while bottom < tau_max && diff[bottom + 1] < diff[bottom] {
                    bottom += 1;
                }
                crossing = Some(bottom);
                break;
            }
        }
        let tau = crossing.or(local).unwrap_or(global);

        let shift = parabolic_offset(diff[tau - 1], diff[tau], diff[tau + 1]).unwrap_or(T::zero());
        let lag = T::from_len(tau) + shift;
        let frequency = T::from_len(sample_rate) / lag;
        if !frequency.is_finite() || frequency <= T::zero() {
            return YINEstimate::unvoiced();
        }

        let mut confidence = T::one() - diff[tau];
        let edge = self.config.edge_fraction * (tau_max - tau_min) as f64;
        let t = tau as f64;
        if t < tau_min as f64 + edge || t > tau_max as f64 - edge {
            confidence = confidence - T::cast(self.config.edge_penalty);
        }

        YINEstimate {
            frequency,
            confidence: confidence.max(T::zero()).min(T::one()),
            lag,
        }
    }
}

/// Pitch detection based on the YIN algorithm. The configured sample rate is
/// overridden by the one given per call.
impl<T> PitchDetector<T> for YINDetector<T>
where
    T: Float,
{
    fn get_pitch(&mut self, signal: &[T], sample_rate: usize) -> Option<Pitch<T>> {
        let estimate = self.estimate(signal, sample_rate);
        if estimate.frequency > T::zero() {
            Some(Pitch {
                frequency: estimate.frequency,
                clarity: estimate.confidence,
            })
        } else {
            None
        }
    }

    fn frame_size(&self) -> usize {
        self.config.frame_size
    }
}
