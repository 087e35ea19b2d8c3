use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftPlanner};

use crate::float::Float;
use crate::utils::buffer::{copy_complex_to_real, copy_real_to_complex, modulus_squared};
use crate::utils::buffer::BufferPool;
use crate::utils::peak::{choose_peak, correct_peak, detect_peaks};

/// Raw output of a single-frame estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pitch<T>
where
    T: Float,
{
    pub frequency: T,
    pub clarity: T,
}

/// Data structure to hold any buffers needed for pitch computation.
/// Buffers are allocated once and reused through a `BufferPool`, and the
/// FFTs for the padded frame length are planned once at construction.
pub struct DetectorInternals<T>
where
    T: Float,
{
    pub size: usize,
    pub padding: usize,
    pub buffers: BufferPool<T>,
    fft: Arc<dyn Fft<T>>,
    inv_fft: Arc<dyn Fft<T>>,
}

impl<T> DetectorInternals<T>
where
    T: Float,
{
    /// `padding` zeros are appended to each frame before transforming. A padding of
    /// at least `size` keeps every lag free of circular wrap-around.
    pub fn new(size: usize, padding: usize) -> Self {
        let buffers = BufferPool::new(size + padding);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size + padding);
        let inv_fft = planner.plan_fft_inverse(size + padding);

        DetectorInternals {
            size,
            padding,
            buffers,
            fft,
            inv_fft,
        }
    }
}

/// Compute the autocorrelation of `signal` into `result`, for lags `0..result.len()`.
///
/// > r(t) = sum_{i=0}^{N-t-1} x_i * x_{i+t}
pub fn autocorrelation<T>(signal: &[T], internals: &DetectorInternals<T>, result: &mut [T])
where
    T: Float,
{
    let n = internals.size + internals.padding;
    assert!(signal.len() <= n, "signal does not fit the planned FFT length");

    let mut signal_ref = internals.buffers.get_complex_buffer();
    let mut scratch_ref = internals.buffers.get_complex_buffer();
    let scratch_len = internals
        .fft
        .get_inplace_scratch_len()
        .max(internals.inv_fft.get_inplace_scratch_len());
    if scratch_ref.len() < scratch_len {
        scratch_ref.resize(scratch_len, Complex::zero());
    }
    // Pooled buffers may have been grown for scratch use, so always slice to `n`.
    let signal_complex = &mut signal_ref[..n];
    let scratch = &mut scratch_ref[..scratch_len];

    copy_real_to_complex(signal, signal_complex);
    internals.fft.process_with_scratch(signal_complex, scratch);
    modulus_squared(signal_complex);
    internals.inv_fft.process_with_scratch(signal_complex, scratch);

    // rustfft does not normalize, so a forward/inverse pair scales by `n`.
    let normalization = T::one() / T::from_len(n);
    signal_complex
        .iter_mut()
        .for_each(|c| *c = *c * normalization);
    let lags = result.len().min(n);
    copy_complex_to_real(&signal_complex[..lags], &mut result[..lags]);
    result[lags..].iter_mut().for_each(|r| *r = T::zero());
}

/// Compute m(t) = sum_{i=0}^{N-t-1} (x_i^2 + x_{i+t}^2) for lags `0..result.len()`.
fn m_of_tau<T>(signal: &[T], result: &mut [T])
where
    T: Float,
{
    let n = signal.len();
    let mut m = T::cast(2.0) * signal.iter().map(|&s| s * s).sum::<T>();
    for (tau, r) in result.iter_mut().enumerate() {
        if tau >= n {
            *r = T::zero();
            continue;
        }
        *r = m;
        let head = signal[tau];
        let tail = signal[n - 1 - tau];
        m = m - head * head - tail * tail;
    }
}

/// The normalized square difference function of the McLeod pitch method,
///
/// > n(t) = 2 r(t) / m(t)
///
/// written for lags `0..result.len()`. Lags where `m(t)` vanishes are set to zero.
pub fn normalized_square_difference<T>(
    signal: &[T],
    internals: &DetectorInternals<T>,
    result: &mut [T],
) where
    T: Float,
{
    let two = T::cast(2.0);

    let mut scratch_ref = internals.buffers.get_real_buffer();
    let scratch = &mut scratch_ref[..result.len()];

    autocorrelation(signal, internals, result);
    m_of_tau(signal, scratch);
    let floor = T::epsilon();
    result.iter_mut().zip(scratch.iter()).for_each(|(r, &m)| {
        *r = if m > floor { two * *r / m } else { T::zero() };
    });
}

/// Compute the full-overlap square difference of `signal` for lags `0..result.len()`,
///
/// > d(t) = sum_{i=0}^{N-t-1} (x_i - x_{i+t})^2
///
/// using d(t) = pow(0..N-t) + pow(t..N) - 2 r(t), where the powers come from
/// a running prefix sum of squares and r(t) from the FFT autocorrelation.
pub fn square_difference<T>(signal: &[T], internals: &DetectorInternals<T>, result: &mut [T])
where
    T: Float,
{
    let n = signal.len();
    let two = T::cast(2.0);

    autocorrelation(signal, internals, result);

    let mut prefix_ref = internals.buffers.get_real_buffer();
    let prefix = &mut prefix_ref[..n + 1];
    prefix[0] = T::zero();
    for i in 0..n {
        prefix[i + 1] = prefix[i] + signal[i] * signal[i];
    }
    let total = prefix[n];

    result.iter_mut().enumerate().for_each(|(tau, a)| {
        if tau >= n {
            *a = T::zero();
            return;
        }
        let head = prefix[n - tau];
        let tail = total - prefix[tau];
        // FFT round-off can push a vanishing difference slightly below zero.
        *a = (head + tail - two * *a).max(T::zero());
    });
}

/// Calculate the "cumulative mean normalized difference function" as
/// specified in the YIN paper. If _d(t)_ is the square error function,
/// compute _d'(0) = 1_ and for _t > 0_
///
///  > d'(t) = d(t) / [ (1/t) * sum_{i=1}^t d(i) ]
///
/// A vanishing running sum yields 1.
pub fn yin_normalize_square_error<T: Float>(square_error: &mut [T]) {
    let mut sum = T::zero();
    if square_error.is_empty() {
        return;
    }
    square_error[0] = T::one();
    square_error
        .iter_mut()
        .enumerate()
        .skip(1)
        .for_each(|(tau, a)| {
            sum = sum + *a;
            *a = if sum > T::zero() {
                *a * T::from_len(tau) / sum
            } else {
                T::one()
            };
        });
}

/// Find the McLeod key maximum of an NSDF and convert it to a pitch.
pub fn pitch_from_peaks<T>(
    input: &[T],
    sample_rate: usize,
    clarity_threshold: T,
    cutoff: T,
) -> Option<Pitch<T>>
where
    T: Float,
{
    let sample_rate = T::from_len(sample_rate);
    let peaks = detect_peaks(input);

    choose_peak(peaks, clarity_threshold, cutoff)
        .map(|peak| correct_peak(peak, input))
        .filter(|peak| peak.0 > T::zero())
        .map(|peak| Pitch {
            frequency: sample_rate / peak.0,
            clarity: peak.1.min(T::one()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocorrelation_test() {
        let signal: Vec<f64> = vec![0., 1., 2., 0., -1., -2.];
        let internals = DetectorInternals::new(signal.len(), signal.len());

        let expected: Vec<f64> = (0..signal.len())
            .map(|t| {
                signal[..signal.len() - t]
                    .iter()
                    .zip(signal[t..].iter())
                    .map(|(a, b)| *a * *b)
                    .sum()
            })
            .collect();

        let mut computed = vec![0.; signal.len()];
        autocorrelation(&signal, &internals, &mut computed);
        // Using an FFT loses precision; we don't care that much, so round generously.
        computed
            .iter_mut()
            .for_each(|x| *x = (*x * 100.).round() / 100.);

        assert_eq!(expected, computed);
    }

    #[test]
    fn square_difference_test() {
        let signal: Vec<f64> = vec![0., 1., 2., 0., -1., -2.];
        let internals = DetectorInternals::new(signal.len(), signal.len());

        let expected: Vec<f64> = (0..signal.len())
            .map(|t| {
                signal[..signal.len() - t]
                    .iter()
                    .zip(signal[t..].iter())
                    .map(|(x_j, x_j_tau)| (*x_j - *x_j_tau) * (*x_j - *x_j_tau))
                    .sum()
            })
            .collect();

        let mut computed = vec![0.; signal.len()];
        square_difference(&signal, &internals, &mut computed);
        computed
            .iter_mut()
            .for_each(|x| *x = (*x * 100.).round() / 100.);

        assert_eq!(expected, computed);
    }

    #[test]
    fn yin_normalized_square_error_test() {
        let signal: &mut Vec<f64> = &mut vec![0., 6., 14.];
        let result = vec![1., 1., 2. * 14. / (6. + 14.)];

        yin_normalize_square_error(signal);

        assert_eq!(result, *signal);
    }

    #[test]
    fn yin_normalization_guards_zero_sum() {
        let signal: &mut Vec<f64> = &mut vec![0., 0., 0., 3.];
        yin_normalize_square_error(signal);
        assert_eq!(*signal, vec![1., 1., 1., 3.]);
    }

    #[test]
    fn nsdf_of_periodic_signal_peaks_at_period() {
        let period = 8;
        let signal: Vec<f64> = (0..64)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin())
            .collect();
        let internals = DetectorInternals::new(signal.len(), signal.len());
        let mut nsdf = vec![0.; signal.len()];
        normalized_square_difference(&signal, &internals, &mut nsdf);

        assert!((nsdf[0] - 1.0).abs() < 1e-9);
        assert!(nsdf[period] > 0.99);
        assert!(nsdf[period / 2] < -0.99);
    }
}
