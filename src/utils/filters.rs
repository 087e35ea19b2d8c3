use crate::float::Float;

/// First-order pre-emphasis, `y[n] = x[n] - coefficient * x[n-1]`, in place.
pub fn pre_emphasis(signal: &mut [f32], coefficient: f32) {
    let mut previous = 0.0;
    for s in signal.iter_mut() {
        let current = *s;
        *s = current - coefficient * previous;
        previous = current;
    }
}

/// Downsample by averaging consecutive blocks of `factor` samples. A trailing
/// partial block is averaged over the samples it has.
pub fn block_downsample(signal: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return signal.to_vec();
    }
    signal
        .chunks(factor)
        .map(|block| block.iter().sum::<f32>() / block.len() as f32)
        .collect()
}

/// Median of `values`, averaging the two middle elements for even lengths.
/// Reorders `values`; returns `None` when empty.
pub fn median_in_place(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

pub fn median(values: &[f32]) -> Option<f32> {
    let mut scratch = values.to_vec();
    median_in_place(&mut scratch)
}

/// Median filter over the voiced (positive) entries of `track`. Each voiced
/// entry becomes the median of the voiced entries in the centered window of
/// `width` frames; unvoiced entries stay zero.
pub fn voiced_median_filter(track: &[f32], width: usize) -> Vec<f32> {
    let half = width / 2;
    let mut window = Vec::with_capacity(width.max(1));
    track
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            if value <= 0.0 {
                return 0.0;
            }
            window.clear();
            let start = i.saturating_sub(half);
            let stop = (i + half + 1).min(track.len());
            window.extend(track[start..stop].iter().copied().filter(|&v| v > 0.0));
            median_in_place(&mut window).unwrap_or(value)
        })
        .collect()
}

/// Goertzel algorithm: power of `signal` at `frequency`, evaluated with the
/// two-pole resonator `s[n] = x[n] + 2cos(w) s[n-1] - s[n-2]`. The frequency is
/// not snapped to a DFT bin.
pub fn goertzel_power<T: Float>(signal: &[T], frequency: T, sample_rate: T) -> T {
    let w = T::cast(2.0 * std::f64::consts::PI) * frequency / sample_rate;
    let coeff = T::cast(2.0) * w.cos();

    let mut s1 = T::zero();
    let mut s2 = T::zero();
    for &x in signal {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    (s1 * s1 + s2 * s2 - coeff * s1 * s2).max(T::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_emphasis_removes_dc() {
        let mut signal = vec![1.0f32; 8];
        pre_emphasis(&mut signal, 0.97);
        assert_eq!(signal[0], 1.0);
        assert!(signal[1..].iter().all(|&s| (s - 0.03).abs() < 1e-6));
    }

    #[test]
    fn block_downsample_averages() {
        let signal = [1.0, 3.0, 2.0, 4.0, 5.0];
        assert_eq!(block_downsample(&signal, 2), vec![2.0, 3.0, 5.0]);
        assert_eq!(block_downsample(&signal, 1), signal.to_vec());
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn voiced_median_filter_removes_spike_and_keeps_gaps() {
        let track = [100.0, 100.0, 200.0, 100.0, 100.0, 0.0, 0.0, 150.0];
        let filtered = voiced_median_filter(&track, 5);
        assert_eq!(filtered[2], 100.0);
        assert_eq!(filtered[5], 0.0);
        assert_eq!(filtered[6], 0.0);
        assert_eq!(filtered[7], 150.0);
    }

    #[test]
    fn goertzel_peaks_at_tone() {
        let sample_rate = 8000.0f64;
        let signal: Vec<f64> = (0..800)
            .map(|i| (2.0 * std::f64::consts::PI * 500.0 * i as f64 / sample_rate).sin())
            .collect();
        let on = goertzel_power(&signal, 500.0, sample_rate);
        let off = goertzel_power(&signal, 730.0, sample_rate);
        // A unit sine over N samples carries (N/2)^2 at its own frequency.
        assert!((on - 400.0 * 400.0).abs() / (400.0 * 400.0) < 0.01);
        assert!(off < on * 0.01);
    }
}
