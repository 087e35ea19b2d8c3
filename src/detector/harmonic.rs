//! Harmonic strength of a candidate fundamental.
//!
//! For each harmonic `k·f` below Nyquist the amplitude at exactly that frequency is measured
//! with a Goertzel resonator, weighted by `1/k`, and averaged over the harmonics evaluated.
//! Comparing the strength of `f`, `f/2` and `2f` on the same frame tells which octave the
//! harmonic series actually supports. It cannot find a pitch on its own.
use crate::float::Float;
use crate::utils::filters::goertzel_power;

/// Weighted mean harmonic amplitude of `candidate` in `signal`. Zero when the candidate
/// is not positive or already at or above Nyquist.
pub fn harmonic_strength<T: Float>(
    signal: &[T],
    sample_rate: T,
    candidate: T,
    max_harmonic: usize,
) -> T {
    if signal.is_empty() || candidate <= T::zero() || !candidate.is_finite() {
        return T::zero();
    }
    let nyquist = sample_rate / T::cast(2.0);
    let length = T::from_len(signal.len());

    let mut sum = T::zero();
    let mut evaluated = 0;
    for k in 1..=max_harmonic {
        let harmonic = candidate * T::from_len(k);
        if harmonic >= nyquist {
            break;
        }
        let amplitude = goertzel_power(signal, harmonic, sample_rate).sqrt() / length;
        sum = sum + amplitude / T::from_len(k);
        evaluated += 1;
    }

    if evaluated == 0 {
        T::zero()
    } else {
        sum / T::from_len(evaluated)
    }
}

/// Strengths of the octave below, the candidate itself and the octave above.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OctaveStrengths<T> {
    pub below: T,
    pub at: T,
    pub above: T,
}

impl<T: Float> OctaveStrengths<T> {
    pub fn measure(signal: &[T], sample_rate: T, candidate: T, max_harmonic: usize) -> Self {
        let two = T::cast(2.0);
        OctaveStrengths {
            below: harmonic_strength(signal, sample_rate, candidate / two, max_harmonic),
            at: harmonic_strength(signal, sample_rate, candidate, max_harmonic),
            above: harmonic_strength(signal, sample_rate, candidate * two, max_harmonic),
        }
    }

    pub fn accumulate(&mut self, other: &OctaveStrengths<T>) {
        self.below = self.below + other.below;
        self.at = self.at + other.at;
        self.above = self.above + other.above;
    }

    /// `-1` when the octave below beats the candidate by `dominance`, `1` for the
    /// octave above, and `0` otherwise.
    pub fn preferred_shift(&self, dominance: T) -> i32 {
        let below = self.below > self.at * dominance;
        let above = self.above > self.at * dominance;
        match (below, above) {
            (true, true) if self.below >= self.above => -1,
            (true, true) => 1,
            (true, false) => -1,
            (false, true) => 1,
            (false, false) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harmonic_tone(f0: f64, partials: &[(usize, f64)], size: usize, sample_rate: f64) -> Vec<f64> {
        (0..size)
            .map(|i| {
                let t = i as f64 / sample_rate;
                partials
                    .iter()
                    .map(|&(k, a)| a * (2.0 * std::f64::consts::PI * f0 * k as f64 * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn pure_tone_prefers_its_own_octave() {
        let signal = harmonic_tone(220.0, &[(1, 1.0)], 4096, 44100.0);
        let strengths = OctaveStrengths::measure(&signal, 44100.0, 220.0, 8);
        assert!(strengths.at > strengths.below);
        assert!(strengths.at > strengths.above);
        assert_eq!(strengths.preferred_shift(1.2), 0);
    }

    #[test]
    fn rich_tone_pulls_an_octave_error_down() {
        // A 110 Hz voice with a strong series; the candidate is the octave error at 220 Hz.
        let signal = harmonic_tone(
            110.0,
            &[(1, 0.6), (2, 1.0), (3, 0.8), (4, 0.5), (5, 0.4), (6, 0.3)],
            4096,
            44100.0,
        );
        let strengths = OctaveStrengths::measure(&signal, 44100.0, 220.0, 8);
        assert_eq!(strengths.preferred_shift(1.1), -1);
    }

    #[test]
    fn candidate_above_nyquist_scores_zero() {
        let signal = vec![0.5f32; 256];
        assert_eq!(harmonic_strength(&signal, 8000.0, 4000.0, 4), 0.0);
        assert_eq!(harmonic_strength(&signal, 8000.0, 0.0, 4), 0.0);
    }
}
