//! Cross-frame stabilization of a pitch contour.
//!
//! Valid frequencies go through a short median ring. The median then has to clear a
//! confidence-scaled deadband, and a direction-dependent hysteresis band, before the output
//! follows it. Movement inside the hysteresis band is only taken halfway. Every step is clamped
//! to a confidence-scaled maximum.
use std::collections::VecDeque;

use crate::utils::filters::median;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmootherConfig {
    /// Length of the median ring.
    pub window: usize,
    pub deadband_cents: f32,
    /// Hysteresis for upward movement.
    pub rise_cents: f32,
    /// Hysteresis for downward movement; wider, to damp spurious drops.
    pub fall_cents: f32,
    /// Largest step per push at full confidence.
    pub max_step_cents: f32,
    /// Smallest allowed step cap, whatever the confidence.
    pub min_step_cents: f32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        SmootherConfig {
            window: 5,
            deadband_cents: 8.0,
            rise_cents: 15.0,
            fall_cents: 25.0,
            max_step_cents: 50.0,
            min_step_cents: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingSmoother {
    config: SmootherConfig,
    ring: VecDeque<f32>,
    output: Option<f32>,
}

impl Default for StreamingSmoother {
    fn default() -> Self {
        StreamingSmoother::new(SmootherConfig::default())
    }
}

impl StreamingSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        StreamingSmoother {
            config,
            ring: VecDeque::with_capacity(config.window.max(1)),
            output: None,
        }
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.output = None;
    }

    /// Push one frame and return the smoothed frequency in Hz. Unvoiced frames hold
    /// the previous output, or return 0 before any valid frame was seen.
    pub fn push(&mut self, frequency: f32, confidence: f32) -> f32 {
        let last = self.output;
        if !(frequency > 0.0) || !frequency.is_finite() {
            return last.unwrap_or(0.0);
        }
        let confidence = confidence.clamp(0.0, 1.0);

        if self.ring.len() >= self.config.window.max(1) {
            self.ring.pop_front();
        }
        self.ring.push_back(frequency);
        let target = median(self.ring.make_contiguous()).unwrap_or(frequency);

        let last = match last {
            Some(last) => last,
            None => {
                self.output = Some(target);
                return target;
            }
        };

        let cents = 1200.0 * (target / last).log2();
        let deadband = self.config.deadband_cents * (0.6 + 0.4 * confidence);
        if cents.abs() < deadband {
            return last;
        }

        let hysteresis = if cents > 0.0 {
            self.config.rise_cents
        } else {
            self.config.fall_cents
        } * (1.5 - 0.5 * confidence);
        let mut step = if cents.abs() < hysteresis {
            0.5 * cents
        } else {
            cents
        };

        let max_step = (self.config.max_step_cents * confidence).max(self.config.min_step_cents);
        step = step.clamp(-max_step, max_step);

        let next = last * 2f32.powf(step / 1200.0);
        self.output = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(a: f32, b: f32) -> f32 {
        1200.0 * (a / b).log2()
    }

    #[test]
    fn unvoiced_before_data_is_zero() {
        let mut smoother = StreamingSmoother::default();
        assert_eq!(smoother.push(0.0, 1.0), 0.0);
        assert_eq!(smoother.push(-3.0, 1.0), 0.0);
    }

    #[test]
    fn constant_input_does_not_drift() {
        let mut smoother = StreamingSmoother::default();
        for _ in 0..20 {
            assert_eq!(smoother.push(220.0, 0.8), 220.0);
        }
    }

    #[test]
    fn deadband_holds_output() {
        let mut smoother = StreamingSmoother::default();
        smoother.push(220.0, 1.0);
        let nudged = 220.0 * 2f32.powf(5.0 / 1200.0);
        assert_eq!(smoother.push(nudged, 1.0), 220.0);
    }

    #[test]
    fn large_change_moves_output_with_step_limit() {
        let mut smoother = StreamingSmoother::default();
        smoother.push(220.0, 1.0);
        let target = 220.0 * 2f32.powf(200.0 / 1200.0);
        let out = smoother.push(target, 1.0);
        assert!(out > 220.0);
        assert!(cents(out, 220.0) <= 50.0 + 1e-3);
    }

    #[test]
    fn unvoiced_holds_previous_output() {
        let mut smoother = StreamingSmoother::default();
        smoother.push(330.0, 1.0);
        assert_eq!(smoother.push(0.0, 0.0), 330.0);
    }

    #[test]
    fn median_rejects_single_outlier() {
        let mut smoother = StreamingSmoother::default();
        for _ in 0..5 {
            smoother.push(220.0, 1.0);
        }
        assert_eq!(smoother.push(440.0, 1.0), 220.0);
    }

    #[test]
    fn falls_are_damped_more_than_rises() {
        let mut up = StreamingSmoother::default();
        let mut down = StreamingSmoother::default();
        up.push(220.0, 1.0);
        down.push(220.0, 1.0);
        // About 20 cents of median movement: past the rise band, inside the fall band.
        let high = 220.0 * 2f32.powf(40.0 / 1200.0);
        let low = 220.0 * 2f32.powf(-40.0 / 1200.0);
        let rise = up.push(high, 1.0);
        let fall = down.push(low, 1.0);
        let rise_median = cents((220.0 + high) / 2.0, 220.0);
        let fall_median = cents((220.0 + low) / 2.0, 220.0);
        assert!((cents(rise, 220.0) - rise_median).abs() < 0.01);
        assert!((cents(fall, 220.0) - 0.5 * fall_median).abs() < 0.01);
    }

    #[test]
    fn reset_forgets_history() {
        let mut smoother = StreamingSmoother::default();
        smoother.push(220.0, 1.0);
        smoother.reset();
        assert_eq!(smoother.push(0.0, 1.0), 0.0);
        assert_eq!(smoother.push(330.0, 1.0), 330.0);
    }
}
