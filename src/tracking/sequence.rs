//! Short-horizon octave disambiguation.
//!
//! Every frame offers three candidates: the estimate and its octaves below and above.
//! A Viterbi pass over the last few frames finds the cheapest candidate sequence, where
//! moving away from the raw estimate costs a confidence-scaled penalty and every jump between
//! consecutive frames costs in proportion to its size. The candidate chosen for the newest
//! frame is emitted, so an isolated octave flip loses to the continuous path while a leap
//! that persists for a couple of frames wins.
use std::collections::VecDeque;

use crate::detector::semitones_between;

const SHIFTS: [f32; 3] = [0.5, 1.0, 2.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceConfig {
    /// Number of frames kept for the path search.
    pub horizon: usize,
    /// Cost of replacing the raw estimate by an octave neighbour, scaled by `0.5 + confidence`.
    pub octave_penalty: f32,
    /// Cost per octave of movement between consecutive frames.
    pub transition_weight: f32,
    /// Cost per octave of distance from the guide, capped at one octave.
    pub guide_weight: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        SequenceConfig {
            horizon: 6,
            octave_penalty: 0.6,
            transition_weight: 1.0,
            guide_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    candidates: [f32; 3],
    costs: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct OctaveSequenceSelector {
    config: SequenceConfig,
    min_frequency: f32,
    max_frequency: f32,
    frames: VecDeque<Frame>,
}

impl OctaveSequenceSelector {
    pub fn new(config: SequenceConfig, min_frequency: f32, max_frequency: f32) -> Self {
        OctaveSequenceSelector {
            config,
            min_frequency,
            max_frequency,
            frames: VecDeque::with_capacity(config.horizon.max(1)),
        }
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Add a voiced frame and return the frequency chosen for it.
    pub fn push(&mut self, frequency: f32, confidence: f32, guide: Option<f32>) -> f32 {
        let newest = self.frame(frequency, confidence, guide);
        if self.frames.len() >= self.config.horizon.max(1) {
            self.frames.pop_front();
        }
        self.frames.push_back(newest);

        let mut path = [0.0f32; 3];
        let mut frames = self.frames.iter();
        if let Some(first) = frames.next() {
            path = first.costs;
            let mut previous = first;
            for frame in frames {
                let mut next = [f32::INFINITY; 3];
                for (s, slot) in next.iter_mut().enumerate() {
                    if !frame.costs[s].is_finite() {
                        continue;
                    }
                    let best = (0..3)
                        .filter(|&p| path[p].is_finite())
                        .map(|p| path[p] + self.transition(previous.candidates[p], frame.candidates[s]))
                        .fold(f32::INFINITY, f32::min);
                    *slot = best + frame.costs[s];
                }
                path = next;
                previous = frame;
            }
        }

        let best = (0..3)
            .filter(|&s| path[s].is_finite())
            .min_by(|&a, &b| path[a].total_cmp(&path[b]))
            .unwrap_or(1);
        newest.candidates[best]
    }

    fn frame(&self, frequency: f32, confidence: f32, guide: Option<f32>) -> Frame {
        let mut candidates = [0.0f32; 3];
        let mut costs = [f32::INFINITY; 3];
        for (i, &shift) in SHIFTS.iter().enumerate() {
            let candidate = frequency * shift;
            candidates[i] = candidate;
            let in_range = candidate >= self.min_frequency && candidate <= self.max_frequency;
            if shift != 1.0 && !in_range {
                continue;
            }
            let mut cost = if shift == 1.0 {
                0.0
            } else {
                self.config.octave_penalty * (0.5 + confidence)
            };
            if let Some(guide) = guide {
                let distance = semitones_between(candidate, guide).abs().min(12.0);
                cost += self.config.guide_weight * distance / 12.0;
            }
            costs[i] = cost;
        }
        Frame { candidates, costs }
    }

    fn transition(&self, from: f32, to: f32) -> f32 {
        self.config.transition_weight * semitones_between(to, from).abs() / 12.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> OctaveSequenceSelector {
        OctaveSequenceSelector::new(SequenceConfig::default(), 60.0, 4200.0)
    }

    #[test]
    fn first_frame_keeps_raw_estimate() {
        let mut selector = selector();
        assert_eq!(selector.push(220.0, 0.7, None), 220.0);
    }

    #[test]
    fn isolated_octave_flip_is_folded() {
        let mut selector = selector();
        for _ in 0..4 {
            assert_eq!(selector.push(220.0, 0.95, None), 220.0);
        }
        assert_eq!(selector.push(440.0, 0.95, None), 220.0);
        assert_eq!(selector.push(220.0, 0.95, None), 220.0);
    }

    #[test]
    fn sustained_leap_is_followed() {
        let mut selector = selector();
        for _ in 0..4 {
            selector.push(220.0, 0.95, None);
        }
        assert_eq!(selector.push(440.0, 0.95, None), 220.0);
        assert_eq!(selector.push(440.0, 0.95, None), 440.0);
        assert_eq!(selector.push(440.0, 0.95, None), 440.0);
    }

    #[test]
    fn horizon_bounds_history() {
        let mut selector = selector();
        for _ in 0..20 {
            selector.push(220.0, 0.9, None);
        }
        assert_eq!(selector.len(), 6);
        selector.reset();
        assert!(selector.is_empty());
    }

    #[test]
    fn guide_breaks_ties_towards_its_octave() {
        let mut selector = selector();
        // Low confidence on a lone frame: the octave below matches the guide.
        assert_eq!(selector.push(440.0, 0.1, Some(220.0)), 220.0);
    }

    #[test]
    fn out_of_band_octaves_are_never_chosen() {
        let mut selector = OctaveSequenceSelector::new(SequenceConfig::default(), 60.0, 4200.0);
        assert_eq!(selector.push(100.0, 0.1, Some(50.0)), 100.0);
    }
}
