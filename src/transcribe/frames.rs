//! Frame-wise pitch extraction over a whole signal.
use std::thread;

use log::trace;

use crate::detector::realtime::{DetectOptions, RealtimeDetector};
use crate::error::{Error, Result};
use crate::transcribe::CancelToken;
use crate::utils::buffer::hann_window;

/// Parallel frequency and confidence tracks, one entry per analysis frame.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameTrack {
    pub frequency: Vec<f32>,
    pub confidence: Vec<f32>,
    pub hop: usize,
    pub frame_size: usize,
    pub sample_rate: f32,
}

impl FrameTrack {
    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    /// Time at which the last sample of `frame` arrives, in seconds. This is when a
    /// live capture would hand the same frame to the detector, so the latency shift
    /// applies to it unchanged.
    pub fn time(&self, frame: usize) -> f32 {
        (frame * self.hop + self.frame_size) as f32 / self.sample_rate
    }

    pub fn hop_seconds(&self) -> f32 {
        self.hop as f32 / self.sample_rate
    }

    /// First sample of `frame` in the analysed signal.
    pub fn frame_start(&self, frame: usize) -> usize {
        frame * self.hop
    }
}

/// Power of two nearest to `duration` seconds of samples, clamped to `[min, max]`.
pub(crate) fn frame_size_for(sample_rate: f32, duration: f32, min: usize, max: usize) -> usize {
    let target = (duration * sample_rate).max(1.0);
    let size = 2f32.powf(target.log2().round()) as usize;
    size.clamp(min.min(max), max)
}

/// Hop in samples for an analysis rate hint, clamped to `[min_rate, max_rate]`
/// frames per second.
pub(crate) fn hop_for(sample_rate: f32, rate_hint: f32, min_rate: f32, max_rate: f32) -> usize {
    let rate = if rate_hint.is_finite() && rate_hint > 0.0 {
        rate_hint.clamp(min_rate, max_rate)
    } else {
        min_rate
    };
    ((sample_rate / rate).round() as usize).max(1)
}

pub(crate) struct ScanSettings {
    pub frame_size: usize,
    pub hop: usize,
    pub min_rms: f32,
    pub yield_interval: usize,
}

/// Run the stateful detector over every frame of `signal`. `on_progress` receives the
/// fraction of frames done at each yield point.
pub(crate) fn scan<P>(
    signal: &[f32],
    sample_rate: f32,
    settings: &ScanSettings,
    cancel: &CancelToken,
    mut on_progress: P,
) -> Result<FrameTrack>
where
    P: FnMut(f32),
{
    let frame_size = settings.frame_size;
    let hop = settings.hop.max(1);
    let count = if signal.len() > frame_size {
        (signal.len() - frame_size) / hop + 1
    } else {
        1
    };

    let mut detector = RealtimeDetector::new(frame_size);
    let options = DetectOptions {
        min_rms: Some(settings.min_rms),
        ..DetectOptions::default()
    };
    let window = hann_window::<f32>(frame_size);
    let mut frame = vec![0.0f32; frame_size];
    let mut track = FrameTrack {
        frequency: Vec::with_capacity(count),
        confidence: Vec::with_capacity(count),
        hop,
        frame_size,
        sample_rate,
    };
    let detector_rate = sample_rate.round() as u32;
    let yield_interval = settings.yield_interval.max(1);

    for i in 0..count {
        let start = i * hop;
        let available = signal.len().saturating_sub(start).min(frame_size);
        for (k, slot) in frame.iter_mut().enumerate() {
            *slot = if k < available {
                signal[start + k] * window[k]
            } else {
                0.0
            };
        }

        let estimate = detector.analyze(&frame, detector_rate, &options);
        track.frequency.push(estimate.frequency);
        track.confidence.push(estimate.confidence);

        if (i + 1) % yield_interval == 0 {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            on_progress((i + 1) as f32 / count as f32);
            thread::yield_now();
        }
    }

    trace!(
        "scanned {} frames of {} samples, hop {}",
        count,
        frame_size,
        hop
    );
    Ok(track)
}
