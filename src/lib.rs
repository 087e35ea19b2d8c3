//! # Intonation
//! *intonation* is the signal-processing core of a vocal pitch trainer. It estimates the
//! fundamental frequency of a singing voice frame by frame, stabilizes it for live display,
//! and transcribes whole recordings into notes and a pitch curve.
//!
//! # Detectors
//! A *detector* estimates the pitch of a single frame. Detectors never fail; a frame with no
//! usable pitch is reported as unvoiced.
//!
//!   * [McLeodDetector][detector::mcleod], the default core for live input
//!   * [YINDetector][detector::yin], band-limited with a confidence value
//!   * [RealtimeDetector][detector::realtime], the stateful wrapper that adds silence gating,
//!     guide correction, octave selection and continuity
//!
//! # Tracking and transcription
//!   * [StreamingSmoother][tracking::smoother] smooths a live contour for display
//!   * [MelodyTranscriber][transcribe::MelodyTranscriber] turns a recording into notes
//!   * [AnalysisWorker][worker::AnalysisWorker] runs a live detector on its own thread
//!
//! # Examples
//! ```
//! use intonation::detector::realtime::{DetectOptions, RealtimeDetector};
//!
//! const SAMPLE_RATE: u32 = 44100;
//! const SIZE: usize = 2048;
//!
//! // Signal coming from some source (microphone, generated, etc...)
//! let dt = 1.0 / SAMPLE_RATE as f32;
//! let freq = 220.0;
//! let signal: Vec<f32> = (0..SIZE)
//!     .map(|x| 0.5 * (2.0 * std::f32::consts::PI * x as f32 * dt * freq).sin())
//!     .collect();
//!
//! let mut detector = RealtimeDetector::new(SIZE);
//! let estimate = detector.analyze(&signal, SAMPLE_RATE, &DetectOptions::default());
//!
//! assert!((estimate.frequency - freq).abs() < 2.0);
//! println!("Frequency: {}, Confidence: {}", estimate.frequency, estimate.confidence);
//! ```

pub use detector::internals::Pitch;
pub use detector::PitchEstimate;
pub use error::{Error, Result};

pub mod detector;
pub mod error;
pub mod float;
pub mod tracking;
pub mod transcribe;
pub mod utils;
pub mod worker;
