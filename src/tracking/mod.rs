//! Cross-frame tracking: contour smoothing and octave-sequence selection.
pub mod sequence;
pub mod smoother;

pub use sequence::{OctaveSequenceSelector, SequenceConfig};
pub use smoother::{SmootherConfig, StreamingSmoother};
