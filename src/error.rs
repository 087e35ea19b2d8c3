//! Error types for the transcription and worker boundaries.
//!
//! Per-frame detection never fails; it reports unvoiced frames instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The audio buffer holds no samples
    #[error("audio buffer is empty")]
    EmptyBuffer,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Channels of one buffer must have the same length
    #[error("channel {channel} has {len} samples, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        len: usize,
        expected: usize,
    },

    /// Transcription was cancelled; partial output is discarded
    #[error("transcription cancelled")]
    Cancelled,

    #[error("analysis worker has shut down")]
    WorkerDisconnected,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "wav")]
    #[error("failed to decode audio: {0}")]
    Decode(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
