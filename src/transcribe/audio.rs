//! Decoded audio handed to the transcriber.
#[cfg(feature = "wav")]
use std::io::Read;
#[cfg(feature = "wav")]
use std::path::Path;

use crate::error::{Error, Result};

/// Planar float audio: one sample vector per channel, all of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if channels.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        let expected = channels[0].len();
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != expected)
        {
            return Err(Error::ChannelLengthMismatch {
                channel,
                len: samples.len(),
                expected,
            });
        }
        Ok(AudioBuffer {
            sample_rate,
            channels,
        })
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        Self::new(sample_rate, vec![samples])
    }

    /// Split interleaved frames into planar channels. A trailing partial frame
    /// is dropped.
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Result<Self> {
        if channel_count == 0 {
            return Err(Error::EmptyBuffer);
        }
        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|c| (0..frames).map(|f| samples[f * channel_count + c]).collect())
            .collect();
        Self::new(sample_rate, channels)
    }

    /// Decode a WAV stream. Integer samples are scaled to `[-1, 1)`.
    #[cfg(feature = "wav")]
    pub fn from_wav<R: Read>(reader: R) -> Result<Self> {
        let mut reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };
        Self::from_interleaved(spec.sample_rate, spec.channels as usize, &samples)
    }

    #[cfg(feature = "wav")]
    pub fn open_wav<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_wav(std::io::BufReader::new(file))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    /// Average of all channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f32;
        (0..self.len())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
            .collect()
    }
}
