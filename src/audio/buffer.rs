use crate::error::{GridError, Result};

/// Mono PCM handed over by the decoder. Immutable once built; every stage
/// borrows it.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(GridError::InvalidInput("sample rate must be > 0".into()));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Downmix interleaved multi-channel PCM to mono.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(GridError::InvalidInput("channel count must be > 0".into()));
        }
        let samples = if channels == 1 {
            interleaved.to_vec()
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
