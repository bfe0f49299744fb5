//! Shared spectral primitives: FFT, Hanning window, mel filterbank and a
//! framed magnitude analyser.
//!
//! Windows, FFT plans and filterbanks are plain values. Build them once per
//! (frame size, sample rate) and pass them by reference into each stage.

use std::ops::Range;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{GridError, Result};

/// In-place forward FFT over split real/imaginary buffers.
///
/// The length must be a non-zero power of two.
pub fn fft(real: &mut [f32], imag: &mut [f32]) -> Result<()> {
    let n = real.len();
    if imag.len() != n {
        return Err(GridError::LengthMismatch {
            real: n,
            imag: imag.len(),
        });
    }
    if n == 0 || !n.is_power_of_two() {
        return Err(GridError::NotPowerOfTwo(n));
    }

    let mut planner = FftPlanner::<f32>::new();
    let plan = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f32>> = real
        .iter()
        .zip(imag.iter())
        .map(|(&re, &im)| Complex::new(re, im))
        .collect();
    plan.process(&mut buffer);

    for ((re, im), c) in real.iter_mut().zip(imag.iter_mut()).zip(buffer) {
        *re = c.re;
        *im = c.im;
    }
    Ok(())
}

/// Magnitudes of bins `0..=N/2`.
pub fn magnitude_spectrum(real: &[f32], imag: &[f32]) -> Vec<f32> {
    let half = real.len().min(imag.len()) / 2;
    (0..=half)
        .filter(|&i| i < real.len() && i < imag.len())
        .map(|i| (real[i] * real[i] + imag[i] * imag[i]).sqrt())
        .collect()
}

pub fn hanning_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

pub fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (s, w) in frame.iter_mut().zip(window) {
        *s *= w;
    }
}

/// FFT bins whose centre frequency lies in `[low_hz, high_hz]`.
pub fn band_bins(low_hz: f32, high_hz: f32, sample_rate: u32, fft_size: usize) -> Range<usize> {
    let bin_hz = sample_rate as f32 / fft_size as f32;
    let half = fft_size / 2;
    let low = ((low_hz / bin_hz).ceil() as usize).min(half + 1);
    let high = ((high_hz / bin_hz).floor() as usize + 1).min(half + 1);
    low..high.max(low)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters on mel-spaced centre frequencies.
#[derive(Clone, Debug)]
pub struct MelFilterbank {
    filters: Vec<Vec<f32>>,
    fft_size: usize,
    sample_rate: u32,
}

impl MelFilterbank {
    pub fn new(num_filters: usize, fft_size: usize, sample_rate: u32, f_min: f32, f_max: f32) -> Result<Self> {
        if num_filters == 0 || sample_rate == 0 || fft_size == 0 {
            return Err(GridError::InvalidInput(
                "mel filterbank needs filters, fft size and sample rate".into(),
            ));
        }
        let nyquist = sample_rate as f32 / 2.0;
        let f_max = f_max.min(nyquist);
        if !(f_min >= 0.0 && f_min < f_max) {
            return Err(GridError::InvalidInput(format!(
                "mel range [{}, {}] is empty",
                f_min, f_max
            )));
        }

        let mel_min = hz_to_mel(f_min);
        let mel_max = hz_to_mel(f_max);
        let edges: Vec<f32> = (0..num_filters + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (num_filters + 1) as f32))
            .collect();

        let num_bins = fft_size / 2 + 1;
        let bin_hz = sample_rate as f32 / fft_size as f32;
        let filters = (0..num_filters)
            .map(|m| {
                let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
                (0..num_bins)
                    .map(|k| {
                        let f = k as f32 * bin_hz;
                        if f <= left || f >= right {
                            0.0
                        } else if f <= center {
                            (f - left) / (center - left)
                        } else {
                            (right - f) / (right - center)
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            filters,
            fft_size,
            sample_rate,
        })
    }

    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn filters(&self) -> &[Vec<f32>] {
        &self.filters
    }

    /// Project a magnitude spectrum onto the mel bands.
    pub fn apply(&self, spectrum: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| filter.iter().zip(spectrum).map(|(w, m)| w * m).sum())
            .collect()
    }
}

/// Framed magnitude analyser with a pre-planned FFT and cached window.
#[derive(Clone)]
pub struct Stft {
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    plan: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("frame_size", &self.frame_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}

impl Stft {
    pub fn new(frame_size: usize, hop_size: usize) -> Result<Self> {
        if frame_size == 0 || !frame_size.is_power_of_two() {
            return Err(GridError::NotPowerOfTwo(frame_size));
        }
        if hop_size == 0 {
            return Err(GridError::InvalidInput("hop size must be > 0".into()));
        }
        let mut planner = FftPlanner::<f32>::new();
        Ok(Self {
            frame_size,
            hop_size,
            window: hanning_window(frame_size),
            plan: planner.plan_fft_forward(frame_size),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples < self.frame_size {
            0
        } else {
            (num_samples - self.frame_size) / self.hop_size + 1
        }
    }

    /// Centre time of frame `index` in seconds.
    pub fn frame_time(&self, index: usize, sample_rate: u32) -> f64 {
        (index * self.hop_size + self.frame_size / 2) as f64 / sample_rate as f64
    }

    /// Calls `f(frame_index, magnitudes)` for every full frame. `magnitudes`
    /// holds bins `0..=N/2` of the Hanning-windowed frame.
    pub fn for_each_frame<F>(&self, samples: &[f32], mut f: F)
    where
        F: FnMut(usize, &[f32]),
    {
        let n = self.frame_size;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.plan.get_inplace_scratch_len()];
        let mut magnitudes = vec![0.0f32; n / 2 + 1];

        for index in 0..self.num_frames(samples.len()) {
            let start = index * self.hop_size;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(samples[start + i] * self.window[i], 0.0);
            }
            self.plan.process_with_scratch(&mut buffer, &mut scratch);
            for (m, c) in magnitudes.iter_mut().zip(buffer.iter()) {
                *m = c.norm();
            }
            f(index, &magnitudes);
        }
    }
}
