//! Low-frequency kick detectors.
//!
//! The single-band detector sums 20-150 Hz energy. The multi-band detector
//! weights three low bands and vetoes peaks whose high-frequency energy
//! dominates (hats, snares and clicks leaking into the low bins).

use crate::audio::spectral::{band_bins, Stft};
use crate::audio::SampleBuffer;
use crate::error::Result;
use crate::stats::median_f32;

use super::pick_peaks;

const KICK_FRAME_SIZE: usize = 2048;
const KICK_HOP_SIZE: usize = 512;
const KICK_LOW_HZ: f32 = 20.0;
const KICK_HIGH_HZ: f32 = 150.0;
const KICK_THRESHOLD_MULT: f32 = 2.0;
const KICK_MIN_SPACING_SEC: f64 = 0.2;

const MULTI_FRAME_SIZE: usize = 4096;
const MULTI_HOP_SIZE: usize = 512;
const MULTI_THRESHOLD_MULT: f32 = 2.5;
const MULTI_MIN_SPACING_SEC: f64 = 0.15;
const HIGH_BAND_LOW_HZ: f32 = 2000.0;
const MAX_HIGH_TO_LOW_RATIO: f32 = 3.0;

/// Absolute energy floor so silence and noise beds never produce onsets.
const ENERGY_FLOOR: f32 = 1.0;

struct WeightedBand {
    low_hz: f32,
    high_hz: f32,
    weight: f32,
}

const KICK_BANDS: [WeightedBand; 3] = [
    // sub-bass thump
    WeightedBand {
        low_hz: 20.0,
        high_hz: 60.0,
        weight: 0.5,
    },
    // body
    WeightedBand {
        low_hz: 60.0,
        high_hz: 120.0,
        weight: 1.0,
    },
    // punch
    WeightedBand {
        low_hz: 120.0,
        high_hz: 250.0,
        weight: 0.3,
    },
];

fn band_energy(magnitudes: &[f32], bins: std::ops::Range<usize>) -> f32 {
    magnitudes[bins].iter().map(|m| m * m).sum()
}

/// Single-band kick detector (frame 2048, hop 512).
#[derive(Clone, Debug)]
pub struct KickDetector {
    stft: Stft,
}

impl KickDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            stft: Stft::new(KICK_FRAME_SIZE, KICK_HOP_SIZE)?,
        })
    }

    pub fn energy(&self, buffer: &SampleBuffer) -> Vec<f32> {
        let bins = band_bins(KICK_LOW_HZ, KICK_HIGH_HZ, buffer.sample_rate(), KICK_FRAME_SIZE);
        let mut energy = Vec::with_capacity(self.stft.num_frames(buffer.len()));
        self.stft.for_each_frame(buffer.samples(), |_, mags| {
            energy.push(band_energy(mags, bins.clone()));
        });
        energy
    }

    pub fn detect(&self, buffer: &SampleBuffer) -> Vec<f64> {
        let energy = self.energy(buffer);
        if energy.is_empty() {
            return Vec::new();
        }
        let threshold = (median_f32(&energy) * KICK_THRESHOLD_MULT).max(ENERGY_FLOOR);
        let sr = buffer.sample_rate();
        pick_peaks(
            &energy,
            threshold,
            KICK_MIN_SPACING_SEC,
            |i| self.stft.frame_time(i, sr),
            |_| true,
        )
    }
}

/// Weighted three-band kick detector (frame 4096, hop 512) with
/// high-frequency leak rejection.
#[derive(Clone, Debug)]
pub struct MultiBandKickDetector {
    stft: Stft,
}

struct MultiBandFrames {
    weighted: Vec<f32>,
    high_ratio: Vec<f32>,
}

impl MultiBandKickDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            stft: Stft::new(MULTI_FRAME_SIZE, MULTI_HOP_SIZE)?,
        })
    }

    fn frames(&self, buffer: &SampleBuffer) -> MultiBandFrames {
        let sr = buffer.sample_rate();
        let bands: Vec<(std::ops::Range<usize>, f32)> = KICK_BANDS
            .iter()
            .map(|b| (band_bins(b.low_hz, b.high_hz, sr, MULTI_FRAME_SIZE), b.weight))
            .collect();
        let high = band_bins(HIGH_BAND_LOW_HZ, sr as f32 / 2.0, sr, MULTI_FRAME_SIZE);

        let capacity = self.stft.num_frames(buffer.len());
        let mut frames = MultiBandFrames {
            weighted: Vec::with_capacity(capacity),
            high_ratio: Vec::with_capacity(capacity),
        };
        self.stft.for_each_frame(buffer.samples(), |_, mags| {
            let weighted: f32 = bands
                .iter()
                .map(|(bins, w)| w * band_energy(mags, bins.clone()))
                .sum();
            let high_energy = band_energy(mags, high.clone());
            let ratio = if weighted > 0.0 {
                high_energy / weighted
            } else {
                f32::INFINITY
            };
            frames.weighted.push(weighted);
            frames.high_ratio.push(ratio);
        });
        frames
    }

    pub fn detect(&self, buffer: &SampleBuffer) -> Vec<f64> {
        let frames = self.frames(buffer);
        if frames.weighted.is_empty() {
            return Vec::new();
        }
        let threshold = (median_f32(&frames.weighted) * MULTI_THRESHOLD_MULT).max(ENERGY_FLOOR);
        let sr = buffer.sample_rate();
        pick_peaks(
            &frames.weighted,
            threshold,
            MULTI_MIN_SPACING_SEC,
            |i| self.stft.frame_time(i, sr),
            |i| frames.high_ratio[i] <= MAX_HIGH_TO_LOW_RATIO,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::testutil::{kick_track, periodic};

    const SR: u32 = 44100;

    fn clicks(duration: f64, times: &[f64]) -> Vec<f32> {
        let mut out = vec![0.0f32; (duration * SR as f64) as usize];
        for &t in times {
            let i = (t * SR as f64) as usize;
            if i < out.len() {
                out[i] = 1.0;
            }
        }
        out
    }

    fn assert_near_each(detected: &[f64], truth: &[f64], tol: f64) {
        for d in detected {
            let best = truth.iter().map(|t| (t - d).abs()).fold(f64::INFINITY, f64::min);
            assert!(best < tol, "onset at {:.3}s is {:.3}s from any kick", d, best);
        }
    }

    #[test]
    fn single_band_finds_periodic_kicks() {
        let truth = periodic(0.25, 0.5, 7.8);
        let buf = SampleBuffer::new(kick_track(SR, 8.0, &truth), SR).unwrap();
        let kicks = KickDetector::new().unwrap().detect(&buf);
        assert!(kicks.len() >= truth.len() - 1 && kicks.len() <= truth.len());
        assert_near_each(&kicks, &truth, 0.05);
        assert!(kicks.windows(2).all(|w| w[1] - w[0] >= KICK_MIN_SPACING_SEC));
    }

    #[test]
    fn multi_band_finds_periodic_kicks() {
        let truth = periodic(0.25, 0.5, 7.8);
        let buf = SampleBuffer::new(kick_track(SR, 8.0, &truth), SR).unwrap();
        let kicks = MultiBandKickDetector::new().unwrap().detect(&buf);
        assert!(kicks.len() >= truth.len() - 2 && kicks.len() <= truth.len());
        assert_near_each(&kicks, &truth, 0.05);
    }

    #[test]
    fn multi_band_rejects_broadband_clicks() {
        let times = periodic(0.25, 0.5, 5.8);
        let buf = SampleBuffer::new(clicks(6.0, &times), SR).unwrap();
        assert!(!KickDetector::new().unwrap().detect(&buf).is_empty());
        assert!(MultiBandKickDetector::new().unwrap().detect(&buf).is_empty());
    }

    #[test]
    fn silence_has_no_kicks() {
        let buf = SampleBuffer::new(vec![0.0; SR as usize * 3], SR).unwrap();
        assert!(KickDetector::new().unwrap().detect(&buf).is_empty());
        assert!(MultiBandKickDetector::new().unwrap().detect(&buf).is_empty());
    }

    #[test]
    fn short_buffer_has_no_frames() {
        let buf = SampleBuffer::new(vec![0.5; 1000], SR).unwrap();
        assert!(KickDetector::new().unwrap().detect(&buf).is_empty());
        assert!(MultiBandKickDetector::new().unwrap().detect(&buf).is_empty());
    }
}
