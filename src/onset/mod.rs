//! Onset extraction: three independent detectors that turn a [`SampleBuffer`]
//! into ascending onset timestamps (seconds).
//!
//! Frame and hop sizes are fixed per detector so runs are reproducible.
//!
//! [`SampleBuffer`]: crate::audio::SampleBuffer

pub mod kick;
pub mod strength;

pub use kick::{KickDetector, MultiBandKickDetector};
pub use strength::OnsetStrengthDetector;

use crate::audio::SampleBuffer;
use crate::error::Result;

/// Precomputed tables for all three detectors at one sample rate. Build once
/// and share across tracks with the same rate.
#[derive(Clone, Debug)]
pub struct OnsetTables {
    pub kick: KickDetector,
    pub multi_band: MultiBandKickDetector,
    pub strength: OnsetStrengthDetector,
}

impl OnsetTables {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Ok(Self {
            kick: KickDetector::new()?,
            multi_band: MultiBandKickDetector::new()?,
            strength: OnsetStrengthDetector::new(sample_rate)?,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.strength.sample_rate()
    }
}

/// All three onset sequences for one buffer.
#[derive(Clone, Debug, Default)]
pub struct Onsets {
    pub kicks: Vec<f64>,
    pub multi_band_kicks: Vec<f64>,
    pub strength_peaks: Vec<f64>,
}

pub fn detect_all(buffer: &SampleBuffer, tables: &OnsetTables) -> Onsets {
    let onsets = Onsets {
        kicks: tables.kick.detect(buffer),
        multi_band_kicks: tables.multi_band.detect(buffer),
        strength_peaks: tables.strength.detect(buffer),
    };
    log::debug!(
        "Onsets: {} kicks, {} multi-band kicks, {} strength peaks",
        onsets.kicks.len(),
        onsets.multi_band_kicks.len(),
        onsets.strength_peaks.len()
    );
    onsets
}

/// Local maxima above `threshold`, at least `min_spacing` seconds apart.
/// `accept` can veto a candidate frame.
pub(crate) fn pick_peaks<T, A>(
    envelope: &[f32],
    threshold: f32,
    min_spacing: f64,
    time_of: T,
    accept: A,
) -> Vec<f64>
where
    T: Fn(usize) -> f64,
    A: Fn(usize) -> bool,
{
    let mut peaks: Vec<f64> = Vec::new();
    let last = envelope.len().saturating_sub(1);

    for i in 0..envelope.len() {
        let v = envelope[i];
        if v <= threshold {
            continue;
        }
        let is_peak = (i == 0 || v >= envelope[i - 1]) && (i == last || v >= envelope[i + 1]);
        if !is_peak {
            continue;
        }
        let t = time_of(i);
        let far_enough = peaks.last().map_or(true, |&prev| t - prev >= min_spacing);
        if far_enough && accept(i) {
            peaks.push(t);
        }
    }

    peaks
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::f32::consts::PI;

    /// Decaying low sine bursts, a simple synthetic kick drum.
    pub fn kick_track(sample_rate: u32, duration: f64, kick_times: &[f64]) -> Vec<f32> {
        let len = (duration * sample_rate as f64) as usize;
        let mut out = vec![0.0f32; len];
        let burst = (0.4 * sample_rate as f64) as usize;
        for &t in kick_times {
            let start = (t * sample_rate as f64) as usize;
            for n in 0..burst {
                if start + n >= len {
                    break;
                }
                let ts = n as f32 / sample_rate as f32;
                out[start + n] += 0.8 * (2.0 * PI * 55.0 * ts).sin() * (-ts / 0.04).exp();
            }
        }
        out
    }

    pub fn periodic(start: f64, interval: f64, until: f64) -> Vec<f64> {
        let mut v = Vec::new();
        let mut k = 0;
        loop {
            let t = start + k as f64 * interval;
            if t >= until {
                break;
            }
            v.push(t);
            k += 1;
        }
        v
    }
}
