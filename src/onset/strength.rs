//! Mel-spectrogram onset-strength envelope and its peaks.

use crate::audio::spectral::{MelFilterbank, Stft};
use crate::audio::SampleBuffer;
use crate::error::Result;
use crate::stats::{median_f32, std_dev_f32};

use super::pick_peaks;

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
const NUM_MEL_BANDS: usize = 40;
const MEL_F_MIN: f32 = 30.0;
const MEL_F_MAX: f32 = 8000.0;
const DB_FLOOR: f32 = -80.0;
const PEAK_STD_MULT: f32 = 0.3;
const MIN_SPACING_SEC: f64 = 0.1;

#[derive(Clone, Debug)]
pub struct OnsetStrengthDetector {
    stft: Stft,
    mel: MelFilterbank,
}

impl OnsetStrengthDetector {
    /// The filterbank depends on the sample rate; buffers at a different rate
    /// than the one given here are rejected by [`Self::detect`] with an empty
    /// result.
    pub fn new(sample_rate: u32) -> Result<Self> {
        Ok(Self {
            stft: Stft::new(FRAME_SIZE, HOP_SIZE)?,
            mel: MelFilterbank::new(NUM_MEL_BANDS, FRAME_SIZE, sample_rate, MEL_F_MIN, MEL_F_MAX)?,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.mel.sample_rate()
    }

    /// Half-wave rectified log-mel flux, one value per frame, scaled to [0, 1].
    pub fn envelope(&self, buffer: &SampleBuffer) -> Vec<f32> {
        let mut envelope = Vec::with_capacity(self.stft.num_frames(buffer.len()));
        let mut prev_db: Option<Vec<f32>> = None;

        self.stft.for_each_frame(buffer.samples(), |_, mags| {
            let db: Vec<f32> = self
                .mel
                .apply(mags)
                .into_iter()
                .map(|e| (20.0 * e.max(1e-12).log10()).max(DB_FLOOR))
                .collect();
            let flux = match prev_db {
                Some(ref prev) => db.iter().zip(prev).map(|(cur, p)| (cur - p).max(0.0)).sum(),
                None => 0.0,
            };
            envelope.push(flux);
            prev_db = Some(db);
        });

        let peak = envelope.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            for v in &mut envelope {
                *v /= peak;
            }
        }
        envelope
    }

    pub fn detect(&self, buffer: &SampleBuffer) -> Vec<f64> {
        if buffer.sample_rate() != self.sample_rate() {
            log::warn!(
                "Onset-strength tables built for {} Hz, buffer is {} Hz",
                self.sample_rate(),
                buffer.sample_rate()
            );
            return Vec::new();
        }
        let envelope = self.envelope(buffer);
        if envelope.is_empty() {
            return Vec::new();
        }
        let threshold = median_f32(&envelope) + PEAK_STD_MULT * std_dev_f32(&envelope);
        let sr = buffer.sample_rate();
        pick_peaks(
            &envelope,
            threshold,
            MIN_SPACING_SEC,
            |i| self.stft.frame_time(i, sr),
            |_| true,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::testutil::{kick_track, periodic};

    const SR: u32 = 44100;

    #[test]
    fn envelope_is_normalised() {
        let truth = periodic(0.25, 0.5, 4.0);
        let buf = SampleBuffer::new(kick_track(SR, 4.0, &truth), SR).unwrap();
        let env = OnsetStrengthDetector::new(SR).unwrap().envelope(&buf);
        assert!(!env.is_empty());
        let max = env.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        assert!(env.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn peaks_follow_kicks() {
        let truth = periodic(0.25, 0.5, 7.8);
        let buf = SampleBuffer::new(kick_track(SR, 8.0, &truth), SR).unwrap();
        let peaks = OnsetStrengthDetector::new(SR).unwrap().detect(&buf);
        assert!(peaks.len() >= truth.len() - 2);
        // every kick has a strength peak close by
        for t in &truth[1..] {
            let best = peaks.iter().map(|p| (p - t).abs()).fold(f64::INFINITY, f64::min);
            assert!(best < 0.06, "no peak near kick at {:.2}s", t);
        }
    }

    #[test]
    fn silence_has_no_peaks() {
        let buf = SampleBuffer::new(vec![0.0; SR as usize * 2], SR).unwrap();
        assert!(OnsetStrengthDetector::new(SR).unwrap().detect(&buf).is_empty());
    }

    #[test]
    fn mismatched_rate_yields_nothing() {
        let buf = SampleBuffer::new(vec![0.1; 48000], 48000).unwrap();
        assert!(OnsetStrengthDetector::new(SR).unwrap().detect(&buf).is_empty());
    }
}
