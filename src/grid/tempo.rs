//! Tempo estimation from beat or kick intervals, with half/double correction
//! and variable-tempo detection.

use crate::config::GenerateConfig;
use crate::stats::{interquartile_range, median, round_to};

use super::types::RawBeatResult;

/// Plausible beat intervals in seconds (20-750 BPM).
const MIN_INTERVAL_SEC: f64 = 0.08;
const MAX_INTERVAL_SEC: f64 = 3.0;

/// Median of consecutive intervals inside the plausible range.
pub fn median_interval(times: &[f64]) -> Option<f64> {
    let intervals: Vec<f64> = times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (MIN_INTERVAL_SEC..=MAX_INTERVAL_SEC).contains(&i))
        .collect();
    median(&intervals)
}

pub fn bpm_from_times(times: &[f64]) -> Option<f64> {
    median_interval(times).map(|i| 60.0 / i)
}

/// Relative difference of `value` from `reference`, in percent.
pub fn deviation_pct(value: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return f64::INFINITY;
    }
    ((value - reference) / reference).abs() * 100.0
}

/// Whichever of `{bpm, bpm/2, bpm*2}` is closest to `reference`.
pub fn octave_correct(bpm: f64, reference: f64) -> f64 {
    [bpm, bpm / 2.0, bpm * 2.0]
        .into_iter()
        .min_by(|a, b| {
            (a - reference)
                .abs()
                .partial_cmp(&(b - reference).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(bpm)
}

/// Interquartile spread of the segment BPMs as a percentage of their median.
pub fn bpm_spread_pct(segment_bpms: &[f64]) -> Option<f64> {
    let valid: Vec<f64> = segment_bpms.iter().copied().filter(|&b| b > 0.0).collect();
    let mid = median(&valid)?;
    if mid <= 0.0 {
        return None;
    }
    Some(interquartile_range(&valid)? / mid * 100.0)
}

pub fn is_variable_bpm(segment_bpms: &[f64], threshold_pct: f64) -> bool {
    bpm_spread_pct(segment_bpms).map_or(false, |spread| spread > threshold_pct)
}

/// Tempo for a static grid, rounded to 0.1 BPM.
///
/// Kicks are preferred over tracker beats when there are enough of them. The
/// detected value is octave-corrected against `existing_bpm` (or the
/// tracker's scalar estimate) and an existing BPM within the keep tolerance
/// wins outright.
pub fn estimate_tempo(raw: &RawBeatResult, existing_bpm: Option<f64>, config: &GenerateConfig) -> Option<f64> {
    let kicks = raw.kicks();
    let from_kicks = if kicks.len() >= config.min_kicks_for_tempo {
        bpm_from_times(kicks)
    } else {
        None
    };
    let detected = from_kicks
        .or_else(|| bpm_from_times(&raw.beat_timestamps))
        .or_else(|| (raw.bpm_estimate > 0.0).then_some(raw.bpm_estimate))?;

    let existing_bpm = existing_bpm.filter(|&b| b > 0.0);
    let reference = existing_bpm.or_else(|| (raw.bpm_estimate > 0.0).then_some(raw.bpm_estimate));

    let bpm = match reference {
        Some(reference) => {
            let corrected = octave_correct(detected, reference);
            match existing_bpm {
                Some(existing) if deviation_pct(corrected, existing) < config.keep_existing_pct => existing,
                _ => corrected,
            }
        }
        None => detected,
    };

    log::debug!(
        "Tempo: detected {:.2} BPM (kicks: {}), reference {:?}, chose {:.2}",
        detected,
        from_kicks.is_some(),
        reference,
        bpm
    );
    Some(round_to(bpm, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::testutil::periodic;

    fn raw(beats: Vec<f64>, bpm_estimate: f64, kicks: Option<Vec<f64>>) -> RawBeatResult {
        RawBeatResult {
            track_id: "t".into(),
            beat_timestamps: beats,
            bpm_estimate,
            segment_bpms: vec![],
            confidence: 0.9,
            sample_rate: 44100,
            duration: 60.0,
            kick_onsets: kicks,
        }
    }

    #[test]
    fn median_interval_ignores_implausible_gaps() {
        let times = [0.0, 0.5, 1.0, 1.5, 6.0, 6.5, 6.52];
        assert_eq!(median_interval(&times), Some(0.5));
    }

    #[test]
    fn octave_guard_picks_closest() {
        assert_eq!(octave_correct(64.0, 128.0), 128.0);
        assert_eq!(octave_correct(256.0, 128.0), 128.0);
        assert_eq!(octave_correct(127.0, 128.0), 127.0);
        assert_eq!(octave_correct(90.0, 128.0), 90.0);
    }

    #[test]
    fn half_tempo_beats_are_doubled() {
        let beats = periodic(0.1, 60.0 / 64.0, 60.0);
        let r = raw(beats, 128.0, None);
        assert_eq!(estimate_tempo(&r, None, &GenerateConfig::default()), Some(128.0));
    }

    #[test]
    fn existing_bpm_kept_within_tolerance() {
        let beats = periodic(0.1, 60.0 / 127.5, 60.0);
        let r = raw(beats, 127.5, None);
        let cfg = GenerateConfig::default();
        assert_eq!(estimate_tempo(&r, Some(128.0), &cfg), Some(128.0));
        // 3% off: detected value wins
        let beats = periodic(0.1, 60.0 / 124.0, 60.0);
        let r = raw(beats, 124.0, None);
        assert_eq!(estimate_tempo(&r, Some(128.0), &cfg), Some(124.0));
    }

    #[test]
    fn existing_bpm_at_double_is_octave_corrected() {
        let beats = periodic(0.1, 0.5, 60.0);
        let r = raw(beats, 120.0, None);
        assert_eq!(estimate_tempo(&r, Some(240.0), &GenerateConfig::default()), Some(240.0));
    }

    #[test]
    fn kicks_preferred_when_plentiful() {
        // tracker beats are noisy at 126, kicks clean at 128
        let beats: Vec<f64> = periodic(0.0, 60.0 / 126.0, 30.0);
        let kicks = periodic(0.0, 60.0 / 128.0, 30.0);
        let r = raw(beats, 0.0, Some(kicks));
        assert_eq!(estimate_tempo(&r, None, &GenerateConfig::default()), Some(128.0));
    }

    #[test]
    fn spread_flags_variable_tempo() {
        assert!(!is_variable_bpm(&[128.0, 128.1, 127.9, 128.0], 3.0));
        assert!(is_variable_bpm(&[120.0, 124.0, 130.0, 136.0, 140.0], 3.0));
        assert!(!is_variable_bpm(&[], 3.0));
    }
}
