//! Consensus beats from the tracker, onset-strength peaks and kicks.

use crate::config::FusionConfig;
use crate::stats::nearest_within;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedBeats {
    pub beats: Vec<f64>,
    /// 0-1.
    pub confidence: f64,
}

/// Walk a fixed grid of `60 / bpm` spacing from the first tracker beat, snap
/// each position to the weighted centroid of nearby detections and fill long
/// gaps.
///
/// Returns the tracker beats unchanged with confidence 0 when `bpm` is not
/// positive or the tracker found nothing.
pub fn fuse_beats(
    tracker: &[f64],
    strength_peaks: &[f64],
    kicks: &[f64],
    bpm: f64,
    config: &FusionConfig,
) -> FusedBeats {
    let unchanged = || FusedBeats {
        beats: tracker.to_vec(),
        confidence: 0.0,
    };
    if tracker.is_empty() || !(bpm > 0.0) {
        return unchanged();
    }

    let interval = 60.0 / bpm;
    let tolerance = config.max_tolerance_sec.min(interval * config.tolerance_fraction);
    let end = [tracker.last(), strength_peaks.last(), kicks.last()]
        .into_iter()
        .flatten()
        .fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let sources = [
        (tracker, config.tracker_weight),
        (strength_peaks, config.strength_weight),
        (kicks, config.kick_weight),
    ];
    let weight_sum: f64 = sources.iter().map(|&(_, w)| w).sum();

    let mut accepted: Vec<f64> = Vec::new();
    let mut total_weight = 0.0;
    let first = tracker[0];
    let grid = (0u32..)
        .map(|k| first + k as f64 * interval)
        .take_while(|&t| t <= end + tolerance);
    for expected in grid {
        let mut weight = 0.0;
        let mut weighted_time = 0.0;
        for &(times, w) in &sources {
            if let Some(t) = nearest_within(times, expected, tolerance) {
                weight += w;
                weighted_time += w * t;
            }
        }

        if weight >= config.min_weight {
            accepted.push(weighted_time / weight);
            total_weight += weight;
        }
    }

    if accepted.is_empty() || weight_sum <= 0.0 {
        return unchanged();
    }

    let confidence = (total_weight / (accepted.len() as f64 * weight_sum)).clamp(0.0, 1.0);
    let beats = fill_gaps(&accepted, interval);
    log::debug!(
        "Fusion: {} tracker beats -> {} accepted, {} after gap fill, confidence {:.2}",
        tracker.len(),
        accepted.len(),
        beats.len(),
        confidence
    );

    FusedBeats { beats, confidence }
}

/// Insert evenly spaced beats into gaps longer than two intervals.
fn fill_gaps(beats: &[f64], interval: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(beats.len());
    for (i, &b) in beats.iter().enumerate() {
        if let Some(&prev) = i.checked_sub(1).and_then(|j| beats.get(j)) {
            let gap = b - prev;
            if gap > 2.0 * interval {
                let steps = (gap / interval).round().max(1.0) as usize;
                let step = gap / steps as f64;
                out.extend((1..steps).map(|k| prev + k as f64 * step));
            }
        }
        out.push(b);
    }
    out
}
