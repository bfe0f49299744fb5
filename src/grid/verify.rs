//! Grid verification: expected beats from tempo markers, per-beat drift,
//! severity and phase diagnostics.

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, VerifyConfig};
use crate::stats::{mean, median, nearest_sorted, round_to};

use super::tempo::is_variable_bpm;
use super::types::{BeatDriftPoint, RawBeatResult, Severity, SkipReason, TempoMarker, TrackBeatgridResult};

/// Fewest matched beats for a systematic offset to mean anything.
pub const MIN_OFF_BEAT_POINTS: usize = 4;

/// BPM-adaptive drift thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub ok_ms: f64,
    pub warning_ms: f64,
}

impl Tolerance {
    pub fn for_bpm(bpm: f64) -> Self {
        let interval_ms = 60_000.0 / bpm;
        Self {
            ok_ms: (interval_ms * 0.015).max(10.0),
            warning_ms: (interval_ms * 0.04).max(35.0),
        }
    }

    pub fn classify(&self, drift_ms: f64) -> Severity {
        let d = drift_ms.abs();
        if d < self.ok_ms {
            Severity::Ok
        } else if d < self.warning_ms {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

/// One grid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedBeat {
    pub time: f64,
    /// 0-based position in the bar; 0 is beat 1.
    pub bar_position: u32,
    pub interval: f64,
    /// Index of the marker that produced this beat.
    pub marker: usize,
}

/// Expand tempo markers into grid positions covering `[0, duration]`.
///
/// Each marker runs until the next one; the first also extends backwards to
/// the track start. Markers with a non-positive BPM are skipped.
pub fn expected_grid(markers: &[TempoMarker], duration: f64) -> Vec<ExpectedBeat> {
    let valid: Vec<(usize, &TempoMarker)> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| m.bpm > 0.0 && m.bpm.is_finite() && m.position.is_finite())
        .collect();

    let mut grid = Vec::new();
    for (n, &(index, marker)) in valid.iter().enumerate() {
        let interval = marker.interval();
        let bpb = marker.beats_per_bar() as i64;
        let first_beat = (marker.beat.max(1) - 1) as i64;

        let k_start = if n == 0 {
            (-marker.position / interval - 1e-9).ceil() as i64
        } else {
            0
        };
        let end = valid.get(n + 1).map(|(_, next)| next.position);

        let mut k = k_start;
        loop {
            let time = marker.position + k as f64 * interval;
            let past_end = match end {
                Some(next) => time >= next - 1e-9,
                None => time > duration + 1e-9,
            };
            if past_end {
                break;
            }
            if time >= -1e-9 {
                grid.push(ExpectedBeat {
                    time,
                    bar_position: (first_beat + k).rem_euclid(bpb) as u32,
                    interval,
                    marker: index,
                });
            }
            k += 1;
        }
    }
    grid
}

pub fn build_expected_beats(markers: &[TempoMarker], duration: f64) -> Vec<f64> {
    expected_grid(markers, duration).into_iter().map(|b| b.time).collect()
}

struct Match {
    expected_index: usize,
    detected: f64,
    drift_ms: f64,
}

/// Nearest grid position for each detected beat; beats further than half an
/// interval from the grid (outside its coverage) are left unmatched.
fn match_beats(beats: &[f64], grid: &[ExpectedBeat]) -> Vec<Match> {
    beats
        .iter()
        .filter_map(|&t| {
            let i = nearest_sorted(grid, t, |b| b.time)?;
            let e = &grid[i];
            let delta = t - e.time;
            (delta.abs() <= e.interval / 2.0).then(|| Match {
                expected_index: i,
                detected: t,
                drift_ms: round_to(delta * 1000.0, 2),
            })
        })
        .collect()
}

/// Median signed drift, the systematic offset of the whole grid.
fn off_beat(drifts: &[f64], min_points: usize) -> Option<f64> {
    if drifts.is_empty() || drifts.len() < min_points {
        return None;
    }
    median(drifts).map(|m| round_to(m, 2))
}

/// Compare a stored grid against detected beats.
pub fn check_beatgrid(
    track_id: &str,
    markers: &[TempoMarker],
    raw: Option<&RawBeatResult>,
    config: &EngineConfig,
) -> TrackBeatgridResult {
    let Some(raw) = raw else {
        return TrackBeatgridResult::empty(track_id, Severity::Ok, Some(SkipReason::NoPcm));
    };
    let beats = &raw.beat_timestamps;
    if beats.is_empty() {
        return TrackBeatgridResult::empty(track_id, Severity::Ok, Some(SkipReason::NoBeatsDetected));
    }

    let variable = is_variable_bpm(&raw.segment_bpms, config.generate.variable_spread_pct) || {
        let first = markers.first().map(|m| m.bpm);
        markers.iter().any(|m| Some(m.bpm) != first)
    };

    let duration = raw.effective_duration().max(beats.last().copied().unwrap_or(0.0));
    let grid = expected_grid(markers, duration);
    if grid.is_empty() {
        let mut result = TrackBeatgridResult::empty(track_id, Severity::Warning, None);
        result.beats_analyzed = beats.len();
        result.is_variable_bpm = variable;
        return result;
    }

    let matches = match_beats(beats, &grid);
    let drift_points: Vec<BeatDriftPoint> = matches
        .iter()
        .map(|m| {
            let bpm = markers[grid[m.expected_index].marker].bpm;
            BeatDriftPoint {
                beat_index: m.expected_index,
                position_ms: round_to(m.detected * 1000.0, 2),
                drift_ms: m.drift_ms,
                severity: Tolerance::for_bpm(bpm).classify(m.drift_ms),
            }
        })
        .collect();

    let abs_drifts: Vec<f64> = drift_points.iter().map(|p| p.drift_ms.abs()).collect();
    let signed: Vec<f64> = drift_points.iter().map(|p| p.drift_ms).collect();
    let errors = drift_points.iter().filter(|p| p.severity == Severity::Error).count();
    let exceeding = matches
        .iter()
        .zip(&drift_points)
        .filter(|&(m, p)| {
            let bpm = markers[grid[m.expected_index].marker].bpm;
            p.drift_ms.abs() > Tolerance::for_bpm(bpm).warning_ms
        })
        .count();

    let marker_bpms: Vec<f64> = markers.iter().map(|m| m.bpm).filter(|&b| b > 0.0).collect();
    let tolerance = Tolerance::for_bpm(median(&marker_bpms).unwrap_or(120.0));

    let mut severity = match median(&abs_drifts) {
        Some(m) => tolerance.classify(m),
        None => Severity::Warning,
    };
    if !drift_points.is_empty() && exceeding as f64 > drift_points.len() as f64 * config.verify.error_beat_share {
        severity = Severity::Error;
    }
    if variable || beats.len() < config.verify.min_beats_for_error {
        severity = severity.min(Severity::Warning);
    }

    let confidence = if drift_points.is_empty() {
        0
    } else {
        let good = drift_points.len() - errors;
        (good as f64 / drift_points.len() as f64 * 100.0).round() as u8
    };

    let result = TrackBeatgridResult {
        track_id: track_id.to_string(),
        overall_severity: severity,
        confidence,
        avg_drift_ms: mean(&abs_drifts).map_or(0.0, |m| round_to(m, 2)),
        max_drift_ms: round_to(abs_drifts.iter().copied().fold(0.0, f64::max), 2),
        beats_analyzed: beats.len(),
        beats_matched: drift_points.len(),
        is_variable_bpm: variable,
        off_beat_ms: off_beat(&signed, config.verify.min_off_beat_points),
        out_of_phase_beats: detect_out_of_phase(raw.kicks(), &grid, &config.verify),
        skip_reason: None,
        drift_points,
    };
    log::debug!(
        "{}: {:?}, avg drift {:.2} ms over {}/{} beats",
        track_id,
        result.overall_severity,
        result.avg_drift_ms,
        result.beats_matched,
        result.beats_analyzed
    );
    result
}

/// Kick votes per bar position of the grid. Returns how many beats beat 1
/// should move to land on the kick pattern (`Some(0)` when in phase), or
/// `None` with too few kicks.
pub fn detect_out_of_phase(kicks: &[f64], grid: &[ExpectedBeat], config: &VerifyConfig) -> Option<u32> {
    if kicks.len() < config.min_phase_kicks || grid.is_empty() {
        return None;
    }

    let mut votes = [0usize; 4];
    for &k in kicks {
        let Some(i) = nearest_sorted(grid, k, |b| b.time) else {
            continue;
        };
        let e = &grid[i];
        if (k - e.time).abs() > e.interval * 0.25 {
            continue;
        }
        if let Some(v) = votes.get_mut(e.bar_position as usize) {
            *v += 1;
        }
    }

    let on = (votes[0] + votes[2]) as f64;
    let off = (votes[1] + votes[3]) as f64;
    let total = on + off;
    if total == 0.0 {
        return Some(0);
    }
    if off > 0.0 && off >= on * config.out_of_phase_ratio && off / total >= config.out_of_phase_share {
        let shift = if votes[1] >= votes[3] { 1 } else { 3 };
        log::debug!("Out of phase: votes {:?}, beat 1 off by {}", votes, shift);
        return Some(shift);
    }
    Some(0)
}

/// Drift of detected beats against a trial single-marker grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePrecision {
    pub avg_drift_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_beat_ms: Option<f64>,
}

pub fn compute_live_precision(beats: &[f64], phase_offset_sec: f64, bpm: f64, duration: f64) -> LivePrecision {
    let none = LivePrecision {
        avg_drift_ms: 0.0,
        off_beat_ms: None,
    };
    if beats.is_empty() || !(bpm > 0.0) {
        return none;
    }
    let duration = duration.max(beats[beats.len() - 1]);
    let grid = expected_grid(&[TempoMarker::anchor(phase_offset_sec, bpm)], duration);
    let drifts: Vec<f64> = match_beats(beats, &grid).into_iter().map(|m| m.drift_ms).collect();
    if drifts.is_empty() {
        return none;
    }
    let abs: Vec<f64> = drifts.iter().map(|d| d.abs()).collect();
    LivePrecision {
        avg_drift_ms: mean(&abs).map_or(0.0, |m| round_to(m, 2)),
        off_beat_ms: off_beat(&drifts, MIN_OFF_BEAT_POINTS),
    }
}
