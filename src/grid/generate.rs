//! Grid generation from tracker beats and kick onsets.
//!
//! Constant-tempo tracks get a single marker placed on the estimated
//! downbeat. Tracks whose segment tempos spread too far get one marker per
//! merged tempo segment instead.

use crate::config::{EngineConfig, GenerateConfig};
use crate::stats::{mean, median, nearest_sorted, round_to};

use super::drop::detect_drop;
use super::phase::{bar_position_votes, dominant_position, estimate_phase, filter_ghost_kicks};
use super::tempo::{deviation_pct, estimate_tempo, is_variable_bpm};
use super::types::{GeneratedBeatgrid, GridSolution, RawBeatResult, SkipReason, TempoMarker};
use super::verify::{expected_grid, Tolerance};

const BEATS_PER_BAR: usize = 4;

pub fn generate_beatgrid(
    raw: &RawBeatResult,
    existing: Option<&[TempoMarker]>,
    config: &EngineConfig,
) -> GeneratedBeatgrid {
    let skipped = |skip_reason| GeneratedBeatgrid::Skipped { skip_reason };
    if raw.beat_timestamps.len() < config.generate.min_beats {
        log::debug!(
            "{}: only {} beats, skipping generation",
            raw.track_id,
            raw.beat_timestamps.len()
        );
        return skipped(SkipReason::TooFewBeats);
    }

    let segments: Vec<f64> = raw.segment_bpms.iter().copied().filter(|&b| b > 0.0).collect();
    let variable = is_variable_bpm(&segments, config.generate.variable_spread_pct);
    if variable && segments.len() >= config.generate.min_dynamic_segments {
        if let Some(solution) = dynamic_grid(raw, &config.generate) {
            return GeneratedBeatgrid::Dynamic(solution);
        }
    }

    match static_grid(raw, existing, variable, config) {
        Some(solution) => GeneratedBeatgrid::Static(solution),
        None => skipped(SkipReason::TooFewBeats),
    }
}

fn usable_kicks(raw: &RawBeatResult, interval: f64, config: &GenerateConfig) -> Vec<f64> {
    let kicks = raw.kicks();
    if kicks.len() >= config.min_kicks_for_filter {
        filter_ghost_kicks(kicks, interval, config.ghost_kick_fraction)
    } else {
        kicks.to_vec()
    }
}

fn static_grid(
    raw: &RawBeatResult,
    existing: Option<&[TempoMarker]>,
    variable: bool,
    config: &EngineConfig,
) -> Option<GridSolution> {
    let beats = &raw.beat_timestamps;
    let existing_bpm = existing.and_then(|m| m.first()).map(|m| m.bpm);
    let bpm = estimate_tempo(raw, existing_bpm, &config.generate)?;
    let interval = 60.0 / bpm;
    let duration = raw.effective_duration();

    let kicks = usable_kicks(raw, interval, &config.generate);
    let kicks_usable = kicks.len() >= config.generate.min_kicks_for_bars;
    let phase_source = if kicks_usable { &kicks } else { beats };
    let phase = estimate_phase(phase_source, interval).or_else(|| beats.first().map(|b| b.rem_euclid(interval)))?;

    let rotation = if kicks_usable {
        let drop = detect_drop(&kicks, bpm, duration, &config.drop);
        match drop.drop_kick_sec {
            Some(drop_kick) => {
                let beats_from_phase = ((drop_kick - phase) / interval).round() as i64;
                beats_from_phase.rem_euclid(BEATS_PER_BAR as i64) as usize
            }
            None => dominant_position(&bar_position_votes(&kicks, phase, interval, BEATS_PER_BAR)),
        }
    } else {
        0
    };

    let downbeat = phase + rotation as f64 * interval;
    let markers = vec![TempoMarker::anchor(downbeat, bpm)];
    let confidence = grid_confidence(beats, &markers, duration);
    log::debug!(
        "{}: static grid {:.1} BPM, phase {:.3}s, rotated {} beats, confidence {}",
        raw.track_id,
        bpm,
        phase,
        rotation,
        confidence
    );

    Some(GridSolution {
        tempo_markers: markers,
        is_variable_bpm: variable,
        confidence,
        median_bpm: bpm,
        phase_offset_sec: downbeat,
    })
}

/// Consecutive segments merged while each stays within `tolerance_pct` of
/// its predecessor. Returns `(first segment index, mean BPM)` per group.
pub fn merge_segments(segment_bpms: &[f64], tolerance_pct: f64) -> Vec<(usize, f64)> {
    let mut groups: Vec<(usize, Vec<f64>)> = Vec::new();
    for (i, &bpm) in segment_bpms.iter().enumerate() {
        let joins = groups
            .last()
            .and_then(|(_, members)| members.last())
            .map_or(false, |&prev| deviation_pct(bpm, prev) < tolerance_pct);
        match groups.last_mut() {
            Some((_, members)) if joins => members.push(bpm),
            _ => groups.push((i, vec![bpm])),
        }
    }
    groups
        .into_iter()
        .filter_map(|(start, members)| mean(&members).map(|m| (start, round_to(m, 1))))
        .collect()
}

fn dynamic_grid(raw: &RawBeatResult, config: &GenerateConfig) -> Option<GridSolution> {
    let duration = raw.effective_duration();
    if !(duration > 0.0) || raw.segment_bpms.is_empty() {
        return None;
    }
    // segments keep their slot in the track even when a neighbour has no estimate
    let indexed: Vec<(usize, f64)> = raw
        .segment_bpms
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, b)| b > 0.0)
        .collect();
    let segments: Vec<f64> = indexed.iter().map(|&(_, b)| b).collect();
    let groups: Vec<(usize, f64)> = merge_segments(&segments, config.segment_merge_pct)
        .into_iter()
        .map(|(i, bpm)| (indexed[i].0, bpm))
        .collect();
    if groups.len() < 2 {
        return None;
    }
    let segment_len = duration / raw.segment_bpms.len() as f64;

    let (_, first_bpm) = groups[0];
    let first_interval = 60.0 / first_bpm;
    let kicks = usable_kicks(raw, first_interval, config);
    let first_end = groups[1].0 as f64 * segment_len;
    let anchor = match kicks.first() {
        Some(&k) => Some(k),
        None => {
            let early: Vec<f64> = raw.beat_timestamps.iter().copied().filter(|&t| t < first_end).collect();
            estimate_phase(&early, first_interval)
        }
    };
    let phase = anchor
        .or_else(|| raw.beat_timestamps.first().copied())?
        .rem_euclid(first_interval);

    let mut markers = vec![TempoMarker::anchor(phase, first_bpm)];
    for &(start_index, bpm) in &groups[1..] {
        let prev = &markers[markers.len() - 1];
        let start = start_index as f64 * segment_len;
        // continue counting beats from the previous marker's grid
        let steps = ((start - prev.position) / prev.interval()).ceil().max(1.0);
        let position = prev.position + steps * prev.interval();
        let bpb = prev.beats_per_bar() as i64;
        let beat = ((prev.beat as i64 - 1 + steps as i64).rem_euclid(bpb) + 1) as u32;
        markers.push(TempoMarker::new(position, bpm, beat));
    }

    let confidence = grid_confidence(&raw.beat_timestamps, &markers, duration);
    let median_bpm = round_to(median(&segments)?, 1);
    log::debug!(
        "{}: dynamic grid with {} markers from {} segments, confidence {}",
        raw.track_id,
        markers.len(),
        segments.len(),
        confidence
    );

    Some(GridSolution {
        tempo_markers: markers,
        is_variable_bpm: true,
        confidence,
        median_bpm,
        phase_offset_sec: phase,
    })
}

/// Share of beats within the warning tolerance of the grid, 0-100.
pub fn grid_confidence(beats: &[f64], markers: &[TempoMarker], duration: f64) -> u8 {
    let end = duration.max(beats.last().copied().unwrap_or(0.0));
    let grid = expected_grid(markers, end);
    if beats.is_empty() || grid.is_empty() {
        return 0;
    }
    let errors = beats
        .iter()
        .filter(|&&t| {
            let Some(i) = nearest_sorted(&grid, t, |b| b.time) else {
                return true;
            };
            let bpm = markers[grid[i].marker].bpm;
            (t - grid[i].time).abs() * 1000.0 > Tolerance::for_bpm(bpm).warning_ms
        })
        .count();
    let error_ratio = errors as f64 / beats.len() as f64;
    ((1.0 - error_ratio).max(0.0) * 100.0).round() as u8
}
