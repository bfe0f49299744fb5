//! Beat phase and bar position.
//!
//! Phase comes from a circular histogram of `t mod interval`; the median of
//! the dominant cluster is robust to pickup beats and stray onsets, which
//! land outside the cluster and drop out.

use crate::stats::median;

pub const PHASE_BIN_SEC: f64 = 0.015;

/// Circular distance between two bins.
fn bin_distance(a: usize, b: usize, num_bins: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(num_bins - d)
}

/// Wrap `x` into `[-period/2, period/2)`.
fn wrap_centered(x: f64, period: f64) -> f64 {
    (x + period / 2.0).rem_euclid(period) - period / 2.0
}

/// Phase offset in `[0, interval)` of the dominant beat position.
pub fn estimate_phase(times: &[f64], interval: f64) -> Option<f64> {
    if times.is_empty() || !(interval > 0.0) {
        return None;
    }

    let num_bins = ((interval / PHASE_BIN_SEC).round() as usize).max(1);
    let bin_width = interval / num_bins as f64;
    let phases: Vec<(f64, usize)> = times
        .iter()
        .map(|&t| {
            let p = t.rem_euclid(interval);
            let bin = ((p / bin_width) as usize).min(num_bins - 1);
            (p, bin)
        })
        .collect();

    let mut histogram = vec![0usize; num_bins];
    for &(_, bin) in &phases {
        histogram[bin] += 1;
    }

    // 3-bin circular smoothing
    let smoothed: Vec<usize> = (0..num_bins)
        .map(|i| {
            if num_bins < 3 {
                return histogram.iter().sum();
            }
            histogram[(i + num_bins - 1) % num_bins] + histogram[i] + histogram[(i + 1) % num_bins]
        })
        .collect();

    // ties on the smoothed count go to the fuller raw bin
    let mut dominant = 0;
    for (i, &count) in smoothed.iter().enumerate() {
        let best = smoothed[dominant];
        if count > best || (count == best && histogram[i] > histogram[dominant]) {
            dominant = i;
        }
    }

    let center = (dominant as f64 + 0.5) * bin_width;
    let offsets: Vec<f64> = phases
        .iter()
        .filter(|&&(_, bin)| bin_distance(bin, dominant, num_bins) <= 1)
        .map(|&(p, _)| wrap_centered(p - center, interval))
        .collect();

    let offset = median(&offsets)?;
    Some((center + offset).rem_euclid(interval))
}

/// Drop kicks closer than `fraction * interval` to the previous kept kick
/// (ghost kicks, hi-hat bleed).
pub fn filter_ghost_kicks(kicks: &[f64], interval: f64, fraction: f64) -> Vec<f64> {
    let min_gap = interval * fraction;
    let mut kept: Vec<f64> = Vec::with_capacity(kicks.len());
    for &k in kicks {
        if kept.last().map_or(true, |&last| k - last >= min_gap) {
            kept.push(k);
        }
    }
    kept
}

/// Kick counts per bar position (0-based, relative to a grid whose beat 1
/// sits at `phase`). Kicks more than a quarter beat from any grid beat
/// are ignored.
pub fn bar_position_votes(kicks: &[f64], phase: f64, interval: f64, beats_per_bar: usize) -> Vec<usize> {
    let mut votes = vec![0usize; beats_per_bar.max(1)];
    if !(interval > 0.0) {
        return votes;
    }
    for &k in kicks {
        let beat = ((k - phase) / interval).round();
        let grid_time = phase + beat * interval;
        if (k - grid_time).abs() > interval * 0.25 {
            continue;
        }
        let pos = (beat as i64).rem_euclid(votes.len() as i64) as usize;
        votes[pos] += 1;
    }
    votes
}

/// Bar position with the most votes; ties go to the earliest position.
pub fn dominant_position(votes: &[usize]) -> usize {
    let mut best = 0;
    for (i, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::testutil::periodic;

    const INTERVAL: f64 = 60.0 / 128.0;

    #[test]
    fn phase_of_clean_grid() {
        let beats = periodic(0.142, INTERVAL, 60.0);
        let phase = estimate_phase(&beats, INTERVAL).unwrap();
        assert!((phase - 0.142).abs() < 1e-6, "phase {}", phase);
    }

    #[test]
    fn phase_ignores_pickup_beats() {
        let mut beats = vec![0.02, 0.31];
        beats.extend(periodic(1.142, INTERVAL, 60.0));
        let phase = estimate_phase(&beats, INTERVAL).unwrap();
        assert!(((phase - 1.142f64.rem_euclid(INTERVAL)).abs()) < 1e-6);
    }

    #[test]
    fn phase_wraps_around_zero() {
        // alternate just before and just after a beat boundary
        let beats: Vec<f64> = (0..64)
            .map(|k| k as f64 * INTERVAL + if k % 2 == 0 { 0.004 } else { -0.004 })
            .filter(|&t| t > 0.0)
            .collect();
        let phase = estimate_phase(&beats, INTERVAL).unwrap();
        let wrapped = wrap_centered(phase, INTERVAL);
        assert!(wrapped.abs() <= 0.0041, "phase {}", phase);
    }

    #[test]
    fn phase_median_resists_jitter() {
        let mut state = 12345u64;
        let beats: Vec<f64> = periodic(0.2, INTERVAL, 90.0)
            .into_iter()
            .map(|t| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let jitter = ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) * 0.01;
                t + jitter
            })
            .collect();
        let phase = estimate_phase(&beats, INTERVAL).unwrap();
        assert!((phase - 0.2).abs() < 0.003, "phase {}", phase);
    }

    #[test]
    fn phase_needs_input() {
        assert_eq!(estimate_phase(&[], INTERVAL), None);
        assert_eq!(estimate_phase(&[1.0], 0.0), None);
    }

    #[test]
    fn ghost_kicks_removed() {
        let kicks = [0.0, 0.1, 0.47, 0.5, 0.94, 1.40];
        let kept = filter_ghost_kicks(&kicks, INTERVAL, 0.7);
        assert_eq!(kept, vec![0.0, 0.47, 0.94, 1.40]);
    }

    #[test]
    fn votes_by_bar_position() {
        // kicks on beats 1 and 3 of a grid at phase 0.1
        let kicks: Vec<f64> = (0..16).map(|k| 0.1 + (k * 2) as f64 * INTERVAL).collect();
        let votes = bar_position_votes(&kicks, 0.1, INTERVAL, 4);
        assert_eq!(votes, vec![8, 0, 8, 0]);
        // shifted by one beat they vote for position 1 and 3
        let votes = bar_position_votes(&kicks, 0.1 - INTERVAL, INTERVAL, 4);
        assert_eq!(votes, vec![0, 8, 0, 8]);
        assert_eq!(dominant_position(&votes), 1);
    }

    #[test]
    fn off_grid_kicks_do_not_vote() {
        let votes = bar_position_votes(&[0.1 + INTERVAL * 0.5], 0.1, INTERVAL, 4);
        assert_eq!(votes.iter().sum::<usize>(), 0);
    }
}
