//! Small robust-statistics helpers shared by the onset and grid stages.

use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Median; the mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) * 0.5)
    } else {
        Some(v[mid])
    }
}

pub fn median_f32(values: &[f32]) -> f32 {
    let widened: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    median(&widened).unwrap_or(0.0) as f32
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let pos = q.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(v[lo] + (v[hi] - v[lo]) * (pos - lo as f64))
}

pub fn interquartile_range(values: &[f64]) -> Option<f64> {
    Some(quantile(values, 0.75)? - quantile(values, 0.25)?)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn std_dev_f32(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

/// Index of the element nearest to `target` in a slice sorted ascending by
/// `key`. Binary search, then compare the two neighbours of the insertion
/// point. Ties resolve to the earlier element.
pub fn nearest_sorted<T, K>(values: &[T], target: f64, key: K) -> Option<usize>
where
    K: Fn(&T) -> f64,
{
    if values.is_empty() {
        return None;
    }
    let idx = values.partition_point(|v| key(v) < target);
    if idx == 0 {
        return Some(0);
    }
    if idx >= values.len() {
        return Some(values.len() - 1);
    }
    let before = target - key(&values[idx - 1]);
    let after = key(&values[idx]) - target;
    if before <= after {
        Some(idx - 1)
    } else {
        Some(idx)
    }
}

/// Nearest timestamp within `tolerance` seconds.
pub fn nearest_within(sorted_times: &[f64], target: f64, tolerance: f64) -> Option<f64> {
    let idx = nearest_sorted(sorted_times, target, |&t| t)?;
    let t = sorted_times[idx];
    ((t - target).abs() <= tolerance).then_some(t)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic xorshift so the cross-check is reproducible.
    fn xorshift(state: &mut u64) -> f64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state >> 11) as f64 / (1u64 << 53) as f64
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn iqr_of_uniform_steps() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.25), Some(2.0));
        assert_eq!(quantile(&v, 0.75), Some(4.0));
        assert_eq!(interquartile_range(&v), Some(2.0));
    }

    #[test]
    fn std_dev_of_constant_is_zero() {
        assert_eq!(std_dev_f32(&[2.0, 2.0, 2.0]), 0.0);
        assert!((std_dev_f32(&[1.0, 3.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nearest_handles_edges() {
        let v = [1.0, 2.0, 4.0];
        assert_eq!(nearest_sorted(&v, -5.0, |&x| x), Some(0));
        assert_eq!(nearest_sorted(&v, 10.0, |&x| x), Some(2));
        assert_eq!(nearest_sorted(&v, 2.9, |&x| x), Some(1));
        assert_eq!(nearest_sorted(&v, 3.1, |&x| x), Some(2));
        assert_eq!(nearest_sorted::<f64, _>(&[], 1.0, |&x| x), None);
    }

    #[test]
    fn nearest_matches_brute_force_on_random_inputs() {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        for _ in 0..200 {
            let n = 1 + (xorshift(&mut state) * 50.0) as usize;
            let mut values: Vec<f64> = (0..n).map(|_| xorshift(&mut state) * 100.0).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for _ in 0..20 {
                let target = xorshift(&mut state) * 120.0 - 10.0;
                let found = nearest_sorted(&values, target, |&x| x).unwrap();
                let best = values
                    .iter()
                    .map(|v| (v - target).abs())
                    .fold(f64::INFINITY, f64::min);
                assert!((values[found] - target).abs() <= best + 1e-12);
            }
        }
    }

    #[test]
    fn nearest_within_respects_tolerance() {
        let v = [0.5, 1.0, 1.5];
        assert_eq!(nearest_within(&v, 1.01, 0.02), Some(1.0));
        assert_eq!(nearest_within(&v, 1.2, 0.02), None);
    }

    #[test]
    fn nearest_with_key_projection() {
        let pairs = [(0.1, 'a'), (0.5, 'b'), (0.9, 'c')];
        assert_eq!(nearest_sorted(&pairs, 0.6, |p| p.0), Some(1));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(127.96, 1), 128.0);
        assert_eq!(round_to(-0.125, 2), -0.13);
    }
}
