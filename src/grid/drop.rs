//! Drop detection: the first dense kick section after a sparse one.

use serde::{Deserialize, Serialize};

use crate::config::DropConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropConfidence {
    None,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDetection {
    pub drop_kick_sec: Option<f64>,
    pub confidence: DropConfidence,
}

impl DropDetection {
    pub fn none() -> Self {
        Self {
            drop_kick_sec: None,
            confidence: DropConfidence::None,
        }
    }
}

/// Kick counts per window of `window_beats` beats, windows starting at 0.
fn window_counts(kicks: &[f64], window_sec: f64, duration: f64) -> Vec<usize> {
    let num_windows = (duration / window_sec).ceil().max(1.0) as usize;
    let mut counts = vec![0usize; num_windows];
    for &k in kicks {
        if k < 0.0 {
            continue;
        }
        let w = (k / window_sec) as usize;
        if w < num_windows {
            counts[w] += 1;
        }
    }
    counts
}

/// Scan consecutive windows for a sparse-to-dense transition and return the
/// first kick of the dense window.
///
/// The density ratio is `next / max(prev, 1)`, so an empty breakdown followed
/// by a full window scores `next`.
pub fn detect_drop(kicks: &[f64], bpm: f64, duration: f64, config: &DropConfig) -> DropDetection {
    if kicks.is_empty() || !(bpm > 0.0) || !(duration > 0.0) || config.window_beats == 0 {
        return DropDetection::none();
    }

    let window_sec = config.window_beats as f64 * 60.0 / bpm;
    let counts = window_counts(kicks, window_sec, duration);

    for (i, pair) in counts.windows(2).enumerate() {
        let (prev, next) = (pair[0], pair[1]);
        if prev >= config.max_sparse_kicks || next < config.min_dense_kicks {
            continue;
        }
        let ratio = next as f64 / prev.max(1) as f64;
        if ratio < config.min_density_ratio {
            continue;
        }

        let start = (i + 1) as f64 * window_sec;
        let idx = kicks.partition_point(|&k| k < start);
        let Some(&drop_kick) = kicks.get(idx) else {
            continue;
        };
        let confidence = if ratio >= config.high_density_ratio {
            DropConfidence::High
        } else {
            DropConfidence::Medium
        };
        log::debug!(
            "Drop at {:.3}s (window {}, {} -> {} kicks, {:?})",
            drop_kick,
            i + 1,
            prev,
            next,
            confidence
        );
        return DropDetection {
            drop_kick_sec: Some(drop_kick),
            confidence,
        };
    }

    DropDetection::none()
}
