//! Tunable heuristics of the grid engine.
//!
//! Defaults are the empirically tuned values; every field can be overridden
//! from the `[engine]` table of the config file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub generate: GenerateConfig,
    #[serde(default)]
    pub drop: DropConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_tracker_weight")]
    pub tracker_weight: f64,
    #[serde(default = "default_strength_weight")]
    pub strength_weight: f64,
    #[serde(default = "default_kick_weight")]
    pub kick_weight: f64,
    /// Summed weight a position needs to be accepted.
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_max_tolerance_sec")]
    pub max_tolerance_sec: f64,
    /// Tolerance as a fraction of the beat interval; the smaller of the two wins.
    #[serde(default = "default_tolerance_fraction")]
    pub tolerance_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default = "default_min_beats")]
    pub min_beats: usize,
    /// IQR of segment BPMs, as percent of their median, above which a track is variable.
    #[serde(default = "default_variable_spread_pct")]
    pub variable_spread_pct: f64,
    #[serde(default = "default_min_dynamic_segments")]
    pub min_dynamic_segments: usize,
    /// Adjacent segments closer than this (percent) are merged.
    #[serde(default = "default_segment_merge_pct")]
    pub segment_merge_pct: f64,
    /// An existing BPM is kept when the detected one is within this (percent).
    #[serde(default = "default_keep_existing_pct")]
    pub keep_existing_pct: f64,
    #[serde(default = "default_min_kicks_for_tempo")]
    pub min_kicks_for_tempo: usize,
    #[serde(default = "default_min_kicks_for_filter")]
    pub min_kicks_for_filter: usize,
    /// Kicks closer than this fraction of a beat to the previous kept kick are dropped.
    #[serde(default = "default_ghost_kick_fraction")]
    pub ghost_kick_fraction: f64,
    #[serde(default = "default_min_kicks_for_bars")]
    pub min_kicks_for_bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropConfig {
    #[serde(default = "default_window_beats")]
    pub window_beats: usize,
    /// The window before a drop must hold fewer kicks than this.
    #[serde(default = "default_max_sparse_kicks")]
    pub max_sparse_kicks: usize,
    #[serde(default = "default_min_dense_kicks")]
    pub min_dense_kicks: usize,
    #[serde(default = "default_min_density_ratio")]
    pub min_density_ratio: f64,
    #[serde(default = "default_high_density_ratio")]
    pub high_density_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_min_beats")]
    pub min_beats_for_error: usize,
    /// Share of beats beyond the warning tolerance that escalates to error.
    #[serde(default = "default_error_beat_share")]
    pub error_beat_share: f64,
    #[serde(default = "default_min_off_beat_points")]
    pub min_off_beat_points: usize,
    #[serde(default = "default_min_phase_kicks")]
    pub min_phase_kicks: usize,
    /// 2+4 votes must exceed 1+3 votes by this factor.
    #[serde(default = "default_out_of_phase_ratio")]
    pub out_of_phase_ratio: f64,
    /// ...and hold at least this share of all votes.
    #[serde(default = "default_out_of_phase_share")]
    pub out_of_phase_share: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            tracker_weight: default_tracker_weight(),
            strength_weight: default_strength_weight(),
            kick_weight: default_kick_weight(),
            min_weight: default_min_weight(),
            max_tolerance_sec: default_max_tolerance_sec(),
            tolerance_fraction: default_tolerance_fraction(),
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            min_beats: default_min_beats(),
            variable_spread_pct: default_variable_spread_pct(),
            min_dynamic_segments: default_min_dynamic_segments(),
            segment_merge_pct: default_segment_merge_pct(),
            keep_existing_pct: default_keep_existing_pct(),
            min_kicks_for_tempo: default_min_kicks_for_tempo(),
            min_kicks_for_filter: default_min_kicks_for_filter(),
            ghost_kick_fraction: default_ghost_kick_fraction(),
            min_kicks_for_bars: default_min_kicks_for_bars(),
        }
    }
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            window_beats: default_window_beats(),
            max_sparse_kicks: default_max_sparse_kicks(),
            min_dense_kicks: default_min_dense_kicks(),
            min_density_ratio: default_min_density_ratio(),
            high_density_ratio: default_high_density_ratio(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            min_beats_for_error: default_min_beats(),
            error_beat_share: default_error_beat_share(),
            min_off_beat_points: default_min_off_beat_points(),
            min_phase_kicks: default_min_phase_kicks(),
            out_of_phase_ratio: default_out_of_phase_ratio(),
            out_of_phase_share: default_out_of_phase_share(),
        }
    }
}

fn default_tracker_weight() -> f64 { 1.0 }
fn default_strength_weight() -> f64 { 0.7 }
fn default_kick_weight() -> f64 { 0.8 }
fn default_min_weight() -> f64 { 0.5 }
fn default_max_tolerance_sec() -> f64 { 0.020 }
fn default_tolerance_fraction() -> f64 { 0.03 }

fn default_min_beats() -> usize { 10 }
fn default_variable_spread_pct() -> f64 { 3.0 }
fn default_min_dynamic_segments() -> usize { 4 }
fn default_segment_merge_pct() -> f64 { 2.0 }
fn default_keep_existing_pct() -> f64 { 2.0 }
fn default_min_kicks_for_tempo() -> usize { 16 }
fn default_min_kicks_for_filter() -> usize { 4 }
fn default_ghost_kick_fraction() -> f64 { 0.7 }
fn default_min_kicks_for_bars() -> usize { 8 }

fn default_window_beats() -> usize { 16 }
fn default_max_sparse_kicks() -> usize { 2 }
fn default_min_dense_kicks() -> usize { 8 }
fn default_min_density_ratio() -> f64 { 4.0 }
fn default_high_density_ratio() -> f64 { 8.0 }

fn default_error_beat_share() -> f64 { 0.3 }
fn default_min_off_beat_points() -> usize { crate::grid::verify::MIN_OFF_BEAT_POINTS }
fn default_min_phase_kicks() -> usize { 8 }
fn default_out_of_phase_ratio() -> f64 { 1.5 }
fn default_out_of_phase_share() -> f64 { 0.6 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [verify]
            out_of_phase_ratio = 2.0

            [drop]
            high_density_ratio = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.verify.out_of_phase_ratio, 2.0);
        assert_eq!(cfg.verify.out_of_phase_share, 0.6);
        assert_eq!(cfg.drop.high_density_ratio, 10.0);
        assert_eq!(cfg.drop.min_density_ratio, 4.0);
        assert_eq!(cfg.fusion, FusionConfig::default());
    }

    #[test]
    fn empty_toml_is_default() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }
}
