use serde::{Deserialize, Serialize};

/// Ordered verdict: `Ok < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// No beat-tracker output at all (audio could not be decoded).
    NoPcm,
    NoBeatsDetected,
    TooFewBeats,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoPcm => "no-pcm",
            SkipReason::NoBeatsDetected => "no-beats-detected",
            SkipReason::TooFewBeats => "too-few-beats",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the upstream beat tracker for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBeatResult {
    pub track_id: String,
    /// Ascending beat times in seconds.
    pub beat_timestamps: Vec<f64>,
    pub bpm_estimate: f64,
    /// Coarse per-window BPM estimates, evenly spaced over the track.
    #[serde(default)]
    pub segment_bpms: Vec<f64>,
    /// Mean detection confidence, 0-1.
    #[serde(default)]
    pub confidence: f64,
    pub sample_rate: u32,
    /// Seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick_onsets: Option<Vec<f64>>,
}

impl RawBeatResult {
    pub fn kicks(&self) -> &[f64] {
        self.kick_onsets.as_deref().unwrap_or(&[])
    }

    /// Track length, falling back to the last beat when the duration is unknown.
    pub fn effective_duration(&self) -> f64 {
        if self.duration > 0.0 {
            self.duration
        } else {
            self.beat_timestamps.last().copied().unwrap_or(0.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoMarker {
    /// Seconds from track start.
    pub position: f64,
    pub bpm: f64,
    pub meter: String,
    /// Beat number within the bar at `position`, 1-based.
    pub beat: u32,
}

impl TempoMarker {
    pub fn new(position: f64, bpm: f64, beat: u32) -> Self {
        Self {
            position,
            bpm,
            meter: "4/4".to_string(),
            beat,
        }
    }

    /// Single-marker grid anchored on a downbeat, as confirmed in the editor.
    pub fn anchor(phase_offset_sec: f64, bpm: f64) -> Self {
        Self::new(phase_offset_sec, bpm, 1)
    }

    /// Seconds per beat.
    pub fn interval(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Numerator of the meter; anything unparsable counts as 4.
    pub fn beats_per_bar(&self) -> u32 {
        self.meter
            .split('/')
            .next()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMethod {
    Static,
    Dynamic,
    Skipped,
}

/// A usable generated grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSolution {
    pub tempo_markers: Vec<TempoMarker>,
    pub is_variable_bpm: bool,
    /// 0-100.
    pub confidence: u8,
    pub median_bpm: f64,
    pub phase_offset_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum GeneratedBeatgrid {
    Static(GridSolution),
    Dynamic(GridSolution),
    #[serde(rename_all = "camelCase")]
    Skipped { skip_reason: SkipReason },
}

impl GeneratedBeatgrid {
    pub fn method(&self) -> GridMethod {
        match self {
            GeneratedBeatgrid::Static(_) => GridMethod::Static,
            GeneratedBeatgrid::Dynamic(_) => GridMethod::Dynamic,
            GeneratedBeatgrid::Skipped { .. } => GridMethod::Skipped,
        }
    }

    pub fn solution(&self) -> Option<&GridSolution> {
        match self {
            GeneratedBeatgrid::Static(s) | GeneratedBeatgrid::Dynamic(s) => Some(s),
            GeneratedBeatgrid::Skipped { .. } => None,
        }
    }

    pub fn tempo_markers(&self) -> &[TempoMarker] {
        self.solution().map_or(&[], |s| s.tempo_markers.as_slice())
    }

    pub fn confidence(&self) -> u8 {
        self.solution().map_or(0, |s| s.confidence)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            GeneratedBeatgrid::Skipped { skip_reason } => Some(*skip_reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatDriftPoint {
    /// Index of the matched expected beat.
    pub beat_index: usize,
    pub position_ms: f64,
    /// Detected minus expected.
    pub drift_ms: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBeatgridResult {
    pub track_id: String,
    pub overall_severity: Severity,
    /// 0-100.
    pub confidence: u8,
    pub drift_points: Vec<BeatDriftPoint>,
    pub avg_drift_ms: f64,
    pub max_drift_ms: f64,
    pub beats_analyzed: usize,
    pub beats_matched: usize,
    pub is_variable_bpm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_beat_ms: Option<f64>,
    /// Beats by which the stored beat 1 sits off the kick pattern's bar
    /// start (0 when in phase). `None` without enough kicks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_phase_beats: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl TrackBeatgridResult {
    pub(crate) fn empty(track_id: &str, severity: Severity, skip_reason: Option<SkipReason>) -> Self {
        Self {
            track_id: track_id.to_string(),
            overall_severity: severity,
            confidence: 0,
            drift_points: Vec::new(),
            avg_drift_ms: 0.0,
            max_drift_ms: 0.0,
            beats_analyzed: 0,
            beats_matched: 0,
            is_variable_bpm: false,
            off_beat_ms: None,
            out_of_phase_beats: None,
            skip_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Error.min(Severity::Warning), Severity::Warning);
    }

    #[test]
    fn skipped_grid_serialises_with_reason() {
        let grid = GeneratedBeatgrid::Skipped {
            skip_reason: SkipReason::TooFewBeats,
        };
        let json = serde_json::to_value(&grid).unwrap();
        assert_eq!(json["method"], "skipped");
        assert_eq!(json["skipReason"], "too-few-beats");
        assert!(grid.tempo_markers().is_empty());
        assert_eq!(grid.confidence(), 0);
    }

    #[test]
    fn static_grid_round_trips() {
        let grid = GeneratedBeatgrid::Static(GridSolution {
            tempo_markers: vec![TempoMarker::anchor(0.25, 128.0)],
            is_variable_bpm: false,
            confidence: 97,
            median_bpm: 128.0,
            phase_offset_sec: 0.25,
        });
        let json = serde_json::to_string(&grid).unwrap();
        assert!(json.contains("\"method\":\"static\""));
        assert!(json.contains("\"tempoMarkers\""));
        let back: GeneratedBeatgrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);
        assert_eq!(back.method(), GridMethod::Static);
        assert_eq!(back.skip_reason(), None);
    }

    #[test]
    fn raw_beat_result_reads_camel_case() {
        let raw: RawBeatResult = serde_json::from_str(
            r#"{"trackId":"t1","beatTimestamps":[0.5,1.0],"bpmEstimate":120.0,
                "sampleRate":44100,"duration":3.0}"#,
        )
        .unwrap();
        assert_eq!(raw.track_id, "t1");
        assert!(raw.kicks().is_empty());
        assert!(raw.segment_bpms.is_empty());
    }

    #[test]
    fn meter_parsing() {
        let mut m = TempoMarker::new(0.0, 120.0, 1);
        assert_eq!(m.beats_per_bar(), 4);
        m.meter = "3/4".into();
        assert_eq!(m.beats_per_bar(), 3);
        m.meter = "garbage".into();
        assert_eq!(m.beats_per_bar(), 4);
        assert!((m.interval() - 0.5).abs() < 1e-12);
    }
}
