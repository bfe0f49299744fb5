use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use gridaudit::{RawBeatResult, TempoMarker};

/// One track as exported by the library layer: its stored grid plus the
/// beat tracker's output (absent when the audio could not be decoded).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBundle {
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub tempo_markers: Vec<TempoMarker>,
    #[serde(default)]
    pub raw_beat: Option<RawBeatResult>,
}

impl TrackBundle {
    /// Bundle id, else the tracker's id, else the file stem.
    pub fn id(&self, path: &Path) -> String {
        self.track_id
            .clone()
            .or_else(|| self.raw_beat.as_ref().map(|r| r.track_id.clone()))
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| file_stem(path))
    }
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn load(path: &Path) -> Result<TrackBundle> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_library_export() {
        let bundle: TrackBundle = serde_json::from_str(
            r#"{
                "tempoMarkers": [{"position": 0.142, "bpm": 128.0, "meter": "4/4", "beat": 1}],
                "rawBeat": {"trackId": "abc", "beatTimestamps": [0.142, 0.61], "bpmEstimate": 128.0,
                            "sampleRate": 44100, "duration": 1.0, "kickOnsets": [0.142]}
            }"#,
        )
        .unwrap();
        assert_eq!(bundle.tempo_markers.len(), 1);
        assert_eq!(bundle.id(Path::new("x/track.json")), "abc");
        assert_eq!(bundle.raw_beat.unwrap().kicks(), &[0.142]);
    }

    #[test]
    fn missing_raw_beat_falls_back_to_file_name() {
        let bundle: TrackBundle = serde_json::from_str(r#"{"rawBeat": null}"#).unwrap();
        assert!(bundle.raw_beat.is_none());
        assert!(bundle.tempo_markers.is_empty());
        assert_eq!(bundle.id(Path::new("lib/0042.json")), "0042");
    }
}
