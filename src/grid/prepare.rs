use serde::{Deserialize, Serialize};

use crate::audio::SampleBuffer;
use crate::config::FusionConfig;
use crate::onset::{detect_all, OnsetTables};

use super::fusion::fuse_beats;
use super::types::RawBeatResult;

/// What the upstream beat tracker reports for one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOutput {
    pub beats: Vec<f64>,
    pub bpm: f64,
    #[serde(default)]
    pub segment_bpms: Vec<f64>,
    #[serde(default)]
    pub confidence: f64,
}

/// Run the onset detectors over `buffer`, fuse them with the tracker's
/// beats and assemble the input for generation and verification.
///
/// Fusion uses the single-band kicks; the kick sequence handed on is the
/// multi-band detector's, which rejects hi-hat and snare leakage.
pub fn prepare_raw_beats(
    track_id: &str,
    buffer: &SampleBuffer,
    tracker: &TrackerOutput,
    tables: &OnsetTables,
    config: &FusionConfig,
) -> RawBeatResult {
    let onsets = detect_all(buffer, tables);
    let fused = fuse_beats(&tracker.beats, &onsets.strength_peaks, &onsets.kicks, tracker.bpm, config);

    let confidence = if fused.confidence > 0.0 {
        fused.confidence
    } else {
        tracker.confidence
    };

    RawBeatResult {
        track_id: track_id.to_string(),
        beat_timestamps: fused.beats,
        bpm_estimate: tracker.bpm,
        segment_bpms: tracker.segment_bpms.clone(),
        confidence,
        sample_rate: buffer.sample_rate(),
        duration: buffer.duration(),
        kick_onsets: Some(onsets.multi_band_kicks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onset::testutil::{kick_track, periodic};

    #[test]
    fn fills_tracker_gaps_from_kicks() {
        let sr = 44100;
        let interval = 60.0 / 120.0;
        let kicks = periodic(0.25, interval, 20.0);
        let buffer = SampleBuffer::new(kick_track(sr, 20.0, &kicks), sr).unwrap();
        let tables = OnsetTables::new(sr).unwrap();

        // tracker misses a stretch in the middle
        let tracker_beats: Vec<f64> = kicks
            .iter()
            .enumerate()
            .filter(|(i, _)| !(15..20).contains(i))
            .map(|(_, &t)| t)
            .collect();
        let tracker = TrackerOutput {
            beats: tracker_beats,
            bpm: 120.0,
            segment_bpms: vec![120.0, 120.0],
            confidence: 0.6,
        };

        let raw = prepare_raw_beats("t", &buffer, &tracker, &tables, &FusionConfig::default());
        assert_eq!(raw.sample_rate, sr);
        assert!((raw.duration - 20.0).abs() < 1e-3);
        assert_eq!(raw.beat_timestamps.len(), kicks.len());
        assert!(raw.kicks().len() >= kicks.len() - 2);
        assert!(raw.confidence > 0.0 && raw.confidence <= 1.0);
        for (b, k) in raw.beat_timestamps.iter().zip(&kicks) {
            assert!((b - k).abs() < 0.03, "{} vs {}", b, k);
        }
    }

    #[test]
    fn silent_buffer_keeps_tracker_confidence() {
        let sr = 44100;
        let buffer = SampleBuffer::new(vec![0.0; sr as usize * 2], sr).unwrap();
        let tables = OnsetTables::new(sr).unwrap();
        let tracker = TrackerOutput {
            beats: vec![],
            bpm: 120.0,
            segment_bpms: vec![],
            confidence: 0.3,
        };
        let raw = prepare_raw_beats("t", &buffer, &tracker, &tables, &FusionConfig::default());
        assert!(raw.beat_timestamps.is_empty());
        assert_eq!(raw.confidence, 0.3);
        assert!(raw.kicks().is_empty());
    }
}
