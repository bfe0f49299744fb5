//! Beat-grid construction and verification.

pub mod drop;
pub mod fusion;
pub mod generate;
pub mod phase;
pub mod prepare;
pub mod tempo;
pub mod types;
pub mod verify;

pub use drop::{detect_drop, DropConfidence, DropDetection};
pub use fusion::{fuse_beats, FusedBeats};
pub use generate::generate_beatgrid;
pub use prepare::{prepare_raw_beats, TrackerOutput};
pub use types::{
    BeatDriftPoint, GeneratedBeatgrid, GridMethod, GridSolution, RawBeatResult, Severity, SkipReason, TempoMarker,
    TrackBeatgridResult,
};
pub use verify::{
    build_expected_beats, check_beatgrid, compute_live_precision, detect_out_of_phase, expected_grid, ExpectedBeat,
    LivePrecision, Tolerance,
};
