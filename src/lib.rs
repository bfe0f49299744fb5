//! Beat-grid audit engine.
//!
//! Verifies stored beat grids against detected beats and builds new grids
//! from beat-tracker output and kick onsets. Everything here is a pure
//! computation over in-memory buffers; decoding, beat tracking and library
//! file formats live with the caller.
//!
//! ```no_run
//! use gridaudit::{check_beatgrid, generate_beatgrid, EngineConfig, RawBeatResult};
//!
//! # fn run(raw: RawBeatResult) {
//! let config = EngineConfig::default();
//! let grid = generate_beatgrid(&raw, None, &config);
//! let report = check_beatgrid(&raw.track_id, grid.tempo_markers(), Some(&raw), &config);
//! println!("{:?} ({}%)", report.overall_severity, report.confidence);
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod grid;
pub mod onset;
pub mod stats;

pub use audio::SampleBuffer;
pub use config::EngineConfig;
pub use error::{GridError, Result};
pub use grid::{
    build_expected_beats, check_beatgrid, compute_live_precision, detect_drop, detect_out_of_phase, fuse_beats,
    generate_beatgrid, prepare_raw_beats, GeneratedBeatgrid, LivePrecision, RawBeatResult, Severity, SkipReason,
    TempoMarker, TrackBeatgridResult, TrackerOutput,
};
pub use onset::OnsetTables;
