mod bundle;
mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use gridaudit::{check_beatgrid, compute_live_precision, generate_beatgrid, EngineConfig, GeneratedBeatgrid, SkipReason};

use bundle::TrackBundle;
use cli::{Cli, Command};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut engine = EngineConfig::default();
    if let Some(path) = settings::discover(cli.config.as_deref()) {
        match settings::load(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Merge: file values apply only when the CLI is at its default
                if !cli.pretty { cli.pretty = cfg.output.pretty; }
                if cli.output.is_none() { cli.output = cfg.output.dir; }
                if cli.jobs == 0 { cli.jobs = cfg.jobs; }
                engine = cfg.engine;
            }
            Err(err) => log::warn!("Failed to load config from {}: {:#}", path.display(), err),
        }
    }

    if cli.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
            .context("Failed to size the worker pool")?;
    }

    let out = Output {
        dir: cli.output.clone(),
        pretty: cli.pretty,
    };
    if let Some(dir) = &out.dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    log::debug!("Running {} with {:?}", cli.command.name(), engine);
    match &cli.command {
        Command::Check { bundles } => {
            log::info!("Checking {} tracks", bundles.len());
            let results = run_batch(bundles, |bundle, id| {
                check_beatgrid(id, &bundle.tempo_markers, bundle.raw_beat.as_ref(), &engine)
            })?;
            let mut tally: BTreeMap<String, usize> = BTreeMap::new();
            let failed = emit(&results, &out, "check", |report| {
                let key = match report.skip_reason {
                    Some(reason) => format!("skipped ({})", reason),
                    None => format!("{:?}", report.overall_severity).to_lowercase(),
                };
                *tally.entry(key).or_default() += 1;
            })?;
            log::info!("Done: {:?}, {} failed", tally, failed);
        }
        Command::Generate { bundles } => {
            log::info!("Generating grids for {} tracks", bundles.len());
            let results = run_batch(bundles, |bundle, id| {
                let Some(raw) = &bundle.raw_beat else {
                    log::warn!("{}: no beat-tracker output", id);
                    return GeneratedBeatgrid::Skipped {
                        skip_reason: SkipReason::NoPcm,
                    };
                };
                let existing = (!bundle.tempo_markers.is_empty()).then_some(bundle.tempo_markers.as_slice());
                generate_beatgrid(raw, existing, &engine)
            })?;
            let mut tally: BTreeMap<String, usize> = BTreeMap::new();
            let failed = emit(&results, &out, "grid", |grid| {
                *tally.entry(format!("{:?}", grid.method()).to_lowercase()).or_default() += 1;
            })?;
            log::info!("Done: {:?}, {} failed", tally, failed);
        }
        Command::Precision { bundle: path, phase, bpm } => {
            let track = bundle::load(path)?;
            let track_id = track.id(path);
            let raw = track
                .raw_beat
                .as_ref()
                .with_context(|| format!("{} has no beat-tracker output", path.display()))?;
            let precision = compute_live_precision(&raw.beat_timestamps, *phase, *bpm, raw.effective_duration());
            log::info!(
                "{}: {:.2} ms average drift at {:.3}s / {:.2} BPM",
                track_id,
                precision.avg_drift_ms,
                phase,
                bpm
            );
            out.write(&track_id, "precision", &precision)?;
        }
    }

    Ok(())
}

struct Output {
    dir: Option<PathBuf>,
    pretty: bool,
}

impl Output {
    /// One JSON document per track: a file in the output directory, or a
    /// line on stdout.
    fn write<T: Serialize>(&self, track_id: &str, kind: &str, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        match &self.dir {
            Some(dir) => {
                let path = dir.join(format!("{}.{}.json", sanitize(track_id), kind));
                std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

struct TrackOutcome<T> {
    path: PathBuf,
    track_id: String,
    result: Result<T>,
}

/// Run `f` on every bundle in the rayon pool. A bundle that fails to load is
/// reported and does not stop the batch.
fn run_batch<T, F>(paths: &[PathBuf], f: F) -> Result<Vec<TrackOutcome<T>>>
where
    T: Send,
    F: Fn(&TrackBundle, &str) -> T + Sync,
{
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tracks ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let outcomes = paths
        .par_iter()
        .map(|path| {
            let outcome = match bundle::load(path) {
                Ok(bundle) => {
                    let track_id = bundle.id(path);
                    let value = f(&bundle, &track_id);
                    TrackOutcome {
                        path: path.clone(),
                        track_id,
                        result: Ok(value),
                    }
                }
                Err(err) => TrackOutcome {
                    path: path.clone(),
                    track_id: bundle::file_stem(path),
                    result: Err(err),
                },
            };
            pb.inc(1);
            outcome
        })
        .collect();

    pb.finish_with_message("Analysis complete");
    Ok(outcomes)
}

/// Write every successful report, feed it to `tally` and return the number
/// of failed tracks.
fn emit<T, S>(outcomes: &[TrackOutcome<T>], out: &Output, kind: &str, mut tally: S) -> Result<usize>
where
    T: Serialize,
    S: FnMut(&T),
{
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                tally(report);
                out.write(&outcome.track_id, kind, report)?;
            }
            Err(err) => {
                failed += 1;
                log::error!("{}: {:#}", outcome.path.display(), err);
            }
        }
    }
    Ok(failed)
}
