use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use gridaudit::EngineConfig;

const LOCAL_CONFIG: &str = "gridaudit.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub jobs: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub pretty: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Explicit path, else `gridaudit.toml` in the working directory, else the
/// per-user config file.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("gridaudit").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("gridaudit").join("config.toml"))
        .filter(|p| p.exists())
}

pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse(&content).with_context(|| format!("parsing {}", path.display()))
}

fn parse(content: &str) -> Result<Settings> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_and_output_tables() {
        let s = parse(
            r#"
            jobs = 6

            [output]
            pretty = true
            dir = "reports"

            [engine.verify]
            out_of_phase_share = 0.7

            [engine.generate]
            min_beats = 16
            "#,
        )
        .unwrap();
        assert_eq!(s.jobs, 6);
        assert!(s.output.pretty);
        assert_eq!(s.output.dir, Some(PathBuf::from("reports")));
        assert_eq!(s.engine.verify.out_of_phase_share, 0.7);
        assert_eq!(s.engine.verify.out_of_phase_ratio, 1.5);
        assert_eq!(s.engine.generate.min_beats, 16);
    }

    #[test]
    fn unknown_values_are_rejected_by_type() {
        assert!(parse("jobs = \"many\"").is_err());
        let s = parse("").unwrap();
        assert_eq!(s.engine, EngineConfig::default());
        assert!(s.output.dir.is_none());
    }

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("/tmp/elsewhere.toml");
        assert_eq!(discover(Some(p)), Some(p.to_path_buf()));
    }
}
