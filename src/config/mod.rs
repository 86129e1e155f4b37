//! Configuration loading for qadrift

mod schema;

pub use schema::Config;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = ".qadriftrc.json";

/// Find and load the config file. Searches current directory then parents.
pub fn load_config(work_dir: &Path, custom_path: Option<&Path>) -> Result<Config> {
    let path = if let Some(p) = custom_path {
        let path = if p.is_absolute() {
            p.to_path_buf()
        } else {
            work_dir.join(p)
        };
        if path.exists() {
            Some(path)
        } else {
            anyhow::bail!("Config file not found: {}", path.display());
        }
    } else {
        find_config_in_parents(work_dir)
    };

    match path {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in config: {}", path.display()))?;
            validate(&config).with_context(|| format!("Invalid config: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

fn validate(config: &Config) -> Result<()> {
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        anyhow::bail!("alpha must be in (0, 1), got {}", config.alpha);
    }
    if config.anatomical_cutover > config.flat_layout_cutover {
        anyhow::bail!(
            "anatomicalCutover ({}) must not be after flatLayoutCutover ({})",
            config.anatomical_cutover,
            config.flat_layout_cutover
        );
    }
    Ok(())
}

/// Search for .qadriftrc.json in directory and its parents
fn find_config_in_parents(mut dir: &Path) -> Option<PathBuf> {
    loop {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Build a GlobSet from patterns for path matching
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| anyhow::anyhow!("{}", e))
}

/// Check if a path should be ignored based on config glob patterns
pub fn is_ignored(path: &Path, ignore_set: &GlobSet) -> bool {
    ignore_set.is_match(path)
}

/// Default config written by `qadrift init`
pub fn default_config_json() -> String {
    r#"{
  "flatLayoutCutover": "2018-01-01",
  "anatomicalCutover": "2017-10-26",
  "anatomicalSuffix": "T1w.json",
  "includePatterns": ["**/*_bold.json"],
  "ignore": ["**/derivatives/**/figures/**"],
  "seasonalEpoch": "2017-01-01",
  "alpha": 0.05,
  "outputDir": ".",
  "heatmapFile": "correlation_heatmap.svg",
  "fitPlotFile": "fit_diagnostic.svg"
}
"#
    .to_string()
}
