//! Run history on disk: one pretty-printed JSON file per upload result.

use crate::model::UploadResult;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default history directory, e.g. `~/.local/share/trafico/runs`.
pub fn default_runs_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("could not determine a data directory")?;
    Ok(base.join("trafico").join("runs"))
}

fn file_name_for(r: &UploadResult) -> String {
    let stamp = r.timestamp_utc.replace(':', "-");
    let model: String = r
        .model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("run-{}-{}-{}.json", stamp, r.platform, model)
}

pub fn save_run(dir: &Path, r: &UploadResult) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file_name_for(r));
    export_json(&path, r)?;
    Ok(path)
}

pub fn export_json(path: &Path, r: &UploadResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(r)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Most recent runs first. Unreadable files are skipped.
pub fn load_recent(dir: &Path, limit: usize) -> Result<Vec<UploadResult>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    // File names start with the RFC 3339 timestamp, so name order is time order.
    files.sort();
    files.reverse();

    Ok(files
        .into_iter()
        .filter_map(|p| {
            let raw = std::fs::read_to_string(&p).ok()?;
            serde_json::from_str::<UploadResult>(&raw).ok()
        })
        .take(limit)
        .collect())
}
