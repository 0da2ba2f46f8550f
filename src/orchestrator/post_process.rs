//! Post-run processing utilities.
//!
//! Handles history auto-save and JSON export after an upload completes.

use crate::model::UploadResult;
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub messages: Vec<String>,
    pub saved_path: Option<PathBuf>,
}

/// Save the run to history (skipped runs are not kept) and export it if requested.
/// Failures here are reported as messages; they never change the run outcome.
pub(crate) fn process_run_completion(
    result: &UploadResult,
    history_dir: Option<&Path>,
    export_json: Option<&Path>,
) -> ProcessedRun {
    let mut messages = Vec::new();

    let saved_path = match history_dir {
        Some(dir) if !result.skipped => match storage::save_run(dir, result) {
            Ok(p) => {
                messages.push(format!("Saved: {}", p.display()));
                Some(p)
            }
            Err(e) => {
                messages.push(format!("Save failed: {e:#}"));
                None
            }
        },
        _ => None,
    };

    if let Some(path) = export_json {
        match storage::export_json(path, result) {
            Ok(()) => messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        messages,
        saved_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;

    fn result(skipped: bool) -> UploadResult {
        UploadResult {
            timestamp_utc: "2026-03-03T03:03:03Z".into(),
            platform: Platform::XxxFollow,
            model: "demo".into(),
            title: "t".into(),
            success: !skipped,
            skipped,
            ids: Default::default(),
            failed_step: None,
            message: None,
            elapsed: Default::default(),
        }
    }

    #[test]
    fn saves_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("out").join("last.json");
        let processed =
            process_run_completion(&result(false), Some(&dir.path().join("runs")), Some(&export));
        assert!(processed.saved_path.unwrap().exists());
        assert!(export.exists());
        assert_eq!(processed.messages.len(), 2);
    }

    #[test]
    fn skipped_runs_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let processed = process_run_completion(&result(true), Some(dir.path()), None);
        assert!(processed.saved_path.is_none());
        assert!(processed.messages.is_empty());
    }
}
