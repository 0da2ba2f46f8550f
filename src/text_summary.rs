//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for upload results and run history.

use crate::model::UploadResult;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn ids_line(r: &UploadResult) -> String {
    r.ids
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a text summary of one upload result.
pub(crate) fn build_text_summary(r: &UploadResult) -> TextSummary {
    let mut lines = Vec::new();

    let status = if r.skipped {
        "SKIPPED"
    } else if r.success {
        "PUBLISHED"
    } else {
        "FAILED"
    };
    lines.push(format!("{status}: {} on {} ({:?})", r.model, r.platform, r.title));

    if !r.ids.is_empty() {
        lines.push(format!("Ids: {}", ids_line(r)));
    }
    if let Some(step) = r.failed_step.as_deref() {
        lines.push(format!("Failed step: {step}"));
    }
    if let Some(msg) = r.message.as_deref() {
        if !msg.trim().is_empty() {
            lines.push(format!("Message: {msg}"));
        }
    }
    lines.push(format!(
        "Finished: {} in {}",
        r.timestamp_utc,
        humantime::format_duration(std::time::Duration::from_millis(
            r.elapsed.as_millis() as u64
        ))
    ));

    TextSummary { lines }
}

/// One line per run, newest first.
pub(crate) fn build_history_summary(runs: &[UploadResult]) -> TextSummary {
    if runs.is_empty() {
        return TextSummary {
            lines: vec!["No saved runs".to_string()],
        };
    }
    let lines = runs
        .iter()
        .map(|r| {
            let outcome = if r.success {
                ids_line(r)
            } else {
                format!(
                    "failed at {}",
                    r.failed_step.as_deref().unwrap_or("-")
                )
            };
            format!(
                "{}  {:<10} {:<16} {}",
                r.timestamp_utc, r.platform, r.model, outcome
            )
        })
        .collect();
    TextSummary { lines }
}
