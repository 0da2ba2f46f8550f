//! Upload run lifecycle.
//!
//! Checks every precondition before the first request, then hands the
//! platform's flow to the replay engine and folds its outcome into a single
//! [`UploadResult`].

use crate::engine::{Flow, ReplayContext, ReplayEngine, ReplayError, VideoFile};
use crate::model::{UploadConfig, UploadEvent, UploadResult};
use crate::session::{AuthState, SessionError};
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Fatal errors raised before any network call is made.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("session at {0} has expired; log in again")]
    SessionExpired(PathBuf),

    #[error("cannot use saved session: {0}")]
    Credentials(#[source] ReplayError),

    #[error("failed to read video {path}: {source}")]
    ReadVideo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] ReplayError),
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

fn base_result(cfg: &UploadConfig) -> UploadResult {
    UploadResult {
        timestamp_utc: String::new(),
        platform: cfg.job.platform,
        model: cfg.job.model.clone(),
        title: cfg.job.title.clone(),
        success: false,
        skipped: false,
        ids: Default::default(),
        failed_step: None,
        message: None,
        elapsed: Default::default(),
    }
}

/// Run one upload. `Err` means a precondition failed and nothing was sent;
/// remote failures come back as an unsuccessful [`UploadResult`].
pub(crate) async fn run_upload(
    cfg: &UploadConfig,
    event_tx: Option<mpsc::UnboundedSender<UploadEvent>>,
) -> Result<UploadResult, UploadError> {
    let started = Instant::now();
    let platform = cfg.job.platform;
    let emit = |msg: String| {
        if let Some(tx) = &event_tx {
            let _ = tx.send(UploadEvent::Info(msg));
        }
    };

    info!(model = %cfg.job.model, %platform, session = %cfg.session_path.display(), "loading session");
    let auth = AuthState::load(&cfg.session_path)?;
    let now = time::OffsetDateTime::now_utc().unix_timestamp() as f64;
    if auth.is_expired(platform.domain(), now) {
        return Err(UploadError::SessionExpired(cfg.session_path.clone()));
    }

    if !cfg.job.video_path.is_file() {
        warn!(path = %cfg.job.video_path.display(), "video not found, skipping upload");
        let mut result = base_result(cfg);
        result.skipped = true;
        result.message = Some(format!(
            "video {} does not exist; upload skipped",
            cfg.job.video_path.display()
        ));
        result.timestamp_utc = now_rfc3339();
        result.elapsed = started.elapsed();
        return Ok(result);
    }

    let flow = Flow::for_platform(platform);
    info!(platform = %flow.platform, steps = flow.steps.len(), "replaying upload flow");
    let mut ctx = ReplayContext::new(cfg.endpoints.clone(), cfg.job.clone());
    (flow.seed)(&auth, &mut ctx).map_err(UploadError::Credentials)?;

    let data = tokio::fs::read(&cfg.job.video_path)
        .await
        .map_err(|source| UploadError::ReadVideo {
            path: cfg.job.video_path.clone(),
            source,
        })?;
    let file_name = cfg
        .job
        .video_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());
    let video = VideoFile::new(file_name, Bytes::from(data));
    emit(format!(
        "Uploading {} ({} bytes) to {platform}",
        video.file_name,
        video.size()
    ));
    ctx = ctx.with_video(video);

    let mut engine = ReplayEngine::new(&cfg.user_agent).map_err(UploadError::Client)?;
    if let Some(tx) = event_tx.clone() {
        engine = engine.with_events(tx);
    }

    let outcome = engine.run(&flow.steps, &mut ctx).await;

    let mut result = base_result(cfg);
    result.ids = flow.collect_ids(&ctx);
    match outcome {
        Ok(()) => {
            result.success = true;
            info!(ids = ?result.ids, "upload published");
        }
        Err(failure) => {
            result.failed_step = Some(failure.step.to_string());
            result.message = Some(failure.error.to_string());
        }
    }
    result.timestamp_utc = now_rfc3339();
    result.elapsed = started.elapsed();
    Ok(result)
}
