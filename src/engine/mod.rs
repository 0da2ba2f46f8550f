//! Upload replay engine.
//!
//! A flow is a declarative list of [`Step`]s. Each step builds one request
//! from the [`ReplayContext`] and folds what it needs from the response back
//! into the context for the next step. The engine runs the steps strictly in
//! order, one request in flight, and stops at the first failure.

pub(crate) mod http;
mod kams;
mod xxxfollow;

use crate::model::{Endpoints, Platform, UploadEvent, UploadJob};
use crate::session::AuthState;
use bytes::Bytes;
use self::http::{StepRequest, StepResponse};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Response bodies are truncated to this many characters in error messages.
const MAX_BODY_IN_ERROR: usize = 2000;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} - {body}")]
    Status { status: u16, body: String },

    #[error("response has no `{field}`: {body}")]
    MissingField { field: &'static str, body: String },

    #[error("session expired (redirected to {url}); log in again")]
    SessionExpired { url: String },

    #[error("missing credential in saved session: {0}")]
    MissingCredential(&'static str),

    #[error("no `{0}` in replay context")]
    MissingContext(&'static str),

    #[error("no video loaded for upload")]
    NoVideo,
}

impl ReplayError {
    pub(crate) fn missing_field(field: &'static str, resp: &StepResponse) -> Self {
        ReplayError::MissingField {
            field,
            body: truncate_body(resp.text()),
        }
    }
}

/// The step that failed and why. Earlier steps' remote effects are left as-is.
#[derive(Debug, Error)]
#[error("step `{step}` failed: {error}")]
pub struct StepFailure {
    pub step: &'static str,
    #[source]
    pub error: ReplayError,
}

pub type BuildFn = fn(&ReplayContext) -> Result<StepRequest, ReplayError>;
pub type ExtractFn = fn(&StepResponse, &mut ReplayContext) -> Result<(), ReplayError>;

/// One recorded HTTP call of an upload flow.
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub build: BuildFn,
    pub extract: ExtractFn,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Video bytes loaded once and shared by every step that uploads them.
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub file_name: String,
    pub mime: String,
    pub data: Bytes,
}

impl VideoFile {
    pub fn new(file_name: impl Into<String>, data: Bytes) -> Self {
        let file_name = file_name.into();
        let mime = mime_for(&file_name).to_string();
        Self {
            file_name,
            mime,
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// State threaded through the steps of one run.
#[derive(Debug, Clone)]
pub struct ReplayContext {
    pub endpoints: Endpoints,
    pub job: UploadJob,
    pub video: Option<VideoFile>,
    vars: BTreeMap<&'static str, String>,
    values: BTreeMap<&'static str, serde_json::Value>,
}

impl ReplayContext {
    pub fn new(endpoints: Endpoints, job: UploadJob) -> Self {
        Self {
            endpoints,
            job,
            video: None,
            vars: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_video(mut self, video: VideoFile) -> Self {
        self.video = Some(video);
        self
    }

    pub fn get(&self, key: &'static str) -> Result<&str, ReplayError> {
        self.vars
            .get(key)
            .map(String::as_str)
            .ok_or(ReplayError::MissingContext(key))
    }

    pub fn get_or_empty(&self, key: &'static str) -> &str {
        self.vars.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.vars.insert(key, value.into());
    }

    /// Store a JSON scalar as received so it can be echoed back with its
    /// original type. Its text form is available through [`Self::get`].
    pub fn set_value(&mut self, key: &'static str, value: serde_json::Value) {
        let text = crate::session::json_scalar_to_string(&value).unwrap_or_else(|| value.to_string());
        self.vars.insert(key, text);
        self.values.insert(key, value);
    }

    pub fn value(&self, key: &'static str) -> Result<&serde_json::Value, ReplayError> {
        self.values.get(key).ok_or(ReplayError::MissingContext(key))
    }

    pub fn video(&self) -> Result<&VideoFile, ReplayError> {
        self.video.as_ref().ok_or(ReplayError::NoVideo)
    }
}

/// A platform's upload flow: how to seed the context from a session, the
/// steps to replay, and which context keys are reported as identifiers.
#[derive(Clone)]
pub struct Flow {
    pub platform: Platform,
    pub seed: fn(&AuthState, &mut ReplayContext) -> Result<(), ReplayError>,
    pub steps: Vec<Step>,
    pub outputs: &'static [&'static str],
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("platform", &self.platform)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Flow {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Kams => kams::flow(),
            Platform::XxxFollow => xxxfollow::flow(),
        }
    }

    /// Identifiers currently present in the context.
    pub fn collect_ids(&self, ctx: &ReplayContext) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .filter_map(|k| ctx.vars.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

pub struct ReplayEngine {
    client: reqwest::Client,
    event_tx: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl ReplayEngine {
    pub fn new(user_agent: &str) -> Result<Self, ReplayError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            event_tx: None,
        })
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<UploadEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, ev: UploadEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// Run `steps` in order against `ctx`, halting on the first failure.
    pub async fn run(&self, steps: &[Step], ctx: &mut ReplayContext) -> Result<(), StepFailure> {
        for step in steps {
            self.emit(UploadEvent::StepStarted {
                step: step.name.to_string(),
            });
            match self.run_step(step, ctx).await {
                Ok(status) => {
                    info!(step = step.name, status, "step completed");
                    self.emit(UploadEvent::StepCompleted {
                        step: step.name.to_string(),
                        status,
                    });
                }
                Err(error) => {
                    warn!(step = step.name, %error, "step failed, aborting sequence");
                    self.emit(UploadEvent::StepFailed {
                        step: step.name.to_string(),
                        reason: error.to_string(),
                    });
                    return Err(StepFailure {
                        step: step.name,
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    async fn run_step(&self, step: &Step, ctx: &mut ReplayContext) -> Result<u16, ReplayError> {
        let req = (step.build)(ctx)?;
        debug!(step = step.name, method = %req.method, url = %req.url, "sending request");
        let resp = req.into_reqwest(&self.client)?.send().await?;

        let status = resp.status();
        let url = resp.url().to_string();
        let body = resp.bytes().await?;
        let resp = StepResponse { status, url, body };

        if !status.is_success() {
            return Err(ReplayError::Status {
                status: status.as_u16(),
                body: truncate_body(resp.text()),
            });
        }
        (step.extract)(&resp, ctx)?;
        Ok(status.as_u16())
    }
}

fn truncate_body(mut body: String) -> String {
    if body.chars().count() > MAX_BODY_IN_ERROR {
        body = body.chars().take(MAX_BODY_IN_ERROR).collect();
        body.push('…');
    }
    body
}

/// Fails when a landing page bounced to a login form.
pub(crate) fn ensure_logged_in(resp: &StepResponse) -> Result<(), ReplayError> {
    let lower = resp.url.to_lowercase();
    if lower.contains("login") || lower.contains("signin") {
        return Err(ReplayError::SessionExpired {
            url: resp.url.clone(),
        });
    }
    Ok(())
}

/// Extractor for steps whose response carries nothing the flow needs.
pub(crate) fn extract_nothing(_: &StepResponse, _: &mut ReplayContext) -> Result<(), ReplayError> {
    Ok(())
}

/// First non-empty string or number found at any of `paths` (dot-separated), as received.
pub(crate) fn first_value(v: &serde_json::Value, paths: &[&str]) -> Option<serde_json::Value> {
    paths.iter().find_map(|p| {
        p.split('.')
            .try_fold(v, |cur, key| cur.get(key))
            .filter(|found| crate::session::json_scalar_to_string(found).is_some())
            .cloned()
    })
}

/// Text form of [`first_value`].
pub(crate) fn first_id(v: &serde_json::Value, paths: &[&str]) -> Option<String> {
    first_value(v, paths)
        .as_ref()
        .and_then(crate::session::json_scalar_to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn job(platform: Platform) -> UploadJob {
        UploadJob {
            model: "demo".into(),
            platform,
            video_path: PathBuf::from("clip.mp4"),
            title: "Hello".into(),
            tags: "a, b".into(),
        }
    }

    pub(crate) fn endpoints_for(server: &MockServer) -> Endpoints {
        Endpoints {
            web: server.uri(),
            api: server.uri(),
            upload: server.uri(),
        }
    }

    fn get_step(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
        Ok(StepRequest::get(format!("{}/first", ctx.endpoints.web)))
    }

    fn take_token(resp: &StepResponse, ctx: &mut ReplayContext) -> Result<(), ReplayError> {
        let v = resp.json().unwrap_or_default();
        let token = first_id(&v, &["token"]).ok_or_else(|| ReplayError::missing_field("token", resp))?;
        ctx.set("token", token);
        Ok(())
    }

    fn use_token(ctx: &ReplayContext) -> Result<StepRequest, ReplayError> {
        Ok(StepRequest::post(format!("{}/second", ctx.endpoints.web))
            .header("x-token", ctx.get("token")?))
    }

    const STEPS: [Step; 2] = [
        Step {
            name: "first",
            build: get_step,
            extract: take_token,
        },
        Step {
            name: "second",
            build: use_token,
            extract: extract_nothing,
        },
    ];

    #[test]
    fn first_id_walks_paths() {
        let v = serde_json::json!({"data": {"id": 7}, "videoId": ""});
        assert_eq!(first_id(&v, &["id", "videoId", "data.id"]), Some("7".into()));
        assert_eq!(first_id(&v, &["missing"]), None);
        assert_eq!(first_value(&v, &["id", "videoId", "data.id"]), Some(serde_json::json!(7)));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(VideoFile::new("a.MP4", Bytes::new()).mime, "video/mp4");
        assert_eq!(VideoFile::new("a.mov", Bytes::new()).mime, "video/quicktime");
        assert_eq!(VideoFile::new("noext", Bytes::new()).mime, "application/octet-stream");
    }

    #[tokio::test]
    async fn threads_context_between_steps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .and(wiremock::matchers::header("x-token", "t-1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let engine = ReplayEngine::new("test").unwrap();
        let mut ctx = ReplayContext::new(endpoints_for(&server), job(Platform::Kams));
        engine.run(&STEPS, &mut ctx).await.unwrap();
        assert_eq!(ctx.get("token").unwrap(), "t-1");
    }

    #[tokio::test]
    async fn error_status_halts_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = ReplayEngine::new("test").unwrap().with_events(tx);
        let mut ctx = ReplayContext::new(endpoints_for(&server), job(Platform::Kams));
        let err = engine.run(&STEPS, &mut ctx).await.unwrap_err();
        assert_eq!(err.step, "first");
        match err.error {
            ReplayError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        drop(engine);
        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(ev.to_message());
        }
        assert_eq!(seen, vec!["== first ==", "first failed: HTTP 500 - boom"]);
    }

    #[tokio::test]
    async fn missing_field_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"nope": 1})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let engine = ReplayEngine::new("test").unwrap();
        let mut ctx = ReplayContext::new(endpoints_for(&server), job(Platform::Kams));
        let err = engine.run(&STEPS, &mut ctx).await.unwrap_err();
        assert!(matches!(err.error, ReplayError::MissingField { field: "token", .. }));
    }
}
