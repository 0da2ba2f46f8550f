//! Typed client for the dashboard's REST backend.
//!
//! Covers the same CRUD the web dashboard performs: models, platforms,
//! workers and KPI metrics. The backend is external; only the contract it
//! exposes is modelled here.

mod types;

pub use types::*;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, AdminError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AdminError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "admin request");
        let mut rb = self.http.request(method, &url);
        if let Some(b) = body {
            rb = rb.json(b);
        }
        let resp = rb.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(AdminError::Status {
                status,
                detail: error_detail(&bytes),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdminError> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelProfile>, AdminError> {
        self.get("/api/models").await
    }

    pub async fn get_model(&self, name: &str) -> Result<ModelProfile, AdminError> {
        self.get(&format!("/api/models/{}", segment(name))).await
    }

    pub async fn delete_model(&self, name: &str) -> Result<StatusReply, AdminError> {
        self.send::<(), _>(Method::DELETE, &format!("/api/models/{}", segment(name)), None)
            .await
    }

    pub async fn list_platforms(&self) -> Result<Vec<PlatformInfo>, AdminError> {
        self.get("/api/platforms").await
    }

    pub async fn create_platform(&self, platform: &NewPlatform) -> Result<PlatformInfo, AdminError> {
        self.send(Method::POST, "/api/platforms", Some(platform)).await
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerInfo>, AdminError> {
        self.get("/api/workers").await
    }

    pub async fn get_worker(&self, name: &str) -> Result<WorkerCode, AdminError> {
        self.get(&format!("/api/workers/{}", segment(name))).await
    }

    pub async fn model_metrics(&self, model: &str) -> Result<ModelMetrics, AdminError> {
        self.get(&format!("/api/kpi/{}", segment(model))).await
    }

    pub async fn sync_metrics(&self, model: &str) -> Result<StatusReply, AdminError> {
        self.send::<(), _>(Method::POST, &format!("/api/kpi/{}/sync", segment(model)), None)
            .await
    }
}

/// Percent-encode a path segment.
fn segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// The backend reports failures as `{"detail": "..."}`; fall back to the raw body.
fn error_detail(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}
