use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Publishing platforms with a recorded upload flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kams,
    #[value(name = "xxxfollow")]
    #[serde(rename = "xxxfollow")]
    XxxFollow,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Kams => "kams",
            Platform::XxxFollow => "xxxfollow",
        }
    }

    /// File name of the captured session under `<model>/.auth/`.
    pub fn session_file_name(self) -> &'static str {
        match self {
            Platform::Kams => "user.json",
            Platform::XxxFollow => "xxxfollow.json",
        }
    }

    /// Cookie/localStorage domain the session belongs to.
    pub fn domain(self) -> &'static str {
        match self {
            Platform::Kams => "kams.com",
            Platform::XxxFollow => "xxxfollow.com",
        }
    }

    pub fn default_tags(self) -> &'static str {
        match self {
            Platform::Kams => "tag1,tag2",
            Platform::XxxFollow => "latina,brunette",
        }
    }

    pub fn default_endpoints(self) -> Endpoints {
        match self {
            Platform::Kams => Endpoints {
                web: "https://kams.com".into(),
                api: "https://api.kams.com".into(),
                upload: "https://api.kams.com".into(),
            },
            Platform::XxxFollow => Endpoints {
                web: "https://www.xxxfollow.com".into(),
                api: "https://www.xxxfollow.com".into(),
                upload: "https://upload.xxxfollow.com".into(),
            },
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Base URLs a flow talks to. Overridable so a flow can be pointed at a mock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Site origin (landing page, cookie-authenticated API).
    pub web: String,
    /// Token-authenticated API host.
    pub api: String,
    /// Media upload host.
    pub upload: String,
}

/// Input of one upload run. Lives only for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub model: String,
    pub platform: Platform,
    pub video_path: PathBuf,
    pub title: String,
    /// Comma-separated, as typed by the operator.
    pub tags: String,
}

impl UploadJob {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub job: UploadJob,
    pub session_path: PathBuf,
    pub endpoints: Endpoints,
    pub user_agent: String,
}

/// Final outcome of one upload run. Reported once, never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(default)]
    pub timestamp_utc: String,
    pub platform: Platform,
    pub model: String,
    pub title: String,
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    /// Platform-assigned identifiers, e.g. `video_id`, `post_id`, `media_id`.
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub elapsed: Duration,
}

/// Progress events emitted by the replay engine and consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UploadEvent {
    StepStarted {
        step: String,
    },
    StepCompleted {
        step: String,
        status: u16,
    },
    StepFailed {
        step: String,
        reason: String,
    },
    Info(String),
}

impl UploadEvent {
    /// Render a human-readable message for the CLI.
    pub fn to_message(&self) -> String {
        match self {
            UploadEvent::StepStarted { step } => format!("== {step} =="),
            UploadEvent::StepCompleted { step, status } => format!("{step}: HTTP {status}"),
            UploadEvent::StepFailed { step, reason } => format!("{step} failed: {reason}"),
            UploadEvent::Info(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_trims_and_drops_empty() {
        let job = UploadJob {
            model: "demo".into(),
            platform: Platform::XxxFollow,
            video_path: PathBuf::from("v.mp4"),
            title: "t".into(),
            tags: " latina, brunette ,,".into(),
        };
        assert_eq!(job.tag_list(), vec!["latina", "brunette"]);
    }

    #[test]
    fn platform_serializes_lowercase() {
        let s = serde_json::to_string(&Platform::XxxFollow).unwrap();
        assert_eq!(s, "\"xxxfollow\"");
        let p: Platform = serde_json::from_str("\"kams\"").unwrap();
        assert_eq!(p, Platform::Kams);
    }
}
