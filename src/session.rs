//! Captured browser session state.
//!
//! Sessions are produced once by a manual login and saved in the automation
//! tool's `storageState` layout: a list of cookies plus per-origin
//! localStorage entries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no saved credentials at {0}; run the manual login first")]
    Missing(PathBuf),

    #[error("failed to read session {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("session file {path} is not valid storage state: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Unix seconds; `-1` (or any value <= 0) marks a session cookie.
    #[serde(default = "session_cookie_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn session_cookie_expiry() -> f64 {
    -1.0
}

impl Cookie {
    pub fn is_persistent(&self) -> bool {
        self.expires > 0.0
    }

    /// Whether the cookie would be sent to `host` (suffix match, leading dot ignored).
    pub fn matches_domain(&self, host: &str) -> bool {
        let d = self.domain.trim_start_matches('.');
        if d.is_empty() {
            return false;
        }
        host == d || host.ends_with(&format!(".{d}")) || d.ends_with(&format!(".{host}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// Serialized browser-session state for one (model, platform) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl AuthState {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SessionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Conventional location: `<models_dir>/<model>/.auth/<file_name>`.
    pub fn default_path(models_dir: &Path, model: &str, file_name: &str) -> PathBuf {
        models_dir.join(model).join(".auth").join(file_name)
    }

    pub fn cookie(&self, domain: &str, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name && c.matches_domain(domain))
            .map(|c| c.value.as_str())
    }

    /// `Cookie` header value carrying every cookie scoped to `domain`.
    pub fn cookie_header(&self, domain: &str) -> String {
        self.cookies
            .iter()
            .filter(|c| c.matches_domain(domain))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Expired when the domain has persistent cookies and all of them are past expiry.
    pub fn is_expired(&self, domain: &str, now_unix: f64) -> bool {
        let mut persistent = self
            .cookies
            .iter()
            .filter(|c| c.matches_domain(domain) && c.is_persistent())
            .peekable();
        if persistent.peek().is_none() {
            return false;
        }
        persistent.all(|c| c.expires < now_unix)
    }

    fn local_storage<'a>(&'a self, domain: &str) -> impl Iterator<Item = &'a StorageEntry> + 'a {
        let domain = domain.to_string();
        self.origins
            .iter()
            .filter(move |o| origin_host(&o.origin).is_some_and(|h| host_matches(h, &domain)))
            .flat_map(|o| o.local_storage.iter())
    }

    /// First localStorage value whose key contains one of `needles` (case-insensitive).
    pub fn find_storage_value(&self, domain: &str, needles: &[&str]) -> Option<&str> {
        self.local_storage(domain)
            .find(|e| {
                let key = e.name.to_lowercase();
                needles.iter().any(|n| key.contains(n))
            })
            .map(|e| e.value.as_str())
    }

    /// `id` of the first JSON object stored under a key containing `needle`,
    /// kept as stored (string or number).
    pub fn find_storage_json_id(&self, domain: &str, needle: &str) -> Option<serde_json::Value> {
        self.local_storage(domain)
            .filter(|e| e.name.to_lowercase().contains(needle))
            .filter_map(|e| serde_json::from_str::<serde_json::Value>(&e.value).ok())
            .find_map(|mut v| {
                let id = v.get_mut("id")?.take();
                json_scalar_to_string(&id).is_some().then_some(id)
            })
    }
}

fn origin_host(origin: &str) -> Option<&str> {
    let rest = origin.split_once("://").map(|(_, r)| r).unwrap_or(origin);
    let host = rest.split(['/', ':']).next()?;
    (!host.is_empty()).then_some(host)
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Render a JSON string or number as an identifier.
pub fn json_scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> AuthState {
        serde_json::from_str(
            r#"{
              "cookies": [
                {"name": "x-auth-id", "value": "abc", "domain": ".xxxfollow.com", "path": "/", "expires": 4102444800},
                {"name": "XSRF-TOKEN", "value": "csrf", "domain": "www.xxxfollow.com", "path": "/", "expires": -1},
                {"name": "other", "value": "zzz", "domain": ".example.com", "path": "/", "expires": -1}
              ],
              "origins": [
                {"origin": "https://www.xxxfollow.com", "localStorage": [
                  {"name": "theme", "value": "dark"},
                  {"name": "currentUser", "value": "{\"id\": 4242, \"name\": \"demo\"}"}
                ]},
                {"origin": "https://kams.com", "localStorage": [
                  {"name": "locale", "value": "es"},
                  {"name": "auth_token", "value": "bearer-xyz"}
                ]}
              ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn finds_cookies_for_subdomains() {
        let s = sample();
        assert_eq!(s.cookie("www.xxxfollow.com", "x-auth-id"), Some("abc"));
        assert_eq!(s.cookie("xxxfollow.com", "XSRF-TOKEN"), Some("csrf"));
        assert_eq!(s.cookie("xxxfollow.com", "other"), None);
        assert_eq!(
            s.cookie_header("www.xxxfollow.com"),
            "x-auth-id=abc; XSRF-TOKEN=csrf"
        );
    }

    #[test]
    fn scans_local_storage_per_origin() {
        let s = sample();
        assert_eq!(
            s.find_storage_value("kams.com", &["token", "auth"]),
            Some("bearer-xyz")
        );
        assert_eq!(s.find_storage_value("xxxfollow.com", &["token"]), None);
        assert_eq!(
            s.find_storage_json_id("xxxfollow.com", "user"),
            Some(serde_json::json!(4242))
        );
    }

    #[test]
    fn expiry_ignores_session_cookies() {
        let s = sample();
        assert!(!s.is_expired("xxxfollow.com", 1_700_000_000.0));
        assert!(s.is_expired("xxxfollow.com", 4_102_444_801.0));
        // only session cookies for this domain
        assert!(!s.is_expired("example.com", 4_102_444_801.0));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(AuthState::load(&path), Err(SessionError::Missing(_))));
    }

    #[test]
    fn load_reads_storage_state() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"cookies": [], "origins": []}}"#).unwrap();
        let s = AuthState::load(f.path()).unwrap();
        assert!(s.cookies.is_empty());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert!(matches!(
            AuthState::load(bad.path()),
            Err(SessionError::Parse { .. })
        ));
    }

    #[test]
    fn default_path_layout() {
        let p = AuthState::default_path(Path::new("/srv/modelos"), "yic", "user.json");
        assert_eq!(p, PathBuf::from("/srv/modelos/yic/.auth/user.json"));
    }
}
