//! One-shot schema migration through the database-admin server.
//!
//! The server is spawned as a child process and driven over its stdio:
//! `initialize`, then a single `apply_migration` tool call. The whole
//! exchange runs under one wall-clock timeout and the child is killed when
//! the run ends, whatever the outcome.

pub(crate) mod rpc;

use rpc::Request;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tracing::{debug, info, warn};

pub const DEFAULT_SERVER_PACKAGE: &str = "@supabase/mcp-server-supabase@latest";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("SQL script not found: {0}")]
    SqlMissing(PathBuf),

    #[error("failed to read SQL script {path}: {source}")]
    ReadSql {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not determine the project ref; set SUPABASE_PROJECT_REF or SUPABASE_URL")]
    ProjectRef,

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O with migration server failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("server returned error {code}: {message}{}", detail_suffix(.data))]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("migration tool reported an error: {0}")]
    Tool(String),

    #[error("server closed its output before answering")]
    Closed,

    #[error("no response within {}", format_timeout(.0))]
    Timeout(Duration),
}

fn detail_suffix(data: &Option<String>) -> String {
    data.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

fn format_timeout(d: &Duration) -> String {
    humantime::format_duration(*d).to_string()
}

impl MigrationError {
    /// Manual fallback advice for failures where the SQL may not have run.
    pub fn fallback_hint(&self, sql_path: &Path) -> Option<String> {
        match self {
            MigrationError::Timeout(_) | MigrationError::Spawn { .. } | MigrationError::Closed => {
                Some(format!(
                    "Check the database manually or run {} in the SQL console",
                    sql_path.display()
                ))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub sql_path: PathBuf,
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
    pub client_name: String,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub name: String,
    pub result: Value,
}

/// Project ref from an explicit value, else from `https://<ref>.supabase.co`.
pub fn resolve_project_ref(
    explicit: Option<&str>,
    supabase_url: Option<&str>,
) -> Result<String, MigrationError> {
    if let Some(r) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return Ok(r.to_string());
    }
    let url = supabase_url.unwrap_or_default();
    if !url.contains("supabase.co") {
        return Err(MigrationError::ProjectRef);
    }
    url.split_once("//")
        .and_then(|(_, rest)| rest.split('.').next())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .ok_or(MigrationError::ProjectRef)
}

/// `npx -y <server package> --project-ref=<ref>`.
pub fn default_server_command(project_ref: &str) -> (String, Vec<String>) {
    (
        "npx".to_string(),
        vec![
            "-y".to_string(),
            DEFAULT_SERVER_PACKAGE.to_string(),
            format!("--project-ref={project_ref}"),
        ],
    )
}

/// Migration name defaults to the script's file stem.
pub fn default_name(sql_path: &Path) -> String {
    sql_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "migration".to_string())
}

pub async fn run_migration(cfg: &MigrationConfig) -> Result<MigrationOutcome, MigrationError> {
    if !cfg.sql_path.is_file() {
        return Err(MigrationError::SqlMissing(cfg.sql_path.clone()));
    }
    let query = tokio::fs::read_to_string(&cfg.sql_path)
        .await
        .map_err(|source| MigrationError::ReadSql {
            path: cfg.sql_path.clone(),
            source,
        })?;

    info!(program = %cfg.program, name = %cfg.name, "starting migration server");
    let mut child = Command::new(&cfg.program)
        .args(&cfg.args)
        .envs(cfg.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MigrationError::Spawn {
            program: cfg.program.clone(),
            source,
        })?;

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(MigrationError::Closed);
    };
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "trafico::migrate::server", "{line}");
            }
        });
    }

    let exchange = converse(&mut stdin, stdout, cfg, &query);
    let outcome = match tokio::time::timeout(cfg.timeout, exchange).await {
        Ok(res) => res,
        Err(_) => Err(MigrationError::Timeout(cfg.timeout)),
    };

    drop(stdin);
    if let Err(e) = child.kill().await {
        debug!(error = %e, "migration server already gone");
    }

    outcome.map(|result| MigrationOutcome {
        name: cfg.name.clone(),
        result,
    })
}

async fn send<W: AsyncWrite + Unpin>(w: &mut W, req: &Request<'_>) -> Result<(), MigrationError> {
    w.write_all(req.to_line()?.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

async fn converse<W: AsyncWrite + Unpin>(
    stdin: &mut W,
    stdout: ChildStdout,
    cfg: &MigrationConfig,
    query: &str,
) -> Result<Value, MigrationError> {
    let version = env!("CARGO_PKG_VERSION");
    send(
        stdin,
        &Request::call(
            rpc::INITIALIZE_ID,
            "initialize",
            rpc::initialize_params(&cfg.client_name, version),
        ),
    )
    .await?;

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(resp) = rpc::parse_line(&line) else {
            debug!(%line, "ignoring non-protocol output");
            continue;
        };
        match resp.id() {
            Some(rpc::INITIALIZE_ID) => {
                if let Some(err) = resp.error {
                    return Err(rpc_error(err));
                }
                info!("connected, applying migration");
                send(stdin, &Request::notification("notifications/initialized")).await?;
                send(
                    stdin,
                    &Request::call(
                        rpc::APPLY_ID,
                        "tools/call",
                        rpc::apply_migration_params(&cfg.name, query),
                    ),
                )
                .await?;
            }
            Some(rpc::APPLY_ID) => {
                if let Some(err) = resp.error {
                    return Err(rpc_error(err));
                }
                let result = resp.result.unwrap_or(Value::Null);
                if let Some(msg) = rpc::tool_error(&result) {
                    return Err(MigrationError::Tool(msg));
                }
                return Ok(result);
            }
            _ => debug!(%line, "ignoring unrelated message"),
        }
    }
    Err(MigrationError::Closed)
}

fn rpc_error(err: rpc::RpcError) -> MigrationError {
    MigrationError::Rpc {
        code: err.code,
        message: err.message,
        data: err
            .data
            .map(|d| serde_json::to_string_pretty(&d).unwrap_or_else(|_| d.to_string())),
    }
}
