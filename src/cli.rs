use crate::admin::{AdminClient, NewPlatform, DEFAULT_API_URL};
use crate::migrate::{self, MigrationConfig};
use crate::model::{Endpoints, Platform, UploadConfig, UploadEvent, UploadJob, UploadResult};
use crate::orchestrator;
use crate::session::AuthState;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Print either pretty JSON or pre-formatted text lines on stdout.
async fn print_output<T: Serialize>(json: bool, value: &T, lines: Vec<String>) -> Result<()> {
    let (tx, handle) = spawn_output_writer();
    if json {
        let _ = tx.send(OutputLine::Stdout(serde_json::to_string_pretty(value)?));
    } else {
        for line in lines {
            let _ = tx.send(OutputLine::Stdout(line));
        }
    }
    drop(tx);
    let _ = handle.await;
    Ok(())
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "trafico",
    version,
    about = "Replay recorded upload flows, apply migrations and manage the admin backend"
)]
pub struct Cli {
    /// Print JSON instead of a text summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Upload one video to a platform using a saved session
    Upload(UploadArgs),
    /// Apply one SQL migration through the database-admin server
    Migrate(MigrateArgs),
    /// Query and manage the admin backend
    Admin(AdminArgs),
    /// Show recently saved upload runs
    History(HistoryArgs),
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    /// Target platform
    #[arg(long, value_enum, env = "TRAFICO_PLATFORM")]
    pub platform: Platform,

    /// Model whose saved session is used
    #[arg(long, env = "MODEL_NAME")]
    pub model: String,

    /// Video file to upload; when missing the upload is skipped
    #[arg(long, env = "VIDEO_PATH")]
    pub video: Option<PathBuf>,

    #[arg(long, env = "VIDEO_TITLE", default_value = "Default Title")]
    pub title: String,

    /// Comma-separated tags (platform default when omitted)
    #[arg(long, env = "VIDEO_TAGS")]
    pub tags: Option<String>,

    /// Directory holding `<model>/.auth/<platform>.json` sessions
    #[arg(long, env = "TRAFICO_MODELS_DIR", default_value = "modelos")]
    pub models_dir: PathBuf,

    /// Explicit session file, overriding the models directory layout
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Override the platform's site origin
    #[arg(long)]
    pub web_url: Option<String>,

    /// Override the platform's API host
    #[arg(long)]
    pub api_url: Option<String>,

    /// Override the platform's media upload host
    #[arg(long)]
    pub upload_url: Option<String>,

    /// Export the result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// History directory (defaults to the user data directory)
    #[arg(long, env = "TRAFICO_HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    /// SQL script to apply
    #[arg(long)]
    pub sql: PathBuf,

    /// Migration name (defaults to the script file stem)
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, env = "SUPABASE_PROJECT_REF")]
    pub project_ref: Option<String>,

    /// Project URL, used to derive the project ref when none is given
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Wall-clock limit for the whole exchange
    #[arg(long, default_value = "60s")]
    pub timeout: humantime::Duration,

    /// Server program to spawn instead of the default `npx` package
    #[arg(long)]
    pub server_command: Option<String>,

    /// Argument for --server-command (repeatable)
    #[arg(long = "server-arg", requires = "server_command", allow_hyphen_values = true)]
    pub server_args: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct AdminArgs {
    /// Base URL of the admin backend
    #[arg(long, env = "TRAFICO_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum AdminCommand {
    /// List model profiles
    Models,
    /// Show one model profile
    Model { name: String },
    /// Delete a model profile
    DeleteModel { name: String },
    /// List platforms
    Platforms,
    /// Register a platform
    AddPlatform { name: String, url: String },
    /// List workers
    Workers,
    /// Print a worker's source
    Worker { name: String },
    /// Show daily KPI metrics for a model
    Kpi { model: String },
    /// Trigger a KPI sync for a model
    SyncKpi { model: String },
}

#[derive(Debug, Args, Clone)]
pub struct HistoryArgs {
    /// Number of runs to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, env = "TRAFICO_HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,
}

fn user_agent() -> String {
    format!("trafico/{}", env!("CARGO_PKG_VERSION"))
}

/// Run the selected command. `Ok(false)` means the command ran but did not succeed.
pub async fn run(args: Cli) -> Result<bool> {
    let json = args.json;
    match args.command {
        Command::Upload(a) => run_upload(a, json).await,
        Command::Migrate(a) => run_migrate(a, json).await,
        Command::Admin(a) => run_admin(a, json).await.map(|()| true),
        Command::History(a) => run_history(a, json).await.map(|()| true),
    }
}

/// Build an `UploadConfig` from CLI arguments.
pub fn build_upload_config(args: &UploadArgs) -> UploadConfig {
    let platform = args.platform;
    let defaults = platform.default_endpoints();
    let endpoints = Endpoints {
        web: args.web_url.clone().unwrap_or(defaults.web),
        api: args.api_url.clone().unwrap_or(defaults.api),
        upload: args.upload_url.clone().unwrap_or(defaults.upload),
    };
    let session_path = args.session.clone().unwrap_or_else(|| {
        AuthState::default_path(&args.models_dir, &args.model, platform.session_file_name())
    });
    UploadConfig {
        job: UploadJob {
            model: args.model.clone(),
            platform,
            video_path: args.video.clone().unwrap_or_default(),
            title: args.title.clone(),
            tags: args
                .tags
                .clone()
                .unwrap_or_else(|| platform.default_tags().to_string()),
        },
        session_path,
        endpoints,
        user_agent: user_agent(),
    }
}

async fn run_upload(args: UploadArgs, json: bool) -> Result<bool> {
    let cfg = build_upload_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<UploadEvent>();

    let printer_tx = out_tx.clone();
    let printer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            let _ = printer_tx.send(OutputLine::Stderr(ev.to_message()));
        }
    });

    let outcome = orchestrator::run_upload(&cfg, Some(evt_tx)).await;
    let _ = printer.await;
    let result: UploadResult = match outcome {
        Ok(r) => r,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e).context("upload aborted before any request was sent");
        }
    };

    let history_dir = if args.auto_save {
        match args.history_dir.clone() {
            Some(d) => Some(d),
            None => crate::storage::default_runs_dir()
                .map_err(|e| warn!("history disabled: {e:#}"))
                .ok(),
        }
    } else {
        None
    };
    let processed = orchestrator::process_run_completion(
        &result,
        history_dir.as_deref(),
        args.export_json.as_deref(),
    );

    if json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&result)?));
    } else {
        for line in crate::text_summary::build_text_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    drop(out_tx);
    let _ = out_handle.await;

    Ok(result.success || result.skipped)
}

/// Build a `MigrationConfig` from CLI arguments and the environment.
pub fn build_migration_config(args: &MigrateArgs) -> Result<MigrationConfig> {
    let project_ref =
        migrate::resolve_project_ref(args.project_ref.as_deref(), args.supabase_url.as_deref());
    let (program, cmd_args, envs) = match (&args.server_command, project_ref) {
        (Some(program), r) => {
            let envs = r
                .map(|r| vec![("SUPABASE_PROJECT_REF".to_string(), r)])
                .unwrap_or_default();
            (program.clone(), args.server_args.clone(), envs)
        }
        (None, Ok(r)) => {
            let (program, cmd_args) = migrate::default_server_command(&r);
            (program, cmd_args, vec![("SUPABASE_PROJECT_REF".to_string(), r)])
        }
        (None, Err(e)) => return Err(e.into()),
    };
    Ok(MigrationConfig {
        name: args
            .name
            .clone()
            .unwrap_or_else(|| migrate::default_name(&args.sql)),
        sql_path: args.sql.clone(),
        program,
        args: cmd_args,
        envs,
        timeout: Duration::from(args.timeout),
        client_name: "trafico-migration".to_string(),
    })
}

#[derive(Serialize)]
struct MigrationReport {
    name: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn run_migrate(args: MigrateArgs, json: bool) -> Result<bool> {
    let cfg = build_migration_config(&args)?;
    if std::env::var_os("SUPABASE_ACCESS_TOKEN").is_none() {
        warn!("SUPABASE_ACCESS_TOKEN not set; the server will use whatever credentials it finds");
    }

    let (report, lines) = match migrate::run_migration(&cfg).await {
        Ok(out) => {
            let lines = vec![format!("Migration {} applied", out.name)];
            (
                MigrationReport {
                    name: out.name,
                    success: true,
                    result: Some(out.result),
                    error: None,
                },
                lines,
            )
        }
        Err(e) => {
            let mut lines = vec![format!("Migration {} failed: {e}", cfg.name)];
            lines.extend(e.fallback_hint(&cfg.sql_path));
            (
                MigrationReport {
                    name: cfg.name.clone(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
                lines,
            )
        }
    };
    let success = report.success;
    print_output(json, &report, lines).await?;
    Ok(success)
}

async fn run_admin(args: AdminArgs, json: bool) -> Result<()> {
    let client = AdminClient::new(&args.api_url, &user_agent())?;
    match args.command {
        AdminCommand::Models => {
            let models = client.list_models().await.context("list models")?;
            let lines = models
                .iter()
                .map(|m| {
                    format!(
                        "{:<20} telegram: {:<20} striphours: {}",
                        m.name,
                        m.telegram_username.as_deref().unwrap_or("-"),
                        m.striphours_username.as_deref().unwrap_or("-")
                    )
                })
                .collect();
            print_output(json, &models, lines).await
        }
        AdminCommand::Model { name } => {
            let model = client.get_model(&name).await.context("get model")?;
            let lines = vec![serde_json::to_string_pretty(&model)?];
            print_output(json, &model, lines).await
        }
        AdminCommand::DeleteModel { name } => {
            let reply = client.delete_model(&name).await.context("delete model")?;
            let lines = vec![format!(
                "{name}: {}",
                reply.status.as_deref().unwrap_or("deleted")
            )];
            print_output(json, &reply, lines).await
        }
        AdminCommand::Platforms => {
            let platforms = client.list_platforms().await.context("list platforms")?;
            let lines = platforms
                .iter()
                .map(|p| {
                    let worker = if p.has_worker { "worker" } else { "no worker" };
                    format!("{:<16} {:<40} {worker}", p.name, p.url)
                })
                .collect();
            print_output(json, &platforms, lines).await
        }
        AdminCommand::AddPlatform { name, url } => {
            let p = client
                .create_platform(&NewPlatform { name, url })
                .await
                .context("create platform")?;
            let lines = vec![format!("Registered {} ({})", p.name, p.url)];
            print_output(json, &p, lines).await
        }
        AdminCommand::Workers => {
            let workers = client.list_workers().await.context("list workers")?;
            let lines = workers
                .iter()
                .map(|w| format!("{:<16} {:>6} lines {:>8} bytes  {}", w.name, w.lines, w.size, w.path))
                .collect();
            print_output(json, &workers, lines).await
        }
        AdminCommand::Worker { name } => {
            let worker = client.get_worker(&name).await.context("get worker")?;
            let lines = worker.code.lines().map(str::to_string).collect();
            print_output(json, &worker, lines).await
        }
        AdminCommand::Kpi { model } => {
            let m = client.model_metrics(&model).await.context("get metrics")?;
            let mut lines = vec![format!(
                "{}: {} days, last sync {}",
                m.model,
                m.total_days,
                m.last_sync.as_deref().unwrap_or("never")
            )];
            lines.extend(m.daily_metrics.iter().map(|d| {
                format!(
                    "{}  rank best {:>5} avg {:>5}  viewers max {:>5} avg {:>7.1}  followers {:>7} ({:+})",
                    d.date,
                    d.best_rank,
                    d.avg_rank,
                    d.most_viewers,
                    d.avg_viewers,
                    d.ending_followers,
                    d.growth
                )
            }));
            print_output(json, &m, lines).await
        }
        AdminCommand::SyncKpi { model } => {
            let reply = client.sync_metrics(&model).await.context("sync metrics")?;
            let lines = vec![reply
                .message
                .clone()
                .unwrap_or_else(|| format!("Sync requested for {model}"))];
            print_output(json, &reply, lines).await
        }
    }
}

async fn run_history(args: HistoryArgs, json: bool) -> Result<()> {
    let dir = match args.history_dir {
        Some(d) => d,
        None => crate::storage::default_runs_dir()?,
    };
    let runs = crate::storage::load_recent(&dir, args.limit)?;
    let lines = crate::text_summary::build_history_summary(&runs).lines;
    print_output(json, &runs, lines).await
}
