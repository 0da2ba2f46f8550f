mod admin;
mod cli;
mod engine;
mod migrate;
mod model;
mod orchestrator;
mod session;
mod storage;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trafico=info"));

    // Logs go to stderr; stdout carries results only.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Map a command outcome to the process exit code. Errors are logged once here.
fn exit_code(outcome: Result<bool>) -> i32 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            tracing::error!("{e:#}");
            1
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; explicit environment always wins.
    dotenvy::dotenv().ok();
    init_tracing();

    let args = cli::Cli::parse();
    std::process::exit(exit_code(cli::run(args).await));
}
