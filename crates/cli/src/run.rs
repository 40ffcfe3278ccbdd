// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level runner — shared by `main` and the end-to-end tests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent;
use crate::config::{CliArgs, Config};
use crate::hub::Hub;
use crate::tools::ToolRegistry;

/// Initialize tracing/logging from CLI flags.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
/// In `--mcp` mode logs go to stderr; stdout carries the protocol.
pub fn init_tracing(args: &CliArgs) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / DAIBUG_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("DAIBUG_LOG_LEVEL").is_err() && args.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level))
    } else {
        EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match args.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Run the hub to completion. Returns the process exit code.
pub async fn run(args: CliArgs) -> anyhow::Result<i32> {
    init_tracing(&args);

    let Some(cmd) = args.cmd.clone() else {
        anyhow::bail!("--cmd is required");
    };

    let config = Config::resolve(&args)?;
    let errors = config.validate();
    if !errors.is_empty() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    let mut hub = Hub::new(config, &cmd);
    if args.mcp {
        hub = hub.child_stdin_null();
    }
    hub.start().await?;
    let registry = Arc::new(ToolRegistry::new(Arc::clone(&hub.state)));

    let stop_requested = CancellationToken::new();
    spawn_signal_handler(stop_requested.clone());

    if args.mcp {
        let bridge = agent::serve_stdio(Arc::clone(&registry), stop_requested.clone());
        tokio::select! {
            result = bridge => {
                if let Err(e) = result {
                    tracing::warn!("agent bridge ended: {e}");
                }
            }
            _ = stop_requested.cancelled() => {}
        }
    } else {
        tokio::select! {
            _ = stop_requested.cancelled() => {}
            _ = hub.state.shutdown.cancelled() => {}
        }
    }

    hub.stop().await?;
    Ok(0)
}

/// First signal starts graceful shutdown; second forces exit.
fn spawn_signal_handler(stop: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        stop.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}
