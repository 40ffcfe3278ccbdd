// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use daibug::config::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if args.cmd.is_none() {
        eprintln!("error: --cmd is required");
        std::process::exit(1);
    }

    match daibug::run::run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
