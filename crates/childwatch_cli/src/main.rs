//! childwatch command-line entry point.
//!
//! # Responsibility
//! - Load configuration, start logging, open storage.
//! - Run one subcommand per invocation through `ChildService`.
//!
//! # Invariants
//! - A missing database location is fatal before any command runs.

mod commands;
mod config;

use anyhow::{bail, Context};
use childwatch_core::db::{into_shared, open_db_from_url};
use childwatch_core::{
    core_version, init_logging, CallContext, ChildService, SqliteChildRepository,
};
use clap::Parser;
use config::Cli;
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("childwatch: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_logging(cli.log_level(), cli.log_dir.as_deref())
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;
    info!(
        "event=cli_start module=cli status=ok core_version={}",
        core_version()
    );

    let database_url = match cli.database_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => bail!("DATABASE_URL is not configured"),
    };

    let conn = open_db_from_url(&database_url)
        .with_context(|| format!("failed to open database `{database_url}`"))?;
    let repo = SqliteChildRepository::try_new(into_shared(conn))
        .context("database is not ready for child records")?;
    let service = ChildService::new(repo);

    let ctx = CallContext::with_timeout(cli.timeout());
    let report = commands::execute(&service, &ctx, cli.command)?;
    info!(
        "event=cli_command module=cli status={:?} timeout_ms={}",
        report.outcome, cli.timeout_ms
    );

    if !report.body.is_empty() {
        if report.outcome == commands::Outcome::Ok {
            println!("{}", report.body);
        } else {
            eprintln!("{}", report.body);
        }
    }
    Ok(report.outcome.exit_code())
}
